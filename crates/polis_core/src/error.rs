//! Error types for the world simulation.

use thiserror::Error;

use crate::ids::CityId;
use crate::queue::QueueKind;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all simulation commands and ticks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    /// City cannot pay the resource cost.
    #[error("Insufficient resources: need {required} {resource}, have {available}")]
    InsufficientResources {
        /// Resource type.
        resource: &'static str,
        /// Amount required.
        required: u64,
        /// Amount available.
        available: u64,
    },

    /// City has no free population for the item.
    #[error("Insufficient population: need {required}, have {available} free")]
    InsufficientPopulation {
        /// Population required.
        required: u32,
        /// Population available after reservations.
        available: u32,
    },

    /// Queue already holds the maximum number of items.
    #[error("The {kind} queue is full")]
    QueueFull {
        /// Queue that rejected the item.
        kind: QueueKind,
    },

    /// Prerequisite building level or research missing.
    #[error("Requirements not met: {0}")]
    RequirementsNotMet(String),

    /// Destination of a movement no longer exists.
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    /// City referenced by a command does not exist.
    #[error("City not found: {0}")]
    CityNotFound(CityId),

    /// Optimistic transaction lost a race against another writer.
    #[error("Concurrent modification detected")]
    ConcurrentModification,

    /// Malformed command input.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Conflicts kept occurring until the retry budget ran out.
    #[error("Transient failure after {attempts} attempts")]
    TransientFailure {
        /// Number of attempts made.
        attempts: u32,
    },

    /// Persistence layer failure other than a conflict.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Static game data failed to load or validate.
    #[error("Failed to load game data: {0}")]
    DataLoad(String),
}

impl GameError {
    /// Whether this is a synchronous validation error that must never be retried.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InsufficientResources { .. }
                | Self::InsufficientPopulation { .. }
                | Self::QueueFull { .. }
                | Self::RequirementsNotMet(_)
                | Self::InvalidCommand(_)
                | Self::CityNotFound(_)
        )
    }

    /// Whether the failed operation may succeed when re-run against fresh state.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification)
    }
}

impl From<StoreError> for GameError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => Self::ConcurrentModification,
            other => Self::Store(other),
        }
    }
}

/// Errors raised by a [`DocumentStore`](crate::store::DocumentStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A document read by the transaction changed before commit.
    #[error("write conflict")]
    Conflict,

    /// Document failed to encode or decode.
    #[error("codec error: {0}")]
    Codec(String),

    /// Internal lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,

    /// `create` targeted a key that already holds a document.
    #[error("document already exists: {0}")]
    AlreadyExists(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        assert!(GameError::QueueFull {
            kind: QueueKind::Research
        }
        .is_validation());
        assert!(GameError::InvalidCommand("x".into()).is_validation());
        assert!(!GameError::ConcurrentModification.is_validation());
        assert!(!GameError::TransientFailure { attempts: 3 }.is_validation());
    }

    #[test]
    fn test_retry_classification() {
        assert!(GameError::ConcurrentModification.is_retryable());
        assert_eq!(
            GameError::from(StoreError::Conflict),
            GameError::ConcurrentModification
        );
        assert!(GameError::from(StoreError::Conflict).is_retryable());
        assert!(!GameError::from(StoreError::Poisoned).is_retryable());
        assert!(!GameError::RequirementsNotMet("wall".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = GameError::InsufficientResources {
            resource: "wood",
            required: 100,
            available: 0,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient resources: need 100 wood, have 0"
        );
        assert_eq!(
            GameError::QueueFull {
                kind: QueueKind::Construction
            }
            .to_string(),
            "The construction queue is full"
        );
    }
}
