//! Outcome of one background tick.

use serde::{Deserialize, Serialize};

use crate::error::GameError;
use crate::store::DocKey;

/// An aggregate that failed to process during a tick.
///
/// Failures never abort the tick; the aggregate is re-examined on the next
/// cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickFailure {
    /// Aggregate that failed.
    pub key: DocKey,
    /// Rendered error.
    pub error: String,
    /// Whether the failure was a lost race rather than a broken aggregate.
    pub transient: bool,
}

impl TickFailure {
    /// Record a failure for `key`.
    #[must_use]
    pub fn new(key: DocKey, error: &GameError) -> Self {
        Self {
            key,
            error: error.to_string(),
            transient: error.is_retryable() || matches!(error, GameError::TransientFailure { .. }),
        }
    }
}

/// Events produced by one tick plus the aggregates that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSummary<E> {
    /// Completed work, in processing order.
    pub events: Vec<E>,
    /// Aggregates left for the next tick.
    pub failures: Vec<TickFailure>,
}

impl<E> Default for TickSummary<E> {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<E> TickSummary<E> {
    /// Whether the tick neither did anything nor failed anywhere.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.events.is_empty() && self.failures.is_empty()
    }
}
