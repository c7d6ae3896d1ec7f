//! Research data structures for data-driven research definitions.

use serde::{Deserialize, Serialize};

use super::Requirement;
use crate::clock::MILLIS_PER_SECOND;
use crate::economy::Cost;
use crate::ids::ResearchId;

/// Data-driven research definition.
///
/// # Example RON
///
/// ```ron
/// ResearchData(
///     id: "phalanx",
///     name: "Phalanx",
///     cost: (wood: 4000, stone: 4000, silver: 4000),
///     build_time_secs: 3600,
///     requires: [(building: "academy", level: 10)],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchData {
    /// Unique string identifier for this research.
    pub id: ResearchId,

    /// Display name.
    pub name: String,

    /// Research cost.
    pub cost: Cost,

    /// Research time at research building level 1.
    pub build_time_secs: u32,

    /// Building levels required before researching.
    #[serde(default)]
    pub requires: Vec<Requirement>,
}

impl ResearchData {
    /// Research duration in milliseconds.
    #[must_use]
    pub fn research_time_ms(&self, academy_level: u32, speedup_percent: u32) -> u64 {
        let base = u64::from(self.build_time_secs) * MILLIS_PER_SECOND;
        let bonus = u64::from(academy_level.saturating_sub(1)) * u64::from(speedup_percent);
        let scaled = u128::from(base) * 100 / (100 + u128::from(bonus));
        u64::try_from(scaled).unwrap_or(u64::MAX)
    }
}
