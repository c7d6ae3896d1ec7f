//! # Polis Core
//!
//! World simulation core for a persistent city-building strategy game.
//!
//! This crate contains the game rules and their storage contract:
//! - Timed build, training and research queues
//! - Troop, trade and scouting movements between cities and villages
//! - Deterministic battle resolution (fixed-point, no randomness)
//! - Versioned document storage with optimistic transactions
//!
//! It does no networking and owns no timers. A host process (see the
//! `polis_server` crate) calls [`queue::QueueEngine::tick`] and
//! [`movement::MovementScheduler::tick`] periodically.
//!
//! ## Crate Structure
//!
//! - [`data`] - Data-driven unit, building and research definitions
//! - [`city`] - City and village state
//! - [`queue`] - Timed queues
//! - [`movement`] - Movements and arrival processing
//! - [`combat`] - Battle resolution
//! - [`report`] - Player-visible reports
//! - [`store`] - Document store and transactions
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod cache;
pub mod city;
pub mod clock;
pub mod combat;
pub mod data;
pub mod economy;
pub mod error;
pub mod events;
pub mod ids;
pub mod math;
pub mod movement;
pub mod queue;
pub mod report;
pub mod store;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::city::{Army, CityState, UnitCounts, VillageState};
    pub use crate::clock::{Clock, ManualClock, SystemClock, Timestamp};
    pub use crate::combat::{CombatModifiers, CombatResult, DefenderForce};
    pub use crate::data::GameData;
    pub use crate::economy::{Cost, Population, Resources};
    pub use crate::error::{GameError, Result, StoreError};
    pub use crate::events::{TickFailure, TickSummary};
    pub use crate::ids::{
        BuildingId, CityId, MovementId, PlayerId, ReportId, ResearchId, UnitId, VillageId,
    };
    pub use crate::math::{Fixed, MapPosition};
    pub use crate::movement::{
        ArrivalOutcome, DispatchOrder, ModifierSource, Movement, MovementEvent, MovementKind,
        MovementScheduler, MovementStatus, NoModifiers, TargetRef,
    };
    pub use crate::queue::{QueueEngine, QueueEvent, QueueItem, QueueKind, QueueTarget};
    pub use crate::report::{Report, ReportBody};
    pub use crate::store::{DocKey, Document, RetryPolicy, StateStore};
}
