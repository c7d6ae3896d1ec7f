//! Timed per-city queues for construction, unit training and research.
//!
//! Each city owns one ordered list per [`QueueKind`]. Items run strictly
//! one after another: an item starts when its predecessor ends (or when it
//! was accepted, for the first item), so only the head of a queue is ever
//! in progress. Costs are debited when an item is accepted and the effect
//! is applied when the head's end time has passed.
//!
//! The free functions ([`enqueue`], [`cancel`], [`complete_due`]) operate
//! on a loaded [`CityState`]. [`QueueEngine`] wraps them in store
//! transactions so every mutation of a city commits atomically.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::city::CityState;
use crate::clock::Timestamp;
use crate::data::{GameData, Requirement};
use crate::economy::Cost;
use crate::error::{GameError, Result};
use crate::events::{TickFailure, TickSummary};
use crate::ids::{BuildingId, CityId, ResearchId, UnitId};
use crate::store::{DocKey, DocKind, StateStore};

/// Default maximum number of items per queue.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 5;

/// The four independent queues of a city.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QueueKind {
    /// Building upgrades.
    Construction,
    /// Land unit training.
    LandTraining,
    /// Ship building.
    NavalTraining,
    /// Research topics.
    Research,
}

impl QueueKind {
    /// Every queue kind, in completion processing order.
    pub const ALL: [Self; 4] = [
        Self::Construction,
        Self::LandTraining,
        Self::NavalTraining,
        Self::Research,
    ];
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Construction => "construction",
            Self::LandTraining => "land training",
            Self::NavalTraining => "naval training",
            Self::Research => "research",
        };
        f.write_str(name)
    }
}

/// What a queue item produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueTarget {
    /// Next level of a building.
    Building(BuildingId),
    /// A batch of units or ships.
    Unit(UnitId),
    /// A research topic.
    Research(ResearchId),
}

impl fmt::Display for QueueTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Building(id) => write!(f, "building '{id}'"),
            Self::Unit(id) => write!(f, "unit '{id}'"),
            Self::Research(id) => write!(f, "research '{id}'"),
        }
    }
}

/// One accepted, not yet completed queue entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueItem {
    /// Queue holding the item.
    pub kind: QueueKind,
    /// Produced building level, units or research.
    pub target: QueueTarget,
    /// Number of units (always 1 for buildings and research).
    pub amount: u32,
    /// Total cost debited on acceptance.
    pub cost: Cost,
    /// When work on the item begins.
    pub start_time: Timestamp,
    /// When the item completes.
    pub end_time: Timestamp,
}

impl QueueItem {
    /// Time the item occupies its queue.
    #[must_use]
    pub const fn duration_ms(&self) -> u64 {
        self.end_time.millis_since(self.start_time)
    }

    /// Whether the item has finished by `now`.
    #[must_use]
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.end_time <= now
    }
}

/// Notification emitted when a queue item's effect was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueEvent {
    /// An item completed and left its queue.
    Completed {
        /// City owning the queue.
        city: CityId,
        /// Queue the item left.
        kind: QueueKind,
        /// What was produced.
        target: QueueTarget,
        /// How many units (1 for buildings and research).
        amount: u32,
        /// Scheduled end time of the item.
        finished_at: Timestamp,
    },
}

impl QueueEvent {
    /// City affected by the event.
    #[must_use]
    pub const fn city(&self) -> CityId {
        match self {
            Self::Completed { city, .. } => *city,
        }
    }

    /// Queue the item left.
    #[must_use]
    pub const fn kind(&self) -> QueueKind {
        match self {
            Self::Completed { kind, .. } => *kind,
        }
    }
}

/// Price and duration of a prospective queue item.
struct Plan {
    cost: Cost,
    duration_ms: u64,
}

fn unknown(what: &str, id: &dyn fmt::Display) -> GameError {
    GameError::InvalidCommand(format!("unknown {what} '{id}'"))
}

fn check_requirements(city: &CityState, requires: &[Requirement]) -> Result<()> {
    for req in requires {
        let have = city.building_level(&req.building);
        if have < req.level {
            return Err(GameError::RequirementsNotMet(format!(
                "building '{}' level {} (have {have})",
                req.building, req.level
            )));
        }
    }
    Ok(())
}

fn plan(
    city: &CityState,
    data: &GameData,
    kind: QueueKind,
    target: &QueueTarget,
    amount: u32,
) -> Result<Plan> {
    match (kind, target) {
        (QueueKind::Construction, QueueTarget::Building(id)) => {
            let building = data.building(id).ok_or_else(|| unknown("building", id))?;
            check_requirements(city, &building.requires)?;

            // Queued upgrades of the same building stack on top of each other
            let queued = city
                .queue(kind)
                .iter()
                .filter(|item| &item.target == target)
                .count();
            let next_level = city
                .building_level(id)
                .saturating_add(u32::try_from(queued).unwrap_or(u32::MAX))
                .saturating_add(1);
            if next_level > building.max_level {
                return Err(GameError::InvalidCommand(format!(
                    "building '{id}' cannot exceed level {}",
                    building.max_level
                )));
            }

            Ok(Plan {
                cost: building.cost_for_level(next_level),
                duration_ms: building.build_time_ms_for_level(next_level),
            })
        }
        (QueueKind::LandTraining | QueueKind::NavalTraining, QueueTarget::Unit(id)) => {
            let unit = data.unit(id).ok_or_else(|| unknown("unit", id))?;
            let expected = if unit.naval {
                QueueKind::NavalTraining
            } else {
                QueueKind::LandTraining
            };
            if kind != expected {
                return Err(GameError::InvalidCommand(format!(
                    "unit '{id}' trains in the {expected} queue"
                )));
            }

            let producer_level = city.building_level(&unit.produced_at);
            if producer_level == 0 {
                return Err(GameError::RequirementsNotMet(format!(
                    "building '{}' level 1 (have 0)",
                    unit.produced_at
                )));
            }
            check_requirements(city, &unit.requires)?;
            if let Some(research) = &unit.research {
                if !city.research.contains(research) {
                    return Err(GameError::RequirementsNotMet(format!(
                        "research '{research}'"
                    )));
                }
            }

            let speedup = data
                .building(&unit.produced_at)
                .map_or(0, |b| b.speedup_percent_per_level);
            Ok(Plan {
                cost: unit.cost.times(amount),
                duration_ms: unit.training_time_ms(amount, producer_level, speedup),
            })
        }
        (QueueKind::Research, QueueTarget::Research(id)) => {
            let research = data.research(id).ok_or_else(|| unknown("research", id))?;
            let queued = city.queue(kind).iter().any(|item| &item.target == target);
            if city.research.contains(id) || queued {
                return Err(GameError::InvalidCommand(format!(
                    "research '{id}' is already done or queued"
                )));
            }
            check_requirements(city, &research.requires)?;

            let (level, speedup) = data.queues.research_building.as_ref().map_or((1, 0), |b| {
                (
                    city.building_level(b),
                    data.building(b).map_or(0, |d| d.speedup_percent_per_level),
                )
            });
            Ok(Plan {
                cost: research.cost,
                duration_ms: research.research_time_ms(level, speedup),
            })
        }
        _ => Err(GameError::InvalidCommand(format!(
            "{target} cannot be queued in the {kind} queue"
        ))),
    }
}

/// Validate a queue command and, if it is affordable, append the item.
///
/// On success the full cost is debited from the city and the new item is
/// returned. On failure the city is left untouched.
///
/// # Errors
///
/// - [`GameError::InvalidCommand`] for a zero amount, a batch of buildings
///   or research, a target that does not belong in `kind`, or an unknown id
/// - [`GameError::QueueFull`] when the queue holds the maximum number of items
/// - [`GameError::RequirementsNotMet`] when a prerequisite is missing
/// - [`GameError::InsufficientResources`] / [`GameError::InsufficientPopulation`]
pub fn enqueue(
    city: &mut CityState,
    data: &GameData,
    kind: QueueKind,
    target: QueueTarget,
    amount: u32,
    now: Timestamp,
) -> Result<QueueItem> {
    if amount == 0 {
        return Err(GameError::InvalidCommand("amount must be positive".into()));
    }
    if amount != 1 && matches!(kind, QueueKind::Construction | QueueKind::Research) {
        return Err(GameError::InvalidCommand(format!(
            "the {kind} queue takes one item at a time"
        )));
    }
    if city.queue(kind).len() >= data.queues.capacity {
        return Err(GameError::QueueFull { kind });
    }

    let plan = plan(city, data, kind, &target, amount)?;

    let price = plan.cost.resources();
    city.resources.ensure_covers(&price)?;
    let available = city.available_population();
    if plan.cost.population > available {
        return Err(GameError::InsufficientPopulation {
            required: plan.cost.population,
            available,
        });
    }

    let start_time = city
        .queue(kind)
        .last()
        .map_or(now, |last| last.end_time.max(now));
    let item = QueueItem {
        kind,
        target,
        amount,
        cost: plan.cost,
        start_time,
        end_time: start_time.plus_millis(plan.duration_ms),
    };

    city.resources.spend(&price)?;
    city.queue_mut(kind).push(item.clone());
    Ok(item)
}

/// Remove the item at `index`, refund its full cost and pull every later
/// item forward by the removed item's duration.
///
/// # Errors
///
/// [`GameError::InvalidCommand`] if no item exists at `index`.
pub fn cancel(city: &mut CityState, kind: QueueKind, index: usize) -> Result<QueueItem> {
    let queue = city
        .queues
        .get_mut(&kind)
        .filter(|q| index < q.len())
        .ok_or_else(|| {
            GameError::InvalidCommand(format!("no item at index {index} of the {kind} queue"))
        })?;

    let item = queue.remove(index);
    let shift = item.duration_ms();
    for later in &mut queue[index..] {
        later.start_time = later.start_time.minus_millis(shift);
        later.end_time = later.end_time.minus_millis(shift);
    }
    if queue.is_empty() {
        city.queues.remove(&kind);
    }

    city.resources.deposit(&item.cost.resources());
    Ok(item)
}

/// Pop every item whose end time has passed and apply its effect.
///
/// Several items of one queue may complete in the same call. An item is
/// applied only while it is still present, so calling this again with the
/// same `now` changes nothing.
pub fn complete_due(city: &mut CityState, data: &GameData, now: Timestamp) -> Vec<QueueEvent> {
    let mut events = Vec::new();

    for kind in QueueKind::ALL {
        loop {
            let Some(queue) = city.queues.get_mut(&kind) else {
                break;
            };
            if !queue.first().is_some_and(|item| item.is_due(now)) {
                break;
            }
            let item = queue.remove(0);
            if queue.is_empty() {
                city.queues.remove(&kind);
            }

            apply_completion(city, data, &item);
            events.push(QueueEvent::Completed {
                city: city.id,
                kind,
                target: item.target,
                amount: item.amount,
                finished_at: item.end_time,
            });
        }
    }

    events
}

fn apply_completion(city: &mut CityState, data: &GameData, item: &QueueItem) {
    city.population.used = city.population.used.saturating_add(item.cost.population);

    match &item.target {
        QueueTarget::Building(id) => {
            let (max_level, extra_population) = data
                .building(id)
                .map_or((u32::MAX, 0), |b| (b.max_level, b.population_per_level));
            let state = city.buildings.entry(id.clone()).or_default();
            if state.level < max_level {
                state.level += 1;
                city.population.max = city.population.max.saturating_add(extra_population);
            }
        }
        QueueTarget::Unit(id) => {
            let count = city.units.entry(id.clone()).or_insert(0);
            *count = count.saturating_add(item.amount);
        }
        QueueTarget::Research(id) => {
            city.research.insert(id.clone());
        }
    }
}

/// Transactional front end for the queue commands and the completion tick.
#[derive(Debug, Clone)]
pub struct QueueEngine {
    data: Arc<GameData>,
    store: StateStore,
}

impl QueueEngine {
    /// Create an engine over shared game data and a store.
    #[must_use]
    pub fn new(data: Arc<GameData>, store: StateStore) -> Self {
        Self { data, store }
    }

    /// Game data in use.
    #[must_use]
    pub fn data(&self) -> &GameData {
        &self.data
    }

    /// Accept a new item into a city's queue.
    ///
    /// # Errors
    ///
    /// Validation errors from [`enqueue`], [`GameError::CityNotFound`], or
    /// [`GameError::TransientFailure`] when conflicts outlast the retry budget.
    pub fn enqueue(
        &self,
        city: CityId,
        kind: QueueKind,
        target: QueueTarget,
        amount: u32,
        now: Timestamp,
    ) -> Result<QueueItem> {
        let item = self.store.transact("enqueue", |tx| {
            let mut state = tx.require_city(city)?;
            let item = enqueue(&mut state, &self.data, kind, target.clone(), amount, now)?;
            tx.put_city(state);
            Ok(item)
        })?;

        tracing::debug!(
            %city,
            %kind,
            target = %item.target,
            amount,
            end = item.end_time.as_millis(),
            "Item queued"
        );
        Ok(item)
    }

    /// Cancel the item at `index` with a full refund.
    ///
    /// `index` refers to the queue as it stood before `now`. Items already due
    /// are completed first in the same transaction; an index pointing at one
    /// of them is rejected because that work is finished.
    ///
    /// # Errors
    ///
    /// [`GameError::InvalidCommand`] for a bad or finished index,
    /// [`GameError::CityNotFound`], or [`GameError::TransientFailure`].
    pub fn cancel(
        &self,
        city: CityId,
        kind: QueueKind,
        index: usize,
        now: Timestamp,
    ) -> Result<QueueItem> {
        let item = self.store.transact("cancel", |tx| {
            let mut state = tx.require_city(city)?;
            let finished = complete_due(&mut state, &self.data, now)
                .iter()
                .filter(|event| event.kind() == kind)
                .count();
            if index < finished {
                return Err(GameError::InvalidCommand(format!(
                    "item {index} of the {kind} queue has already completed"
                )));
            }
            let item = cancel(&mut state, kind, index - finished)?;
            tx.put_city(state);
            Ok(item)
        })?;

        tracing::debug!(%city, %kind, index, target = %item.target, "Item cancelled");
        Ok(item)
    }

    /// Complete every due item in every city.
    ///
    /// Each city is processed in its own transaction. A city that fails is
    /// reported in the summary and retried on the next tick; it never stops
    /// the remaining cities from being processed.
    pub fn tick(&self, now: Timestamp) -> TickSummary<QueueEvent> {
        let mut summary = TickSummary::default();

        let keys = match self.store.keys(DocKind::City) {
            Ok(keys) => keys,
            Err(err) => {
                tracing::warn!(error = %err, "Queue tick could not list cities");
                return summary;
            }
        };

        for key in keys {
            let DocKey::City(id) = key else {
                continue;
            };
            let result = self.store.transact("queue tick", |tx| {
                let Some(mut state) = tx.city(id)? else {
                    return Ok(Vec::new());
                };
                let events = complete_due(&mut state, &self.data, now);
                if !events.is_empty() {
                    tx.put_city(state);
                }
                Ok(events)
            });

            match result {
                Ok(events) => {
                    for event in &events {
                        tracing::debug!(city = %id, ?event, "Queue item completed");
                    }
                    summary.events.extend(events);
                }
                Err(err) => {
                    tracing::warn!(city = %id, error = %err, "Queue tick failed for city");
                    summary.failures.push(TickFailure::new(key, &err));
                }
            }
        }

        summary
    }
}
