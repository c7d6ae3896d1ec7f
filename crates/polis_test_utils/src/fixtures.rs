//! Test fixtures and helpers.
//!
//! Pre-built game data, cities and a self-contained world harness
//! for consistent testing.

use std::sync::Arc;

use polis_core::city::{Army, CityState, UnitCounts, VillageState};
use polis_core::clock::{Clock, ManualClock, Timestamp};
use polis_core::data::GameData;
use polis_core::economy::{Population, Resources};
use polis_core::events::TickSummary;
use polis_core::ids::{BuildingId, CityId, PlayerId, UnitId, VillageId};
use polis_core::math::MapPosition;
use polis_core::movement::{MovementEvent, MovementScheduler};
use polis_core::queue::{QueueEngine, QueueEvent};
use polis_core::store::{DocKind, StateStore};

/// The rules shipped in `data/game_data.ron`.
pub const STANDARD_GAME_DATA: &str = include_str!("../../../data/game_data.ron");

/// Start of every fixture world: 2024-01-01T00:00:00Z.
pub const EPOCH: Timestamp = Timestamp::from_secs(1_704_067_200);

/// Parse the standard rules.
///
/// # Panics
///
/// Panics if the shipped data file is invalid.
#[must_use]
pub fn standard_game_data() -> GameData {
    GameData::from_ron_str(STANDARD_GAME_DATA).expect("standard game data must load")
}

/// Build a unit map from `(id, count)` pairs.
#[must_use]
pub fn units(entries: &[(&str, u32)]) -> UnitCounts {
    entries
        .iter()
        .map(|(id, n)| (UnitId::new(*id), *n))
        .collect()
}

/// Land-only army.
#[must_use]
pub fn land_army(entries: &[(&str, u32)]) -> Army {
    Army::new(units(entries), UnitCounts::new())
}

/// Fluent builder for fixture cities.
#[derive(Debug, Clone)]
pub struct CityBuilder {
    city: CityState,
}

impl CityBuilder {
    /// Empty city owned by `owner` at `(x, y)`.
    #[must_use]
    pub fn new(id: u64, owner: u64, x: i32, y: i32) -> Self {
        let mut city = CityState::new(CityId(id), PlayerId(owner), MapPosition::new(x, y));
        city.name = format!("City {id}");
        city.population = Population::new(0, 1_000);
        Self { city }
    }

    /// Set the stockpile.
    #[must_use]
    pub fn resources(mut self, wood: u64, stone: u64, silver: u64) -> Self {
        self.city.resources = Resources::new(wood, stone, silver);
        self
    }

    /// Set the population cap and the slots in use.
    #[must_use]
    pub fn population(mut self, used: u32, max: u32) -> Self {
        self.city.population = Population::new(used, max);
        self
    }

    /// Set a building level.
    #[must_use]
    pub fn building(mut self, id: &str, level: u32) -> Self {
        self.city.set_building_level(BuildingId::new(id), level);
        self
    }

    /// Station units or ships in the city.
    #[must_use]
    pub fn units(mut self, entries: &[(&str, u32)]) -> Self {
        self.city.units.extend(units(entries));
        self
    }

    /// Mark research topics as completed.
    #[must_use]
    pub fn researched(mut self, topics: &[&str]) -> Self {
        self.city
            .research
            .extend(topics.iter().map(|t| (*t).into()));
        self
    }

    /// Finish the city.
    #[must_use]
    pub fn build(self) -> CityState {
        self.city
    }
}

/// A developed city able to train, build and research.
#[must_use]
pub fn developed_city(id: u64, owner: u64, x: i32, y: i32) -> CityState {
    CityBuilder::new(id, owner, x, y)
        .resources(50_000, 50_000, 50_000)
        .building("senate", 10)
        .building("farm", 20)
        .building("barracks", 10)
        .building("harbor", 5)
        .building("academy", 10)
        .build()
}

/// Village at `(x, y)` with a small garrison and stockpile.
#[must_use]
pub fn village(id: u64, x: i32, y: i32) -> VillageState {
    let mut village = VillageState::new(VillageId(id), MapPosition::new(x, y));
    village.name = format!("Village {id}");
    village.resources = Resources::new(500, 500, 500);
    village.units = units(&[("militia", 10)]);
    village
}

/// Engines, store and a manual clock wired together.
#[derive(Debug, Clone)]
pub struct World {
    /// Shared rules.
    pub data: Arc<GameData>,
    /// In-memory store.
    pub store: StateStore,
    /// Queue engine over `store`.
    pub queues: QueueEngine,
    /// Movement scheduler over `store`.
    pub movements: MovementScheduler,
    /// Clock driving both engines.
    pub clock: Arc<ManualClock>,
}

impl World {
    /// Empty world over the given rules, starting at [`EPOCH`].
    #[must_use]
    pub fn new(data: GameData) -> Self {
        let data = Arc::new(data);
        let store = StateStore::memory();
        Self {
            queues: QueueEngine::new(Arc::clone(&data), store.clone()),
            movements: MovementScheduler::new(Arc::clone(&data), store.clone()),
            clock: Arc::new(ManualClock::new(EPOCH)),
            data,
            store,
        }
    }

    /// Empty world over the standard rules.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(standard_game_data())
    }

    /// Current game time.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Store a city.
    ///
    /// # Panics
    ///
    /// Panics if the id is taken.
    pub fn add_city(&self, city: CityState) {
        self.store.create_city(city).expect("city id must be free");
    }

    /// Store a village.
    ///
    /// # Panics
    ///
    /// Panics if the id is taken.
    pub fn add_village(&self, village: VillageState) {
        self.store
            .create_village(village)
            .expect("village id must be free");
    }

    /// Current state of a city.
    ///
    /// # Panics
    ///
    /// Panics if the city does not exist.
    #[must_use]
    pub fn city(&self, id: u64) -> CityState {
        self.store
            .city(CityId(id))
            .expect("store must be readable")
            .expect("city must exist")
    }

    /// Run both ticks at the current time.
    #[must_use]
    pub fn tick(&self) -> (TickSummary<QueueEvent>, TickSummary<MovementEvent>) {
        let now = self.now();
        (self.queues.tick(now), self.movements.tick(now))
    }

    /// Advance the clock, then run both ticks.
    pub fn advance_secs(&self, secs: u64) -> (TickSummary<QueueEvent>, TickSummary<MovementEvent>) {
        self.clock.advance_millis(secs * 1_000);
        self.tick()
    }

    /// Tick every `step_secs` until no movement is left or `max_steps` ran.
    ///
    /// Returns the number of steps taken.
    pub fn run_until_settled(&self, step_secs: u64, max_steps: u32) -> u32 {
        for step in 0..max_steps {
            if self.movement_count() == 0 {
                return step;
            }
            let _ = self.advance_secs(step_secs);
        }
        max_steps
    }

    /// Number of movements in flight.
    ///
    /// # Panics
    ///
    /// Panics if the store cannot be listed.
    #[must_use]
    pub fn movement_count(&self) -> usize {
        self.store
            .keys(DocKind::Movement)
            .expect("store must be readable")
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_data_is_consistent() {
        let data = standard_game_data();
        assert!(data.validate().is_empty(), "{:?}", data.validate());
        assert!(data.research.len() > data.queues.capacity);
        assert_eq!(data.unit(&UnitId::new("swordsman")).map(|u| u.attack), Some(10));
        assert_eq!(data.unit(&UnitId::new("militia")).map(|u| u.defense), Some(8));
    }

    #[test]
    fn test_world_clock_drives_ticks() {
        let world = World::standard();
        world.add_city(developed_city(1, 1, 0, 0));
        let (queues, movements) = world.advance_secs(60);
        assert!(queues.is_idle());
        assert!(movements.is_idle());
        assert_eq!(world.now(), EPOCH.plus_millis(60_000));
        assert_eq!(world.city(1).building_level(&BuildingId::new("barracks")), 10);
    }
}
