//! Initial world contents.
//!
//! A seed file lists the cities and villages that exist when the server
//! starts. Seeding skips documents that already exist, so restarting
//! against a persistent store does not reset them.

use std::collections::BTreeMap;
use std::path::Path;

use polis_core::city::{CityState, UnitCounts, VillageState};
use polis_core::data::GameData;
use polis_core::economy::{Population, Resources};
use polis_core::error::{GameError, StoreError};
use polis_core::ids::{BuildingId, CityId, PlayerId, ResearchId, VillageId};
use polis_core::math::MapPosition;
use polis_core::store::StateStore;
use serde::{Deserialize, Serialize};

use crate::config::{read_file, ConfigError};

/// A city in the seed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitySeed {
    /// City identifier.
    pub id: u64,
    /// Owning player.
    pub owner: u64,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Island coordinates.
    pub position: (i32, i32),
    /// Starting stockpile.
    #[serde(default)]
    pub resources: Resources,
    /// Starting population cap.
    #[serde(default)]
    pub population: u32,
    /// Starting building levels.
    #[serde(default)]
    pub buildings: BTreeMap<BuildingId, u32>,
    /// Starting garrison.
    #[serde(default)]
    pub units: UnitCounts,
    /// Completed research.
    #[serde(default)]
    pub research: Vec<ResearchId>,
}

/// A village in the seed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VillageSeed {
    /// Village identifier.
    pub id: u64,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Island coordinates.
    pub position: (i32, i32),
    /// Stockpile available for plunder.
    #[serde(default)]
    pub resources: Resources,
    /// Defending units.
    #[serde(default)]
    pub units: UnitCounts,
}

/// Contents of a world seed file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSeed {
    /// Player cities.
    #[serde(default)]
    pub cities: Vec<CitySeed>,
    /// Unaffiliated villages.
    #[serde(default)]
    pub villages: Vec<VillageSeed>,
}

/// Counts of what [`WorldSeed::apply`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedStats {
    /// Cities created.
    pub cities: usize,
    /// Villages created.
    pub villages: usize,
    /// Documents left alone because they already existed.
    pub skipped: usize,
}

impl WorldSeed {
    /// Load a seed from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = read_file(path.as_ref())?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string.
    pub fn from_ron_str(ron: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(ron)?)
    }

    /// Check every id against the game data.
    pub fn validate(&self, data: &GameData) -> Vec<String> {
        let mut errors = Vec::new();
        for city in &self.cities {
            for building in city.buildings.keys() {
                if data.building(building).is_none() {
                    errors.push(format!("City {} has unknown building '{building}'", city.id));
                }
            }
            for unit in city.units.keys() {
                if data.unit(unit).is_none() {
                    errors.push(format!("City {} has unknown unit '{unit}'", city.id));
                }
            }
            for topic in &city.research {
                if data.research(topic).is_none() {
                    errors.push(format!("City {} has unknown research '{topic}'", city.id));
                }
            }
        }
        for village in &self.villages {
            for unit in village.units.keys() {
                if data.unit(unit).is_none() {
                    errors.push(format!("Village {} has unknown unit '{unit}'", village.id));
                }
            }
        }
        errors
    }

    /// Create every listed city and village that does not exist yet.
    pub fn apply(&self, store: &StateStore, data: &GameData) -> Result<SeedStats, ConfigError> {
        let errors = self.validate(data);
        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors.join("; ")));
        }

        let mut stats = SeedStats::default();
        for seed in &self.cities {
            if created(store.create_city(city_state(seed, data)))? {
                stats.cities += 1;
            } else {
                stats.skipped += 1;
            }
        }
        for seed in &self.villages {
            if created(store.create_village(village_state(seed)))? {
                stats.villages += 1;
            } else {
                stats.skipped += 1;
            }
        }

        tracing::info!(
            cities = stats.cities,
            villages = stats.villages,
            skipped = stats.skipped,
            "World seeded"
        );
        Ok(stats)
    }
}

fn created(result: polis_core::error::Result<()>) -> Result<bool, ConfigError> {
    match result {
        Ok(()) => Ok(true),
        Err(GameError::Store(StoreError::AlreadyExists(key))) => {
            tracing::debug!(%key, "Seed document already present");
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

fn city_state(seed: &CitySeed, data: &GameData) -> CityState {
    let (x, y) = seed.position;
    let mut city = CityState::new(CityId(seed.id), PlayerId(seed.owner), MapPosition::new(x, y));
    city.name.clone_from(&seed.name);
    city.resources = seed.resources;
    for (building, &level) in &seed.buildings {
        city.set_building_level(building.clone(), level);
    }
    let from_buildings: u32 = seed
        .buildings
        .iter()
        .filter_map(|(id, &level)| {
            data.building(id)
                .map(|b| b.population_per_level.saturating_mul(level))
        })
        .sum();
    city.units = seed.units.clone();
    city.research = seed.research.iter().cloned().collect();

    let used: u32 = seed
        .units
        .iter()
        .map(|(id, &n)| data.unit(id).map_or(0, |u| u.cost.population.saturating_mul(n)))
        .sum();
    city.population = Population::new(used, seed.population.saturating_add(from_buildings));
    city
}

fn village_state(seed: &VillageSeed) -> VillageState {
    let (x, y) = seed.position;
    let mut village = VillageState::new(VillageId(seed.id), MapPosition::new(x, y));
    village.name.clone_from(&seed.name);
    village.resources = seed.resources;
    village.units = seed.units.clone();
    village
}
