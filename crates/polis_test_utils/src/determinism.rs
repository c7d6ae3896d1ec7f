//! Determinism testing utilities.
//!
//! Provides a harness for verifying that worlds produce identical
//! results given identical inputs.
//!
//! # Testing Strategy
//!
//! Battle outcomes and queue timings must not depend on the machine or on
//! the order documents happen to be stored in. Sources of non-determinism
//! include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`polis_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Unit maps are `BTreeMap`s and documents are listed in key order.
//!
//! - **Wall-clock time**: Engines only see the `now` they are handed.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: `combat::resolve` on fixed inputs
//! 2. **Property tests**: Random armies must still produce identical results
//! 3. **Integration tests**: Whole worlds replay to the same state hash
//! 4. **Parallel tests**: Running N worlds on threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use polis_core::store::{DocKind, StateStore};

use crate::fixtures::World;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of steps simulated.
    pub steps: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic world).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that every run matched, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "World is non-deterministic!\n\
                 Runs: {}\n\
                 Steps: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.steps,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a stateful process multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `steps` - Number of steps per run
/// * `setup` - Function to create the initial state
/// * `step` - Function to advance the state by one step
/// * `hash` - Function to compute the state hash
///
/// # Example
///
/// ```
/// use polis_test_utils::determinism::verify_determinism;
///
/// let result = verify_determinism(3, 100, || 0u64, |n| *n += 1, |n| *n);
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    steps: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..steps {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        steps,
    }
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Hash of every document in the store, in key order.
///
/// # Panics
///
/// Panics if the store cannot be read or a document cannot be rendered.
#[must_use]
pub fn store_hash(store: &StateStore) -> u64 {
    let mut hasher = DefaultHasher::new();
    for kind in [
        DocKind::City,
        DocKind::Village,
        DocKind::Movement,
        DocKind::Report,
    ] {
        for key in store.keys(kind).expect("store must be readable") {
            let doc = store.get(key).expect("store must be readable");
            let text = ron::to_string(&doc).expect("documents must serialize");
            key.to_string().hash(&mut hasher);
            text.hash(&mut hasher);
        }
    }
    hasher.finish()
}

/// Build a world twice, advance each by `steps` ticks of `step_secs`, and
/// compare the final store hashes.
pub fn verify_world_determinism<F>(setup: F, steps: u64, step_secs: u64) -> DeterminismResult
where
    F: Fn() -> World,
{
    verify_determinism(
        2,
        steps,
        setup,
        |world| {
            let _ = world.advance_secs(step_secs);
        },
        |world| store_hash(&world.store),
    )
}

/// Run N worlds on scoped threads and collect final hashes.
///
/// Catches non-determinism that only shows up under thread scheduling.
pub fn run_parallel_worlds<F>(
    setup: F,
    num_worlds: usize,
    steps: u64,
    step_secs: u64,
) -> DeterminismResult
where
    F: Fn() -> World + Sync,
{
    let hashes: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..num_worlds)
            .map(|_| {
                s.spawn(|| {
                    let world = setup();
                    for _ in 0..steps {
                        let _ = world.advance_secs(step_secs);
                    }
                    store_hash(&world.store)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("world thread panicked"))
            .collect()
    });

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        steps,
    }
}

/// Proptest strategies for combat and queue properties.
///
/// Unit ids refer to the standard rules in `data/game_data.ron`.
pub mod strategies {
    use polis_core::city::{Army, UnitCounts};
    use polis_core::combat::{CombatModifiers, DefenderForce};
    use polis_core::economy::Resources;
    use polis_core::ids::UnitId;
    use proptest::prelude::*;

    /// Land units of the standard rules.
    pub const LAND_UNITS: [&str; 7] = [
        "militia",
        "swordsman",
        "slinger",
        "archer",
        "hoplite",
        "horseman",
        "scout",
    ];

    /// Ships of the standard rules.
    pub const SHIPS: [&str; 2] = ["bireme", "light_ship"];

    /// Generate a unit map over `ids` with up to `max` of each.
    pub fn arb_unit_counts(ids: &'static [&'static str], max: u32) -> impl Strategy<Value = UnitCounts> {
        proptest::collection::vec(0..=max, ids.len()).prop_map(move |counts| {
            ids.iter()
                .zip(counts)
                .filter(|&(_, n)| n > 0)
                .map(|(id, n)| (UnitId::new(*id), n))
                .collect()
        })
    }

    /// Generate a stockpile of up to `max` per resource.
    pub fn arb_resources(max: u64) -> impl Strategy<Value = Resources> {
        (0..=max, 0..=max, 0..=max).prop_map(|(w, s, c)| Resources::new(w, s, c))
    }

    /// Generate an attacking army, possibly with ships.
    pub fn arb_army() -> impl Strategy<Value = Army> {
        (
            arb_unit_counts(&LAND_UNITS, 500),
            arb_unit_counts(&SHIPS, 20),
        )
            .prop_map(|(units, ships)| Army::new(units, ships))
    }

    /// Generate a defending force with resources and a wall.
    pub fn arb_defender_force() -> impl Strategy<Value = DefenderForce> {
        (
            arb_unit_counts(&LAND_UNITS, 500),
            arb_unit_counts(&SHIPS, 20),
            arb_resources(20_000),
            0u32..=25,
        )
            .prop_map(|(units, ships, resources, wall_level)| DefenderForce {
                units,
                ships,
                resources,
                wall_level,
            })
    }

    /// Generate external combat modifiers.
    pub fn arb_modifiers() -> impl Strategy<Value = CombatModifiers> {
        (0u32..=50, 0u32..=50, 30u32..=100, 0u32..=200).prop_map(
            |(attack, defense, morale, hospital)| CombatModifiers {
                attack_bonus_percent: attack,
                defense_bonus_percent: defense,
                morale_percent: morale,
                hospital_free_capacity: hospital,
            },
        )
    }
}
