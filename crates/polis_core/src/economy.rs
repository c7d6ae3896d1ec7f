//! Resource and population accounting.
//!
//! Cities stockpile wood, stone and silver. Costs are debited exactly once
//! when a command is accepted and credited back exactly once on refund.
//! All calculations use integer math for deterministic simulation.

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};

/// Stockpile of the three tradeable resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Resources {
    /// Wood.
    #[serde(default)]
    pub wood: u64,
    /// Stone.
    #[serde(default)]
    pub stone: u64,
    /// Silver coins.
    #[serde(default)]
    pub silver: u64,
}

impl Resources {
    /// No resources.
    pub const ZERO: Self = Self {
        wood: 0,
        stone: 0,
        silver: 0,
    };

    /// Create a new stockpile.
    #[must_use]
    pub const fn new(wood: u64, stone: u64, silver: u64) -> Self {
        Self {
            wood,
            stone,
            silver,
        }
    }

    /// Sum of all three resources.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.wood
            .saturating_add(self.stone)
            .saturating_add(self.silver)
    }

    /// Whether every resource is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Multiply every resource by `n`.
    #[must_use]
    pub const fn times(self, n: u64) -> Self {
        Self {
            wood: self.wood.saturating_mul(n),
            stone: self.stone.saturating_mul(n),
            silver: self.silver.saturating_mul(n),
        }
    }

    /// Check that `cost` fits into this stockpile.
    ///
    /// Reports the first missing resource in wood, stone, silver order.
    pub fn ensure_covers(&self, cost: &Self) -> Result<()> {
        for (resource, required, available) in [
            ("wood", cost.wood, self.wood),
            ("stone", cost.stone, self.stone),
            ("silver", cost.silver, self.silver),
        ] {
            if required > available {
                return Err(GameError::InsufficientResources {
                    resource,
                    required,
                    available,
                });
            }
        }
        Ok(())
    }

    /// Debit `cost`, failing without change if it is not covered.
    pub fn spend(&mut self, cost: &Self) -> Result<()> {
        self.ensure_covers(cost)?;
        self.wood -= cost.wood;
        self.stone -= cost.stone;
        self.silver -= cost.silver;
        Ok(())
    }

    /// Credit resources.
    pub fn deposit(&mut self, amount: &Self) {
        self.wood = self.wood.saturating_add(amount.wood);
        self.stone = self.stone.saturating_add(amount.stone);
        self.silver = self.silver.saturating_add(amount.silver);
    }

    /// Debit up to `amount`, never going below zero.
    pub fn withdraw_clamped(&mut self, amount: &Self) {
        self.wood = self.wood.saturating_sub(amount.wood);
        self.stone = self.stone.saturating_sub(amount.stone);
        self.silver = self.silver.saturating_sub(amount.silver);
    }

    /// Draw up to `capacity` units from this stockpile, proportionally to
    /// what is available of each resource.
    ///
    /// The result never exceeds `capacity` in total nor any single
    /// resource's stock. Rounding leftovers go to wood, stone, silver in
    /// that order while stock remains.
    #[must_use]
    pub fn proportional_share(&self, capacity: u64) -> Self {
        let available = self.total();
        if capacity >= available {
            return *self;
        }
        if capacity == 0 || available == 0 {
            return Self::ZERO;
        }

        let share = |stock: u64| -> u64 {
            let part = u128::from(stock) * u128::from(capacity) / u128::from(available);
            u64::try_from(part).unwrap_or(stock).min(stock)
        };
        let mut drawn = Self::new(share(self.wood), share(self.stone), share(self.silver));

        let mut leftover = capacity - drawn.total();
        for (taken, stock) in [
            (&mut drawn.wood, self.wood),
            (&mut drawn.stone, self.stone),
            (&mut drawn.silver, self.silver),
        ] {
            let extra = leftover.min(stock - *taken);
            *taken += extra;
            leftover -= extra;
        }
        drawn
    }
}

/// Price of one queue item or one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Cost {
    /// Wood.
    #[serde(default)]
    pub wood: u64,
    /// Stone.
    #[serde(default)]
    pub stone: u64,
    /// Silver coins.
    #[serde(default)]
    pub silver: u64,
    /// Population slots consumed once the item completes.
    #[serde(default)]
    pub population: u32,
}

impl Cost {
    /// Create a new cost.
    #[must_use]
    pub const fn new(wood: u64, stone: u64, silver: u64, population: u32) -> Self {
        Self {
            wood,
            stone,
            silver,
            population,
        }
    }

    /// The resource part of the cost.
    #[must_use]
    pub const fn resources(&self) -> Resources {
        Resources::new(self.wood, self.stone, self.silver)
    }

    /// Cost of `n` copies.
    #[must_use]
    pub const fn times(self, n: u32) -> Self {
        let n64 = n as u64;
        Self {
            wood: self.wood.saturating_mul(n64),
            stone: self.stone.saturating_mul(n64),
            silver: self.silver.saturating_mul(n64),
            population: self.population.saturating_mul(n),
        }
    }

    /// Scale every component by a whole-number percentage, rounding down.
    #[must_use]
    pub fn scaled_percent(self, percent: u32) -> Self {
        let scale = |v: u64| crate::math::apply_percent(v, percent);
        Self {
            wood: scale(self.wood),
            stone: scale(self.stone),
            silver: scale(self.silver),
            population: self.population,
        }
    }
}

/// Population budget of a city.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Population {
    /// Slots occupied by units and buildings.
    pub used: u32,
    /// Slots provided by farms and the base city.
    pub max: u32,
}

impl Population {
    /// Create a new population budget.
    #[must_use]
    pub const fn new(used: u32, max: u32) -> Self {
        Self { used, max }
    }

    /// Unoccupied slots.
    #[must_use]
    pub const fn free(&self) -> u32 {
        self.max.saturating_sub(self.used)
    }
}
