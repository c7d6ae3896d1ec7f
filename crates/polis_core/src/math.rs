//! Fixed-point math utilities for deterministic simulation.
//!
//! Combat fractions and travel distances use fixed-point arithmetic so that
//! every server computes identical outcomes. Floating-point operations can
//! produce different results on different CPUs.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

const FRAC_BITS: u32 = 32;

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Exact quotient `num / den` as a fixed-point number.
///
/// Computed on raw bits in 128-bit integers so large power totals never
/// overflow the 32-bit integer part. Saturates at [`Fixed::MAX`].
/// Returns `None` when `den` is zero.
#[must_use]
pub fn ratio(num: u64, den: u64) -> Option<Fixed> {
    if den == 0 {
        return None;
    }
    let bits = ((u128::from(num)) << FRAC_BITS) / u128::from(den);
    let bits = i64::try_from(bits).unwrap_or(i64::MAX);
    Some(Fixed::from_bits(bits))
}

/// `round(count × fraction)` for a non-negative fraction, clamped to `count`.
///
/// Halves round up.
#[must_use]
pub fn scale_count(count: u32, fraction: Fixed) -> u32 {
    if fraction <= Fixed::ZERO {
        return 0;
    }
    if fraction >= Fixed::ONE {
        return count;
    }
    let bits = u128::try_from(fraction.to_bits()).unwrap_or(0);
    let half = 1u128 << (FRAC_BITS - 1);
    let scaled = (u128::from(count) * bits + half) >> FRAC_BITS;
    u32::try_from(scaled).unwrap_or(u32::MAX).min(count)
}

/// Apply a whole-number percentage: `value × percent / 100`, rounded down.
#[must_use]
pub fn apply_percent(value: u64, percent: u32) -> u64 {
    let scaled = u128::from(value) * u128::from(percent) / 100;
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

/// Position of a city or village on the world map (island grid coordinates).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MapPosition {
    /// X coordinate.
    pub x: i32,
    /// Y coordinate.
    pub y: i32,
}

impl MapPosition {
    /// Create a new map position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in map fields.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        let dx = Fixed::from_num(i64::from(self.x) - i64::from(other.x));
        let dy = Fixed::from_num(i64::from(self.y) - i64::from(other.y));
        fixed_sqrt(dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy)))
    }
}

/// Computes the square root of a fixed-point number using binary search.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = if value > Fixed::ONE { value } else { Fixed::ONE };

    for _ in 0..64 {
        let mid = low + (high - low) / Fixed::from_num(2);
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}
