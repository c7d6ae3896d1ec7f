//! Deterministic battle resolution.
//!
//! [`resolve`] is a pure function of the attacking army, the defending
//! force and the external modifiers. Land units and ships fight in two
//! independent theaters: land attackers face land defenders behind the
//! wall, ships face ships only.
//!
//! In each theater that is fought, the side with strictly greater power
//! wins (a tie goes to the defender). With `s = stronger / weaker`, the
//! losing side loses `min(1, s / 2)` of every unit type and the winning
//! side loses `1 / (2s)`:
//!
//! | power gap | winner losses | loser losses |
//! |-----------|---------------|--------------|
//! | 1 : 1     | 50%           | 50%          |
//! | 1.5 : 1   | 33%           | 75%          |
//! | 2 : 1     | 25%           | 100%         |
//! | 4 : 1     | 12.5%         | 100%         |
//!
//! A side with zero power that faces any power loses everything; the other
//! side loses nothing. Fractions are applied to each unit type's count,
//! which distributes lost power across types in proportion to their share
//! of the side's total power.

use serde::{Deserialize, Serialize};

use crate::city::{
    merge_units, prune_units, remove_units_clamped, Army, CityState, UnitCounts, VillageState,
};
use crate::data::{GameData, UnitData};
use crate::economy::Resources;
use crate::math::{apply_percent, fixed_serde, ratio, scale_count, Fixed};

/// The defending side of a battle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DefenderForce {
    /// Stationed land units.
    pub units: UnitCounts,
    /// Stationed ships.
    pub ships: UnitCounts,
    /// Resources available for plunder.
    pub resources: Resources,
    /// Level of the fortification building.
    pub wall_level: u32,
}

impl DefenderForce {
    /// Defenders of a player city.
    #[must_use]
    pub fn from_city(data: &GameData, city: &CityState) -> Self {
        let (ships, units): (UnitCounts, UnitCounts) = city
            .units
            .iter()
            .map(|(id, &n)| (id.clone(), n))
            .partition(|(id, _)| data.is_naval(id));
        Self {
            units,
            ships,
            resources: city.resources,
            wall_level: data
                .combat
                .wall
                .as_ref()
                .map_or(0, |wall| city.building_level(wall)),
        }
    }

    /// Militia of an unaffiliated village. Villages have no wall and no fleet.
    #[must_use]
    pub fn from_village(village: &VillageState) -> Self {
        Self {
            units: village.units.clone(),
            ships: UnitCounts::new(),
            resources: village.resources,
            wall_level: 0,
        }
    }
}

/// External combat inputs: hero bonuses, morale and hospital space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CombatModifiers {
    /// Extra attack power in percent.
    pub attack_bonus_percent: u32,
    /// Extra defense power in percent.
    pub defense_bonus_percent: u32,
    /// Attacker morale in percent; 100 is neutral.
    pub morale_percent: u32,
    /// Wounded defenders the hospital can still take.
    pub hospital_free_capacity: u32,
}

impl Default for CombatModifiers {
    fn default() -> Self {
        Self {
            attack_bonus_percent: 0,
            defense_bonus_percent: 0,
            morale_percent: 100,
            hospital_free_capacity: 0,
        }
    }
}

/// Power totals and loss fractions of one theater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TheaterOutcome {
    /// Whether a battle took place in this theater.
    pub fought: bool,
    /// Attacking power after modifiers.
    pub attack_power: u64,
    /// Defending power after fortification and modifiers.
    pub defense_power: u64,
    /// Share of every attacking unit type lost.
    #[serde(with = "fixed_serde")]
    pub attacker_loss_fraction: Fixed,
    /// Share of every defending unit type lost.
    #[serde(with = "fixed_serde")]
    pub defender_loss_fraction: Fixed,
}

impl TheaterOutcome {
    /// Whether the attacker won this theater.
    #[must_use]
    pub const fn attacker_won(&self) -> bool {
        self.fought && self.attack_power > self.defense_power
    }
}

/// Outcome of one battle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CombatResult {
    /// Whether the attacker won every theater that was fought.
    pub attacker_won: bool,
    /// Attacking units and ships killed.
    pub attacker_losses: UnitCounts,
    /// Defending units and ships killed.
    pub defender_losses: UnitCounts,
    /// Defending land units moved to the hospital instead of dying.
    pub wounded: UnitCounts,
    /// What is left of the attacking army.
    pub surviving_attackers: Army,
    /// Resources taken from the defender.
    pub plunder: Resources,
    /// Land theater details.
    pub land: TheaterOutcome,
    /// Naval theater details.
    pub naval: TheaterOutcome,
    /// Notable circumstance of the battle.
    pub message: Option<String>,
}

impl CombatResult {
    /// Every defending unit that leaves the defender's unit map, dead or wounded.
    #[must_use]
    pub fn defender_removed(&self) -> UnitCounts {
        let mut removed = self.defender_losses.clone();
        merge_units(&mut removed, &self.wounded);
        removed
    }
}

/// Loss fractions `(attacker, defender)` for one theater.
#[must_use]
pub fn loss_fractions(attack: u64, defense: u64) -> (Fixed, Fixed) {
    if attack == 0 && defense == 0 {
        return (Fixed::ZERO, Fixed::ZERO);
    }
    let attacker_wins = attack > defense;
    let (stronger, weaker) = if attacker_wins {
        (attack, defense)
    } else {
        (defense, attack)
    };

    let (winner, loser) = if weaker == 0 {
        (Fixed::ZERO, Fixed::ONE)
    } else {
        let winner = ratio(weaker, stronger.saturating_mul(2)).unwrap_or(Fixed::ZERO);
        let loser = ratio(stronger, weaker.saturating_mul(2))
            .unwrap_or(Fixed::ONE)
            .min(Fixed::ONE);
        (winner, loser)
    };

    if attacker_wins {
        (winner, loser)
    } else {
        (loser, winner)
    }
}

fn power(data: &GameData, counts: &UnitCounts, stat: fn(&UnitData) -> u32) -> u64 {
    counts
        .iter()
        .map(|(id, &n)| u64::from(n) * u64::from(data.unit(id).map_or(0, stat)))
        .fold(0u64, u64::saturating_add)
}

fn losses(counts: &UnitCounts, fraction: Fixed) -> UnitCounts {
    counts
        .iter()
        .map(|(id, &n)| (id.clone(), scale_count(n, fraction)))
        .filter(|&(_, lost)| lost > 0)
        .collect()
}

fn fight(attack_power: u64, defense_power: u64, attackers_present: bool) -> TheaterOutcome {
    let fought = attackers_present && (attack_power > 0 || defense_power > 0);
    let (attacker_loss_fraction, defender_loss_fraction) = if fought {
        loss_fractions(attack_power, defense_power)
    } else {
        (Fixed::ZERO, Fixed::ZERO)
    };
    TheaterOutcome {
        fought,
        attack_power,
        defense_power,
        attacker_loss_fraction,
        defender_loss_fraction,
    }
}

/// Resolve a battle.
///
/// Identical inputs always produce an identical result: all iteration is
/// over sorted maps and all fractional math is fixed-point.
#[must_use]
pub fn resolve(
    data: &GameData,
    attacker: &Army,
    defender: &DefenderForce,
    modifiers: &CombatModifiers,
) -> CombatResult {
    let rules = &data.combat;
    let boost_attack = |raw: u64| {
        apply_percent(
            apply_percent(raw, 100 + modifiers.attack_bonus_percent),
            modifiers.morale_percent,
        )
    };
    let boost_defense = |raw: u64| apply_percent(raw, 100 + modifiers.defense_bonus_percent);

    // Land: the wall adds flat defense and a multiplier, even with no defenders
    let wall_flat = rules
        .wall_base_defense_per_level
        .saturating_mul(u64::from(defender.wall_level));
    let wall_percent = rules
        .wall_bonus_percent_per_level
        .saturating_mul(defender.wall_level)
        .saturating_add(100);
    let land_defense = apply_percent(
        power(data, &defender.units, |u| u.defense).saturating_add(wall_flat),
        wall_percent,
    );
    let land = fight(
        boost_attack(power(data, &attacker.units, |u| u.attack)),
        boost_defense(land_defense),
        !attacker.units.is_empty(),
    );

    let naval = fight(
        boost_attack(power(data, &attacker.ships, |u| u.attack)),
        boost_defense(power(data, &defender.ships, |u| u.defense)),
        !attacker.ships.is_empty(),
    );

    let attacker_won = (land.fought || naval.fought)
        && (!land.fought || land.attacker_won())
        && (!naval.fought || naval.attacker_won());

    let land_attacker_losses = losses(&attacker.units, land.attacker_loss_fraction);
    let naval_attacker_losses = losses(&attacker.ships, naval.attacker_loss_fraction);
    let mut land_defender_losses = losses(&defender.units, land.defender_loss_fraction);
    let naval_defender_losses = losses(&defender.ships, naval.defender_loss_fraction);

    let mut wounded = UnitCounts::new();
    if land.attacker_won() && rules.wounded_percent > 0 {
        let mut capacity = u64::from(modifiers.hospital_free_capacity);
        for (id, lost) in &mut land_defender_losses {
            if capacity == 0 {
                break;
            }
            let hurt = apply_percent(u64::from(*lost), rules.wounded_percent).min(capacity);
            if hurt > 0 {
                let hurt32 = u32::try_from(hurt).unwrap_or(*lost).min(*lost);
                *lost -= hurt32;
                capacity -= u64::from(hurt32);
                wounded.insert(id.clone(), hurt32);
            }
        }
        prune_units(&mut land_defender_losses);
    }

    let mut surviving_attackers = attacker.clone();
    remove_units_clamped(&mut surviving_attackers.units, &land_attacker_losses);
    remove_units_clamped(&mut surviving_attackers.ships, &naval_attacker_losses);
    prune_units(&mut surviving_attackers.units);
    prune_units(&mut surviving_attackers.ships);

    let plunder = if attacker_won {
        let carry = surviving_attackers
            .units
            .iter()
            .chain(&surviving_attackers.ships)
            .map(|(id, &n)| u64::from(n) * u64::from(data.unit(id).map_or(0, |u| u.carry)))
            .fold(0u64, u64::saturating_add);
        defender.resources.proportional_share(carry)
    } else {
        Resources::ZERO
    };

    let mut attacker_losses = land_attacker_losses;
    merge_units(&mut attacker_losses, &naval_attacker_losses);
    let mut defender_losses = land_defender_losses;
    merge_units(&mut defender_losses, &naval_defender_losses);

    let message = if !land.fought && !naval.fought {
        Some("No battle took place".to_string())
    } else if attacker_won && land.defense_power == 0 && naval.defense_power == 0 {
        Some("The attack met no resistance".to_string())
    } else if [land, naval]
        .iter()
        .any(|t| t.fought && t.attack_power == t.defense_power)
    {
        Some("The forces were evenly matched; the defenders held".to_string())
    } else {
        None
    };

    CombatResult {
        attacker_won,
        attacker_losses,
        defender_losses,
        wounded,
        surviving_attackers,
        plunder,
        land,
        naval,
        message,
    }
}

/// Space left in the defender's hospital.
#[must_use]
pub fn hospital_free_capacity(data: &GameData, city: &CityState) -> u32 {
    let Some(hospital) = &data.combat.hospital else {
        return 0;
    };
    let capacity = u64::from(city.building_level(hospital))
        * u64::from(data.combat.hospital_capacity_per_level);
    let free = capacity.saturating_sub(city.wounded_total());
    u32::try_from(free).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{BuildingId, CityId, PlayerId, UnitId};
    use crate::math::MapPosition;

    const DATA: &str = r#"
GameData(
    units: [
        (id: "swordsman", name: "Swordsman", cost: (wood: 95), build_time_secs: 60,
         attack: 10, defense: 8, speed: 8, carry: 16, produced_at: "barracks"),
        (id: "militia", name: "Militia", cost: (wood: 0), build_time_secs: 1,
         attack: 2, defense: 8, speed: 1, produced_at: "barracks"),
        (id: "slinger", name: "Slinger", cost: (wood: 55), build_time_secs: 40,
         attack: 23, defense: 7, speed: 14, carry: 8, produced_at: "barracks"),
        (id: "trireme", name: "Trireme", cost: (wood: 2000), build_time_secs: 900,
         attack: 250, defense: 250, speed: 15, naval: true, produced_at: "harbor"),
    ],
    buildings: [
        (id: "barracks", name: "Barracks", base_cost: (wood: 0), base_build_time_secs: 1, max_level: 30),
        (id: "harbor", name: "Harbor", base_cost: (wood: 0), base_build_time_secs: 1, max_level: 30),
        (id: "wall", name: "Wall", base_cost: (wood: 0), base_build_time_secs: 1, max_level: 25),
        (id: "hospital", name: "Hospital", base_cost: (wood: 0), base_build_time_secs: 1, max_level: 10),
    ],
    combat: (
        wall: Some("wall"),
        wall_base_defense_per_level: 100,
        wall_bonus_percent_per_level: 10,
        hospital: Some("hospital"),
        hospital_capacity_per_level: 5,
        wounded_percent: 50,
    ),
)
"#;

    fn data() -> GameData {
        GameData::from_ron_str(DATA).unwrap()
    }

    fn counts(entries: &[(&str, u32)]) -> UnitCounts {
        entries
            .iter()
            .map(|(id, n)| (UnitId::new(*id), *n))
            .collect()
    }

    fn land(entries: &[(&str, u32)]) -> Army {
        Army::new(counts(entries), UnitCounts::new())
    }

    fn defenders(entries: &[(&str, u32)], resources: Resources) -> DefenderForce {
        DefenderForce {
            units: counts(entries),
            resources,
            ..DefenderForce::default()
        }
    }

    #[test]
    fn test_loss_curve_boundaries() {
        let half = Fixed::from_num(0.5);
        assert_eq!(loss_fractions(100, 100), (half, half));
        assert_eq!(loss_fractions(200, 100), (Fixed::from_num(0.25), Fixed::ONE));
        assert_eq!(loss_fractions(100, 400), (Fixed::ONE, Fixed::from_num(0.125)));
        assert_eq!(loss_fractions(10, 0), (Fixed::ZERO, Fixed::ONE));
        assert_eq!(loss_fractions(0, 10), (Fixed::ONE, Fixed::ZERO));
        assert_eq!(loss_fractions(0, 0), (Fixed::ZERO, Fixed::ZERO));
    }

    #[test]
    fn test_swordsmen_beat_militia() {
        let result = resolve(
            &data(),
            &land(&[("swordsman", 100)]),
            &defenders(&[("militia", 50)], Resources::new(1_000, 1_000, 1_000)),
            &CombatModifiers::default(),
        );

        assert!(result.attacker_won);
        assert_eq!(result.land.attack_power, 1_000);
        assert_eq!(result.land.defense_power, 400);
        assert_eq!(result.defender_losses, counts(&[("militia", 50)]));
        assert_eq!(result.attacker_losses, counts(&[("swordsman", 20)]));
        assert_eq!(result.surviving_attackers, land(&[("swordsman", 80)]));
        // 80 survivors x 16 carry
        assert_eq!(result.plunder.total(), 1_280);
        assert!(!result.naval.fought);
    }

    #[test]
    fn test_tie_goes_to_defender() {
        let result = resolve(
            &data(),
            &land(&[("swordsman", 40)]),
            &defenders(&[("militia", 50)], Resources::new(500, 0, 0)),
            &CombatModifiers::default(),
        );
        assert!(!result.attacker_won);
        assert_eq!(result.attacker_losses, counts(&[("swordsman", 20)]));
        assert_eq!(result.defender_losses, counts(&[("militia", 25)]));
        assert_eq!(result.plunder, Resources::ZERO);
        assert!(result.message.is_some());
    }

    #[test]
    fn test_undefended_target() {
        let result = resolve(
            &data(),
            &land(&[("slinger", 10)]),
            &defenders(&[], Resources::new(10, 20, 30)),
            &CombatModifiers::default(),
        );
        assert!(result.attacker_won);
        assert!(result.defender_losses.is_empty());
        assert!(result.attacker_losses.is_empty());
        assert_eq!(result.plunder, Resources::new(10, 20, 30));
        assert_eq!(result.message.as_deref(), Some("The attack met no resistance"));
    }

    #[test]
    fn test_wall_defends_empty_city() {
        let mut force = defenders(&[], Resources::ZERO);
        force.wall_level = 2;
        // (0 + 200) x 120% = 240 defense vs 230 attack
        let result = resolve(
            &data(),
            &land(&[("slinger", 10)]),
            &force,
            &CombatModifiers::default(),
        );
        assert_eq!(result.land.defense_power, 240);
        assert!(!result.attacker_won);
        // 240 / 460 of the slingers fall
        assert_eq!(result.attacker_losses, counts(&[("slinger", 5)]));
        assert!(result.defender_losses.is_empty());
    }

    #[test]
    fn test_modifiers_scale_power() {
        let modifiers = CombatModifiers {
            attack_bonus_percent: 20,
            defense_bonus_percent: 10,
            morale_percent: 50,
            hospital_free_capacity: 0,
        };
        let result = resolve(
            &data(),
            &land(&[("swordsman", 100)]),
            &defenders(&[("militia", 50)], Resources::ZERO),
            &modifiers,
        );
        assert_eq!(result.land.attack_power, 600);
        assert_eq!(result.land.defense_power, 440);
    }

    #[test]
    fn test_theaters_are_independent() {
        let attacker = Army::new(counts(&[("swordsman", 100)]), counts(&[("trireme", 1)]));
        let mut force = defenders(&[("militia", 10)], Resources::ZERO);
        force.ships = counts(&[("trireme", 2)]);

        let result = resolve(&data(), &attacker, &force, &CombatModifiers::default());
        assert!(result.land.attacker_won());
        assert!(result.naval.fought);
        assert!(!result.naval.attacker_won());
        // Losing at sea loses the battle
        assert!(!result.attacker_won);
        assert_eq!(result.attacker_losses.get(&UnitId::new("trireme")), Some(&1));
        assert_eq!(result.defender_losses.get(&UnitId::new("militia")), Some(&10));
    }

    #[test]
    fn test_ships_ignore_land_defenders() {
        let attacker = Army::new(UnitCounts::new(), counts(&[("trireme", 3)]));
        let result = resolve(
            &data(),
            &attacker,
            &defenders(&[("militia", 1_000)], Resources::ZERO),
            &CombatModifiers::default(),
        );
        assert!(result.attacker_won);
        assert!(!result.land.fought);
        assert!(result.defender_losses.is_empty());
    }

    #[test]
    fn test_wounded_capped_by_hospital() {
        let modifiers = CombatModifiers {
            hospital_free_capacity: 10,
            ..CombatModifiers::default()
        };
        let result = resolve(
            &data(),
            &land(&[("swordsman", 100)]),
            &defenders(&[("militia", 50)], Resources::ZERO),
            &modifiers,
        );
        // Half of 50 would be wounded, the hospital takes 10
        assert_eq!(result.wounded, counts(&[("militia", 10)]));
        assert_eq!(result.defender_losses, counts(&[("militia", 40)]));
        assert_eq!(result.defender_removed(), counts(&[("militia", 50)]));
    }

    #[test]
    fn test_wounded_follow_the_land_battle() {
        let modifiers = CombatModifiers {
            hospital_free_capacity: 100,
            ..CombatModifiers::default()
        };
        let attacker = Army::new(counts(&[("swordsman", 100)]), counts(&[("trireme", 1)]));
        let mut force = defenders(&[("militia", 10)], Resources::ZERO);
        force.ships = counts(&[("trireme", 2)]);

        let result = resolve(&data(), &attacker, &force, &modifiers);
        assert!(!result.attacker_won);
        assert!(result.land.attacker_won());
        assert_eq!(result.wounded, counts(&[("militia", 5)]));
        assert_eq!(result.defender_losses.get(&UnitId::new("militia")), Some(&5));
        assert_eq!(result.defender_removed().get(&UnitId::new("militia")), Some(&10));
    }

    #[test]
    fn test_no_wounded_when_defender_wins() {
        let modifiers = CombatModifiers {
            hospital_free_capacity: 100,
            ..CombatModifiers::default()
        };
        let result = resolve(
            &data(),
            &land(&[("swordsman", 10)]),
            &defenders(&[("militia", 50)], Resources::ZERO),
            &modifiers,
        );
        assert!(!result.attacker_won);
        assert!(result.wounded.is_empty());
    }

    #[test]
    fn test_defender_force_from_city() {
        let data = data();
        let mut city = CityState::new(CityId(1), PlayerId(1), MapPosition::new(0, 0));
        city.units = counts(&[("militia", 5), ("trireme", 2)]);
        city.set_building_level(BuildingId::new("wall"), 3);
        city.set_building_level(BuildingId::new("hospital"), 2);
        city.wounded = counts(&[("militia", 4)]);

        let force = DefenderForce::from_city(&data, &city);
        assert_eq!(force.units, counts(&[("militia", 5)]));
        assert_eq!(force.ships, counts(&[("trireme", 2)]));
        assert_eq!(force.wall_level, 3);
        assert_eq!(hospital_free_capacity(&data, &city), 6);
    }
}
