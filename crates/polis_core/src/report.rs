//! Player-visible reports written by the movement scheduler.
//!
//! A report is committed in the same transaction as the state change it
//! describes, so a report exists if and only if the arrival was applied.
//! Reports are handed to the notification sink as JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::city::{Army, UnitCounts};
use crate::clock::Timestamp;
use crate::combat::CombatResult;
use crate::economy::Resources;
use crate::ids::{BuildingId, CityId, MovementId, PlayerId, ReportId};
use crate::movement::{MovementKind, TargetRef};

/// What a scout saw at the target.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScoutSnapshot {
    /// Stationed units and ships.
    pub units: UnitCounts,
    /// Stockpiled resources.
    pub resources: Resources,
    /// Building levels (empty for villages).
    pub buildings: BTreeMap<BuildingId, u32>,
}

/// Report payload, one variant per arrival outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportBody {
    /// An attack was fought.
    Battle {
        /// Attacking army before the battle.
        attacker: Army,
        /// Battle outcome.
        result: CombatResult,
        /// Movement carrying the survivors home, if any survived.
        returning: Option<MovementId>,
    },
    /// The target no longer existed on arrival.
    TargetVanished {
        /// Mission of the movement.
        kind: MovementKind,
        /// Army that travelled.
        army: Army,
        /// Resources that travelled.
        resources: Resources,
        /// Movement bringing the cargo home, `None` if it was lost.
        returning: Option<MovementId>,
    },
    /// Scouts reached the target.
    Scouting {
        /// Observed state.
        snapshot: ScoutSnapshot,
    },
    /// Units joined the target's garrison.
    Reinforcement {
        /// Arriving army.
        army: Army,
    },
    /// Resources were delivered.
    Trade {
        /// Delivered resources.
        resources: Resources,
    },
    /// A returning movement reached home.
    Returned {
        /// Units back in the city.
        army: Army,
        /// Resources deposited.
        resources: Resources,
    },
    /// A returning movement found its home city gone.
    ReturnLost {
        /// Units lost.
        army: Army,
        /// Resources lost.
        resources: Resources,
    },
}

/// A stored report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Report identifier.
    pub id: ReportId,
    /// When the described arrival happened.
    pub created_at: Timestamp,
    /// Players who receive the report.
    pub recipients: Vec<PlayerId>,
    /// Movement that produced the report.
    pub movement: MovementId,
    /// Home city of the movement.
    pub origin: CityId,
    /// Destination of the movement.
    pub target: TargetRef,
    /// Payload.
    pub body: ReportBody,
}

impl Report {
    /// Short human-readable title.
    #[must_use]
    pub fn title(&self) -> String {
        match &self.body {
            ReportBody::Battle { result, .. } if result.attacker_won => {
                format!("{} conquered the defenders of {}", self.origin, self.target)
            }
            ReportBody::Battle { .. } => {
                format!("{} was repelled at {}", self.origin, self.target)
            }
            ReportBody::TargetVanished { kind, .. } => {
                format!("{kind} from {} found no {}", self.origin, self.target)
            }
            ReportBody::Scouting { .. } => format!("{} scouted {}", self.origin, self.target),
            ReportBody::Reinforcement { .. } => {
                format!("{} reinforced {}", self.origin, self.target)
            }
            ReportBody::Trade { .. } => format!("{} traded with {}", self.origin, self.target),
            ReportBody::Returned { .. } => format!("Troops returned to {}", self.origin),
            ReportBody::ReturnLost { .. } => format!("{} no longer exists", self.origin),
        }
    }

    /// Serialize for the notification sink.
    ///
    /// # Errors
    ///
    /// Fails only if a map key cannot be rendered as a JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{UnitId, VillageId};

    fn report(body: ReportBody) -> Report {
        Report {
            id: ReportId(7),
            created_at: Timestamp::from_secs(60),
            recipients: vec![PlayerId(1)],
            movement: MovementId(3),
            origin: CityId(1),
            target: TargetRef::Village(VillageId(2)),
            body,
        }
    }

    #[test]
    fn test_json_shape() {
        let mut units = UnitCounts::new();
        units.insert(UnitId::new("swordsman"), 30);
        let r = report(ReportBody::Returned {
            army: Army::new(units, UnitCounts::new()),
            resources: Resources::new(1, 2, 3),
        });

        let json: serde_json::Value = serde_json::from_str(&r.to_json().unwrap()).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["created_at"], 60_000);
        assert_eq!(json["body"]["Returned"]["army"]["units"]["swordsman"], 30);
        assert_eq!(json["body"]["Returned"]["resources"]["silver"], 3);
    }

    #[test]
    fn test_battle_report_round_trips_through_json() {
        let r = report(ReportBody::Battle {
            attacker: Army::default(),
            result: CombatResult {
                attacker_won: true,
                message: Some("The attack met no resistance".into()),
                ..CombatResult::default()
            },
            returning: Some(MovementId(4)),
        });
        let back: Report = serde_json::from_str(&r.to_json().unwrap()).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_titles() {
        let r = report(ReportBody::Trade {
            resources: Resources::ZERO,
        });
        assert_eq!(r.title(), "CityId#1 traded with VillageId#2");
    }
}
