//! In-flight armies, caravans and scouts, and the scheduler that lands them.
//!
//! A [`Movement`] is created by [`MovementScheduler::dispatch`] and only
//! ever changed by [`MovementScheduler::tick`]: on arrival it is deleted, or
//! replaced by a new `Returning` movement carrying what comes back. Every
//! arrival is one store transaction covering the movement, the cities it
//! touches and its report, so an arrival is applied exactly once.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::city::{
    merge_units, remove_units_clamped, take_units, Army, CityState, UnitCounts, VillageState,
};
use crate::clock::{Timestamp, MILLIS_PER_SECOND};
use crate::combat::{hospital_free_capacity, resolve, CombatModifiers, DefenderForce};
use crate::data::GameData;
use crate::economy::Resources;
use crate::error::{GameError, Result};
use crate::events::{TickFailure, TickSummary};
use crate::ids::{CityId, MovementId, PlayerId, ReportId, VillageId};
use crate::math::MapPosition;
use crate::report::{Report, ReportBody, ScoutSnapshot};
use crate::store::{DocKey, DocKind, Document, StateStore, Transaction};

const MILLIS_PER_HOUR: u64 = 3_600 * MILLIS_PER_SECOND;

/// Mission of a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MovementKind {
    /// Fight the target's defenders and plunder.
    Attack,
    /// Join the target city's garrison.
    Reinforce,
    /// Deliver resources to the target city.
    Trade,
    /// Observe the target.
    Scout,
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Attack => "attack",
            Self::Reinforce => "reinforcement",
            Self::Trade => "trade",
            Self::Scout => "scouting",
        };
        f.write_str(name)
    }
}

/// Leg of the trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementStatus {
    /// On the way to the target.
    InTransit,
    /// On the way back to the origin.
    Returning,
}

/// Destination of a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TargetRef {
    /// A player city.
    City(CityId),
    /// An unaffiliated village.
    Village(VillageId),
}

impl TargetRef {
    /// Whether the target is a village.
    #[must_use]
    pub const fn is_village_target(&self) -> bool {
        matches!(self, Self::Village(_))
    }

    /// Target city, if the target is a city.
    #[must_use]
    pub const fn city(&self) -> Option<CityId> {
        match self {
            Self::City(id) => Some(*id),
            Self::Village(_) => None,
        }
    }

    /// Store key of the target document.
    #[must_use]
    pub const fn key(&self) -> DocKey {
        match self {
            Self::City(id) => DocKey::City(*id),
            Self::Village(id) => DocKey::Village(*id),
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::City(id) => id.fmt(f),
            Self::Village(id) => id.fmt(f),
        }
    }
}

/// A stored movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    /// Movement identifier.
    pub id: MovementId,
    /// Player who sent it.
    pub owner: PlayerId,
    /// Mission.
    pub kind: MovementKind,
    /// Outbound or returning.
    pub status: MovementStatus,
    /// Home city.
    pub origin: CityId,
    /// Destination of the outbound leg.
    pub target: TargetRef,
    /// Travelling units and ships.
    pub army: Army,
    /// Carried resources (trade goods or plunder).
    pub resources: Resources,
    /// Start of the current leg.
    pub departure_time: Timestamp,
    /// End of the current leg.
    pub arrival_time: Timestamp,
}

impl Movement {
    /// Whether the current leg has ended by `now`.
    #[must_use]
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.arrival_time <= now
    }

    /// Whether the target is a village.
    #[must_use]
    pub const fn is_village_target(&self) -> bool {
        self.target.is_village_target()
    }

    /// Duration of the current leg.
    #[must_use]
    pub const fn travel_ms(&self) -> u64 {
        self.arrival_time.millis_since(self.departure_time)
    }
}

/// A player's request to send a movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOrder {
    /// Mission.
    pub kind: MovementKind,
    /// City the movement leaves from.
    pub origin: CityId,
    /// Destination.
    pub target: TargetRef,
    /// Units and ships to send.
    pub army: Army,
    /// Resources to carry.
    pub resources: Resources,
}

/// Travel time between two positions at the pace of the slowest unit.
///
/// Movements without units travel at the caravan speed. The result is never
/// shorter than the configured minimum trip.
///
/// # Errors
///
/// [`GameError::InvalidCommand`] if the army names an unknown unit.
pub fn travel_time_ms(
    data: &GameData,
    army: &Army,
    from: MapPosition,
    to: MapPosition,
) -> Result<u64> {
    let mut slowest: Option<u32> = None;
    for (id, &count) in army.units.iter().chain(&army.ships) {
        if count == 0 {
            continue;
        }
        let unit = data
            .unit(id)
            .ok_or_else(|| GameError::InvalidCommand(format!("unknown unit '{id}'")))?;
        slowest = Some(slowest.map_or(unit.speed, |s| s.min(unit.speed)));
    }
    let speed = u128::from(slowest.unwrap_or(data.movement.trade_speed).max(1));

    let distance_bits = u128::try_from(from.distance(to).to_bits()).unwrap_or(0);
    let ms = (distance_bits * u128::from(MILLIS_PER_HOUR) / speed) >> 32;
    let floor = u64::from(data.movement.min_travel_secs) * MILLIS_PER_SECOND;
    Ok(u64::try_from(ms).unwrap_or(u64::MAX).max(floor))
}

fn invalid(msg: impl Into<String>) -> GameError {
    GameError::InvalidCommand(msg.into())
}

fn validate_order(data: &GameData, order: &DispatchOrder) -> Result<()> {
    if order.target == TargetRef::City(order.origin) {
        return Err(invalid("a city cannot send a movement to itself"));
    }

    for (id, _) in order.army.units.iter().filter(|(_, &n)| n > 0) {
        let unit = data
            .unit(id)
            .ok_or_else(|| invalid(format!("unknown unit '{id}'")))?;
        if unit.naval {
            return Err(invalid(format!("'{id}' is a ship, not a land unit")));
        }
    }
    for (id, _) in order.army.ships.iter().filter(|(_, &n)| n > 0) {
        let unit = data
            .unit(id)
            .ok_or_else(|| invalid(format!("unknown unit '{id}'")))?;
        if !unit.naval {
            return Err(invalid(format!("'{id}' is a land unit, not a ship")));
        }
    }

    let has_army = !order.army.is_empty();
    let has_cargo = !order.resources.is_empty();
    match order.kind {
        MovementKind::Attack => {
            let attack: u64 = order
                .army
                .units
                .iter()
                .chain(&order.army.ships)
                .map(|(id, &n)| u64::from(n) * u64::from(data.unit(id).map_or(0, |u| u.attack)))
                .sum();
            if attack == 0 {
                return Err(invalid("an attack needs units with attack power"));
            }
            if has_cargo {
                return Err(invalid("an attack cannot carry resources"));
            }
        }
        MovementKind::Reinforce => {
            if !has_army || has_cargo {
                return Err(invalid("a reinforcement carries units and no resources"));
            }
        }
        MovementKind::Trade => {
            if has_army || !has_cargo {
                return Err(invalid("a trade carries resources and no units"));
            }
        }
        MovementKind::Scout => {
            if !has_army || has_cargo {
                return Err(invalid("scouts travel without resources"));
            }
        }
    }

    if order.target.is_village_target()
        && matches!(order.kind, MovementKind::Reinforce | MovementKind::Trade)
    {
        return Err(invalid(format!("cannot send a {} to a village", order.kind)));
    }
    Ok(())
}

/// Validate an order against its origin city and create the movement.
///
/// The units, ships and resources leave the origin immediately. On failure
/// the city is left untouched.
///
/// # Errors
///
/// [`GameError::InvalidCommand`] for a malformed order or missing units,
/// [`GameError::InsufficientResources`] for missing cargo.
pub fn dispatch(
    origin: &mut CityState,
    data: &GameData,
    order: &DispatchOrder,
    target_position: MapPosition,
    id: MovementId,
    now: Timestamp,
) -> Result<Movement> {
    validate_order(data, order)?;
    let travel = travel_time_ms(data, &order.army, origin.position, target_position)?;

    origin.resources.ensure_covers(&order.resources)?;
    let mut sent = order.army.units.clone();
    merge_units(&mut sent, &order.army.ships);
    take_units(&mut origin.units, &sent)?;
    origin.resources.spend(&order.resources)?;

    let mut army = order.army.clone();
    crate::city::prune_units(&mut army.units);
    crate::city::prune_units(&mut army.ships);

    Ok(Movement {
        id,
        owner: origin.owner,
        kind: order.kind,
        status: MovementStatus::InTransit,
        origin: origin.id,
        target: order.target,
        army,
        resources: order.resources,
        departure_time: now,
        arrival_time: now.plus_millis(travel),
    })
}

/// Supplies external combat modifiers such as morale and hero bonuses.
pub trait ModifierSource: Send + Sync {
    /// Modifiers for an attack landing on `defender` (`None` for villages).
    ///
    /// The hospital capacity field is overwritten by the scheduler.
    fn modifiers(&self, attack: &Movement, defender: Option<&CityState>) -> CombatModifiers;
}

/// Neutral modifiers for every battle.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoModifiers;

impl ModifierSource for NoModifiers {
    fn modifiers(&self, _attack: &Movement, _defender: Option<&CityState>) -> CombatModifiers {
        CombatModifiers::default()
    }
}

/// How an arrival was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrivalOutcome {
    /// An attack was fought.
    Battle {
        /// Whether the attacker won.
        attacker_won: bool,
        /// Return trip of the survivors.
        returning: Option<MovementId>,
    },
    /// The target was gone.
    TargetVanished {
        /// Return trip of the cargo; `None` for lost attacks.
        returning: Option<MovementId>,
    },
    /// Units joined the target's garrison.
    Reinforced,
    /// Resources were delivered.
    Delivered,
    /// The target was scouted.
    Scouted {
        /// Return trip of the scouts.
        returning: Option<MovementId>,
    },
    /// A returning movement reached home.
    ReturnedHome,
    /// A returning movement found no home.
    OriginVanished,
}

/// Notification emitted for every processed arrival.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementEvent {
    /// Movement that arrived (now deleted).
    pub movement: MovementId,
    /// Mission of the movement.
    pub kind: MovementKind,
    /// Home city.
    pub origin: CityId,
    /// Destination of the outbound leg.
    pub target: TargetRef,
    /// Outcome.
    pub outcome: ArrivalOutcome,
    /// Report written for the arrival.
    pub report: ReportId,
}

impl MovementEvent {
    /// Cities whose state may have changed.
    #[must_use]
    pub fn affected_cities(&self) -> Vec<CityId> {
        let mut cities = vec![self.origin];
        if let Some(target) = self.target.city() {
            if target != self.origin {
                cities.push(target);
            }
        }
        cities
    }
}

enum Defender {
    City(CityState),
    Village(VillageState),
}

fn load_target(tx: &mut Transaction<'_>, target: TargetRef) -> Result<Option<Defender>> {
    Ok(match target {
        TargetRef::City(id) => tx.city(id)?.map(Defender::City),
        TargetRef::Village(id) => tx.village(id)?.map(Defender::Village),
    })
}

fn write_report(
    tx: &mut Transaction<'_>,
    movement: &Movement,
    mut recipients: Vec<PlayerId>,
    body: ReportBody,
) -> ReportId {
    recipients.sort_unstable();
    recipients.dedup();
    let id = ReportId(tx.allocate_id());
    tx.insert_report(Report {
        id,
        created_at: movement.arrival_time,
        recipients,
        movement: movement.id,
        origin: movement.origin,
        target: movement.target,
        body,
    });
    id
}

/// Replace `movement` with a return trip mirroring the outbound travel time.
fn send_home(
    tx: &mut Transaction<'_>,
    movement: &Movement,
    army: Army,
    resources: Resources,
) -> MovementId {
    let id = MovementId(tx.allocate_id());
    tx.insert_new(Document::Movement(Movement {
        id,
        status: MovementStatus::Returning,
        army,
        resources,
        departure_time: movement.arrival_time,
        arrival_time: movement.arrival_time.plus_millis(movement.travel_ms()),
        ..movement.clone()
    }));
    id
}

fn event(movement: &Movement, outcome: ArrivalOutcome, report: ReportId) -> MovementEvent {
    MovementEvent {
        movement: movement.id,
        kind: movement.kind,
        origin: movement.origin,
        target: movement.target,
        outcome,
        report,
    }
}

/// Dispatches movements and processes their arrivals.
#[derive(Clone)]
pub struct MovementScheduler {
    data: Arc<GameData>,
    store: StateStore,
    modifiers: Arc<dyn ModifierSource>,
}

impl fmt::Debug for MovementScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MovementScheduler")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl MovementScheduler {
    /// Create a scheduler with neutral combat modifiers.
    #[must_use]
    pub fn new(data: Arc<GameData>, store: StateStore) -> Self {
        Self {
            data,
            store,
            modifiers: Arc::new(NoModifiers),
        }
    }

    /// Use another source of combat modifiers.
    #[must_use]
    pub fn with_modifiers(mut self, source: Arc<dyn ModifierSource>) -> Self {
        self.modifiers = source;
        self
    }

    /// Send a movement from a city.
    ///
    /// # Errors
    ///
    /// Validation errors from [`dispatch`], [`GameError::CityNotFound`] for a
    /// missing origin, [`GameError::TargetNotFound`] for a missing target, or
    /// [`GameError::TransientFailure`].
    pub fn dispatch(&self, order: &DispatchOrder, now: Timestamp) -> Result<Movement> {
        let movement = self.store.transact("dispatch", |tx| {
            let mut origin = tx.require_city(order.origin)?;
            let position = match order.target {
                TargetRef::City(id) => tx.city(id)?.map(|c| c.position),
                TargetRef::Village(id) => tx.village(id)?.map(|v| v.position),
            }
            .ok_or_else(|| GameError::TargetNotFound(order.target.to_string()))?;

            let id = MovementId(tx.allocate_id());
            let movement = dispatch(&mut origin, &self.data, order, position, id, now)?;
            tx.put_city(origin);
            tx.insert_new(Document::Movement(movement.clone()));
            Ok(movement)
        })?;

        tracing::debug!(
            movement = %movement.id,
            kind = %movement.kind,
            origin = %movement.origin,
            target = %movement.target,
            arrival = movement.arrival_time.as_millis(),
            "Movement dispatched"
        );
        Ok(movement)
    }

    /// Process every movement whose current leg has ended.
    ///
    /// Each movement is handled in its own transaction. A failure is recorded
    /// in the summary and the movement is picked up again next tick.
    pub fn tick(&self, now: Timestamp) -> TickSummary<MovementEvent> {
        let mut summary = TickSummary::default();

        let keys = match self.store.keys(DocKind::Movement) {
            Ok(keys) => keys,
            Err(err) => {
                tracing::warn!(error = %err, "Movement tick could not list movements");
                return summary;
            }
        };

        for key in keys {
            let DocKey::Movement(id) = key else {
                continue;
            };
            match self
                .store
                .transact("movement arrival", |tx| self.process(tx, id, now))
            {
                Ok(Some(event)) => summary.events.push(event),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(movement = %id, error = %err, "Arrival processing failed");
                    summary.failures.push(TickFailure::new(key, &err));
                }
            }
        }

        summary
    }

    fn process(
        &self,
        tx: &mut Transaction<'_>,
        id: MovementId,
        now: Timestamp,
    ) -> Result<Option<MovementEvent>> {
        // Re-read inside the transaction: another tick may have landed it
        let Some(movement) = tx.movement(id)? else {
            return Ok(None);
        };
        if !movement.is_due(now) {
            return Ok(None);
        }
        tx.delete(DocKey::Movement(id));

        let event = match (movement.status, movement.kind) {
            (MovementStatus::Returning, _) => Self::arrive_home(tx, &movement)?,
            (MovementStatus::InTransit, MovementKind::Attack) => self.arrive_attack(tx, &movement)?,
            (MovementStatus::InTransit, MovementKind::Reinforce) => {
                Self::arrive_reinforcement(tx, &movement)?
            }
            (MovementStatus::InTransit, MovementKind::Trade) => Self::arrive_trade(tx, &movement)?,
            (MovementStatus::InTransit, MovementKind::Scout) => Self::arrive_scout(tx, &movement)?,
        };

        tracing::debug!(movement = %id, outcome = ?event.outcome, "Movement arrived");
        Ok(Some(event))
    }

    fn arrive_home(tx: &mut Transaction<'_>, movement: &Movement) -> Result<MovementEvent> {
        let Some(mut city) = tx.city(movement.origin)? else {
            let report = write_report(
                tx,
                movement,
                vec![movement.owner],
                ReportBody::ReturnLost {
                    army: movement.army.clone(),
                    resources: movement.resources,
                },
            );
            return Ok(event(movement, ArrivalOutcome::OriginVanished, report));
        };

        movement.army.merge_into(&mut city.units);
        city.resources.deposit(&movement.resources);
        let owner = city.owner;
        tx.put_city(city);

        let report = write_report(
            tx,
            movement,
            vec![owner],
            ReportBody::Returned {
                army: movement.army.clone(),
                resources: movement.resources,
            },
        );
        Ok(event(movement, ArrivalOutcome::ReturnedHome, report))
    }

    /// The target is gone: cargo turns around, attacks are lost.
    fn target_vanished(tx: &mut Transaction<'_>, movement: &Movement) -> MovementEvent {
        let nothing_to_return = movement.army.is_empty() && movement.resources.is_empty();
        let returning = if movement.kind == MovementKind::Attack || nothing_to_return {
            None
        } else {
            Some(send_home(
                tx,
                movement,
                movement.army.clone(),
                movement.resources,
            ))
        };

        let report = write_report(
            tx,
            movement,
            vec![movement.owner],
            ReportBody::TargetVanished {
                kind: movement.kind,
                army: movement.army.clone(),
                resources: movement.resources,
                returning,
            },
        );
        event(movement, ArrivalOutcome::TargetVanished { returning }, report)
    }

    fn arrive_attack(&self, tx: &mut Transaction<'_>, movement: &Movement) -> Result<MovementEvent> {
        let Some(defender) = load_target(tx, movement.target)? else {
            tracing::info!(
                movement = %movement.id,
                target = %movement.target,
                "Attack target vanished, attackers lost"
            );
            let mut lost = UnitCounts::new();
            movement.army.merge_into(&mut lost);
            self.release_origin_population(tx, movement, &lost)?;
            return Ok(Self::target_vanished(tx, movement));
        };

        let (force, modifiers, defender_owner) = match &defender {
            Defender::City(city) => {
                let mut modifiers = self.modifiers.modifiers(movement, Some(city));
                modifiers.hospital_free_capacity = hospital_free_capacity(&self.data, city);
                (
                    DefenderForce::from_city(&self.data, city),
                    modifiers,
                    Some(city.owner),
                )
            }
            Defender::Village(village) => {
                let mut modifiers = self.modifiers.modifiers(movement, None);
                modifiers.hospital_free_capacity = 0;
                (DefenderForce::from_village(village), modifiers, None)
            }
        };

        let result = resolve(&self.data, &movement.army, &force, &modifiers);

        let removed = result.defender_removed();
        match defender {
            Defender::City(mut city) => {
                remove_units_clamped(&mut city.units, &removed);
                city.release_population(&self.data, &removed);
                merge_units(&mut city.wounded, &result.wounded);
                city.resources.withdraw_clamped(&result.plunder);
                tx.put_city(city);
            }
            Defender::Village(mut village) => {
                remove_units_clamped(&mut village.units, &removed);
                village.resources.withdraw_clamped(&result.plunder);
                tx.put_village(village);
            }
        }

        self.release_origin_population(tx, movement, &result.attacker_losses)?;

        let returning = if result.surviving_attackers.is_empty() {
            None
        } else {
            Some(send_home(
                tx,
                movement,
                result.surviving_attackers.clone(),
                result.plunder,
            ))
        };

        tracing::info!(
            movement = %movement.id,
            origin = %movement.origin,
            target = %movement.target,
            attacker_won = result.attacker_won,
            attack_power = result.land.attack_power + result.naval.attack_power,
            defense_power = result.land.defense_power + result.naval.defense_power,
            plunder = result.plunder.total(),
            "Battle resolved"
        );

        let attacker_won = result.attacker_won;
        let mut recipients = vec![movement.owner];
        recipients.extend(defender_owner);
        let report = write_report(
            tx,
            movement,
            recipients,
            ReportBody::Battle {
                attacker: movement.army.clone(),
                result,
                returning,
            },
        );
        Ok(event(
            movement,
            ArrivalOutcome::Battle {
                attacker_won,
                returning,
            },
            report,
        ))
    }

    /// Units of the origin city that died abroad give back their population.
    fn release_origin_population(
        &self,
        tx: &mut Transaction<'_>,
        movement: &Movement,
        lost: &UnitCounts,
    ) -> Result<()> {
        if lost.is_empty() {
            return Ok(());
        }
        if let Some(mut origin) = tx.city(movement.origin)? {
            origin.release_population(&self.data, lost);
            tx.put_city(origin);
        }
        Ok(())
    }

    fn arrive_reinforcement(
        tx: &mut Transaction<'_>,
        movement: &Movement,
    ) -> Result<MovementEvent> {
        let target = match movement.target {
            TargetRef::City(id) => tx.city(id)?,
            TargetRef::Village(_) => None,
        };
        let Some(mut city) = target else {
            return Ok(Self::target_vanished(tx, movement));
        };

        movement.army.merge_into(&mut city.units);
        let owner = city.owner;
        tx.put_city(city);

        let report = write_report(
            tx,
            movement,
            vec![movement.owner, owner],
            ReportBody::Reinforcement {
                army: movement.army.clone(),
            },
        );
        Ok(event(movement, ArrivalOutcome::Reinforced, report))
    }

    fn arrive_trade(tx: &mut Transaction<'_>, movement: &Movement) -> Result<MovementEvent> {
        let target = match movement.target {
            TargetRef::City(id) => tx.city(id)?,
            TargetRef::Village(_) => None,
        };
        let Some(mut city) = target else {
            return Ok(Self::target_vanished(tx, movement));
        };

        city.resources.deposit(&movement.resources);
        let owner = city.owner;
        tx.put_city(city);

        let report = write_report(
            tx,
            movement,
            vec![movement.owner, owner],
            ReportBody::Trade {
                resources: movement.resources,
            },
        );
        Ok(event(movement, ArrivalOutcome::Delivered, report))
    }

    fn arrive_scout(tx: &mut Transaction<'_>, movement: &Movement) -> Result<MovementEvent> {
        let Some(target) = load_target(tx, movement.target)? else {
            return Ok(Self::target_vanished(tx, movement));
        };

        let snapshot = match target {
            Defender::City(city) => ScoutSnapshot {
                units: city.units,
                resources: city.resources,
                buildings: city
                    .buildings
                    .into_iter()
                    .map(|(id, b)| (id, b.level))
                    .collect(),
            },
            Defender::Village(village) => ScoutSnapshot {
                units: village.units,
                resources: village.resources,
                buildings: std::collections::BTreeMap::new(),
            },
        };

        let returning = Some(send_home(
            tx,
            movement,
            movement.army.clone(),
            Resources::ZERO,
        ));
        let report = write_report(
            tx,
            movement,
            vec![movement.owner],
            ReportBody::Scouting { snapshot },
        );
        Ok(event(movement, ArrivalOutcome::Scouted { returning }, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::city::UnitCounts;
    use crate::ids::{BuildingId, UnitId};

    const DATA: &str = r#"
GameData(
    units: [
        (id: "swordsman", name: "Swordsman", cost: (wood: 95), build_time_secs: 60,
         attack: 10, defense: 8, speed: 8, carry: 16, produced_at: "barracks"),
        (id: "scout", name: "Scout", cost: (wood: 20), build_time_secs: 30,
         speed: 20, produced_at: "barracks"),
        (id: "trireme", name: "Trireme", cost: (wood: 2000), build_time_secs: 900,
         attack: 250, defense: 250, speed: 15, naval: true, produced_at: "barracks"),
    ],
    buildings: [
        (id: "barracks", name: "Barracks", base_cost: (wood: 0), base_build_time_secs: 1,
         max_level: 30),
    ],
    movement: (trade_speed: 10, min_travel_secs: 60),
)
"#;

    const NOW: Timestamp = Timestamp::from_secs(10_000);

    fn data() -> Arc<GameData> {
        Arc::new(GameData::from_ron_str(DATA).unwrap())
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

    fn city(id: u64, owner: u64, x: i32) -> CityState {
        let mut city = CityState::new(CityId(id), PlayerId(owner), MapPosition::new(x, 0));
        city.set_building_level(BuildingId::new("barracks"), 1);
        city
    }

    fn setup() -> (StateStore, MovementScheduler) {
        let store = StateStore::memory();
        let mut home = city(1, 1, 0);
        home.units = counts(&[("swordsman", 100), ("scout", 5)]);
        home.resources = Resources::new(1_000, 1_000, 1_000);
        store.create_city(home).unwrap();
        store.create_city(city(2, 2, 10)).unwrap();
        let scheduler = MovementScheduler::new(data(), store.clone());
        (store, scheduler)
    }

    fn order(kind: MovementKind, army: Army, resources: Resources) -> DispatchOrder {
        DispatchOrder {
            kind,
            origin: CityId(1),
            target: TargetRef::City(CityId(2)),
            army,
            resources,
        }
    }

    #[test]
    fn test_travel_time_uses_slowest_unit() {
        let data = data();
        let from = MapPosition::new(0, 0);
        let to = MapPosition::new(16, 0);
        // 16 fields at speed 8 = 2 hours
        let army = land(&[("swordsman", 1), ("scout", 1)]);
        assert_eq!(
            travel_time_ms(&data, &army, from, to).unwrap(),
            2 * MILLIS_PER_HOUR
        );
        // Caravans use the trade speed
        assert_eq!(
            travel_time_ms(&data, &Army::default(), from, to).unwrap(),
            MILLIS_PER_HOUR * 16 / 10
        );
        // Never shorter than the minimum trip
        assert_eq!(
            travel_time_ms(&data, &army, from, from).unwrap(),
            60 * MILLIS_PER_SECOND
        );
    }

    #[test]
    fn test_dispatch_deducts_units_and_cargo() {
        let (store, scheduler) = setup();
        let movement = scheduler
            .dispatch(
                &order(MovementKind::Attack, land(&[("swordsman", 40)]), Resources::ZERO),
                NOW,
            )
            .unwrap();

        assert_eq!(movement.status, MovementStatus::InTransit);
        assert_eq!(movement.owner, PlayerId(1));
        assert_eq!(movement.travel_ms(), MILLIS_PER_HOUR * 10 / 8);
        assert!(!movement.is_village_target());

        let home = store.city(CityId(1)).unwrap().unwrap();
        assert_eq!(home.units, counts(&[("swordsman", 60), ("scout", 5)]));
        assert_eq!(store.movement(movement.id).unwrap(), Some(movement));
    }

    #[test]
    fn test_dispatch_validation() {
        let (store, scheduler) = setup();
        let before = store.city(CityId(1)).unwrap();

        let cases = [
            order(MovementKind::Attack, land(&[("scout", 5)]), Resources::ZERO),
            order(MovementKind::Attack, Army::default(), Resources::ZERO),
            order(MovementKind::Trade, land(&[("scout", 1)]), Resources::new(1, 0, 0)),
            order(MovementKind::Trade, Army::default(), Resources::ZERO),
            order(MovementKind::Reinforce, Army::default(), Resources::ZERO),
            order(MovementKind::Attack, land(&[("swordsman", 101)]), Resources::ZERO),
            order(MovementKind::Attack, land(&[("trireme", 1)]), Resources::ZERO),
            DispatchOrder {
                target: TargetRef::City(CityId(1)),
                ..order(MovementKind::Scout, land(&[("scout", 1)]), Resources::ZERO)
            },
        ];
        for case in &cases {
            let err = scheduler.dispatch(case, NOW).unwrap_err();
            assert!(matches!(err, GameError::InvalidCommand(_)), "{case:?}: {err}");
        }

        let err = scheduler
            .dispatch(
                &order(MovementKind::Trade, Army::default(), Resources::new(5_000, 0, 0)),
                NOW,
            )
            .unwrap_err();
        assert!(matches!(err, GameError::InsufficientResources { .. }));

        let err = scheduler
            .dispatch(
                &DispatchOrder {
                    target: TargetRef::Village(VillageId(77)),
                    ..order(MovementKind::Attack, land(&[("swordsman", 1)]), Resources::ZERO)
                },
                NOW,
            )
            .unwrap_err();
        assert!(matches!(err, GameError::TargetNotFound(_)));

        assert_eq!(store.city(CityId(1)).unwrap(), before);
        assert!(store.keys(DocKind::Movement).unwrap().is_empty());
    }

    #[test]
    fn test_tick_ignores_movements_in_flight() {
        let (_, scheduler) = setup();
        let movement = scheduler
            .dispatch(
                &order(MovementKind::Attack, land(&[("swordsman", 10)]), Resources::ZERO),
                NOW,
            )
            .unwrap();
        assert!(scheduler.tick(movement.arrival_time.minus_millis(1)).is_idle());
    }

    #[test]
    fn test_attack_returns_survivors_with_plunder() {
        let (store, scheduler) = setup();
        let movement = scheduler
            .dispatch(
                &order(MovementKind::Attack, land(&[("swordsman", 10)]), Resources::ZERO),
                NOW,
            )
            .unwrap();

        let mut target = store.city(CityId(2)).unwrap().unwrap();
        target.resources = Resources::new(50, 50, 50);
        store
            .transact("seed", |tx| {
                tx.put_city(target.clone());
                Ok(())
            })
            .unwrap();

        let summary = scheduler.tick(movement.arrival_time);
        assert_eq!(summary.events.len(), 1);
        let ArrivalOutcome::Battle {
            attacker_won: true,
            returning: Some(return_id),
        } = summary.events[0].outcome
        else {
            panic!("unexpected outcome {:?}", summary.events[0].outcome);
        };
        assert_eq!(
            summary.events[0].affected_cities(),
            vec![CityId(1), CityId(2)]
        );

        assert!(store.movement(movement.id).unwrap().is_none());
        let trip = store.movement(return_id).unwrap().unwrap();
        assert_eq!(trip.status, MovementStatus::Returning);
        assert_eq!(trip.army, land(&[("swordsman", 10)]));
        assert_eq!(trip.resources, Resources::new(50, 50, 50));
        assert_eq!(
            trip.arrival_time,
            movement.arrival_time.plus_millis(movement.travel_ms())
        );
        assert_eq!(
            store.city(CityId(2)).unwrap().unwrap().resources,
            Resources::ZERO
        );

        let report = store.report(summary.events[0].report).unwrap().unwrap();
        assert_eq!(report.recipients, vec![PlayerId(1), PlayerId(2)]);

        // Second tick at the same time does nothing
        assert!(scheduler.tick(movement.arrival_time).is_idle());

        // The return trip lands home
        let summary = scheduler.tick(trip.arrival_time);
        assert_eq!(summary.events[0].outcome, ArrivalOutcome::ReturnedHome);
        let home = store.city(CityId(1)).unwrap().unwrap();
        assert_eq!(home.units.get(&UnitId::new("swordsman")), Some(&100));
        assert_eq!(home.resources, Resources::new(1_050, 1_050, 1_050));
    }

    #[test]
    fn test_trade_and_reinforcement_arrive() {
        let (store, scheduler) = setup();
        let trade = scheduler
            .dispatch(
                &order(MovementKind::Trade, Army::default(), Resources::new(100, 0, 0)),
                NOW,
            )
            .unwrap();
        let support = scheduler
            .dispatch(
                &order(MovementKind::Reinforce, land(&[("swordsman", 5)]), Resources::ZERO),
                NOW,
            )
            .unwrap();

        let later = trade.arrival_time.max(support.arrival_time);
        let summary = scheduler.tick(later);
        assert_eq!(summary.events.len(), 2);

        let target = store.city(CityId(2)).unwrap().unwrap();
        assert_eq!(target.resources, Resources::new(100, 0, 0));
        assert_eq!(target.units, counts(&[("swordsman", 5)]));
        assert!(store.keys(DocKind::Movement).unwrap().is_empty());
        assert_eq!(store.keys(DocKind::Report).unwrap().len(), 2);
    }

    #[test]
    fn test_scouts_report_and_come_back() {
        let (store, scheduler) = setup();
        let movement = scheduler
            .dispatch(
                &order(MovementKind::Scout, land(&[("scout", 2)]), Resources::ZERO),
                NOW,
            )
            .unwrap();
        let summary = scheduler.tick(movement.arrival_time);
        let ArrivalOutcome::Scouted {
            returning: Some(return_id),
        } = summary.events[0].outcome
        else {
            panic!("scouts should return");
        };

        let report = store.report(summary.events[0].report).unwrap().unwrap();
        let ReportBody::Scouting { snapshot } = report.body else {
            panic!("expected a scouting report");
        };
        assert_eq!(snapshot.buildings.get(&BuildingId::new("barracks")), Some(&1));
        assert_eq!(report.recipients, vec![PlayerId(1)]);
        assert!(store.movement(return_id).unwrap().is_some());
    }

    #[test]
    fn test_vanished_trade_target_sends_cargo_home() {
        let (store, scheduler) = setup();
        let trade = scheduler
            .dispatch(
                &order(MovementKind::Trade, Army::default(), Resources::new(0, 0, 300)),
                NOW,
            )
            .unwrap();
        store.delete(DocKey::City(CityId(2))).unwrap();

        let summary = scheduler.tick(trade.arrival_time);
        let ArrivalOutcome::TargetVanished {
            returning: Some(return_id),
        } = summary.events[0].outcome
        else {
            panic!("cargo should return");
        };
        let trip = store.movement(return_id).unwrap().unwrap();
        scheduler.tick(trip.arrival_time);
        assert_eq!(
            store.city(CityId(1)).unwrap().unwrap().resources,
            Resources::new(1_000, 1_000, 1_000)
        );
    }

    #[test]
    fn test_return_to_vanished_origin_is_lost() {
        let (store, scheduler) = setup();
        let movement = scheduler
            .dispatch(
                &order(MovementKind::Reinforce, land(&[("swordsman", 5)]), Resources::ZERO),
                NOW,
            )
            .unwrap();
        store.delete(DocKey::City(CityId(2))).unwrap();
        let summary = scheduler.tick(movement.arrival_time);
        let ArrivalOutcome::TargetVanished {
            returning: Some(return_id),
        } = summary.events[0].outcome
        else {
            panic!("reinforcements should turn around");
        };

        store.delete(DocKey::City(CityId(1))).unwrap();
        let trip = store.movement(return_id).unwrap().unwrap();
        let summary = scheduler.tick(trip.arrival_time);
        assert_eq!(summary.events[0].outcome, ArrivalOutcome::OriginVanished);
        assert!(store.keys(DocKind::Movement).unwrap().is_empty());
    }

    struct Frenzy;

    impl ModifierSource for Frenzy {
        fn modifiers(&self, _: &Movement, _: Option<&CityState>) -> CombatModifiers {
            CombatModifiers {
                attack_bonus_percent: 100,
                ..CombatModifiers::default()
            }
        }
    }

    #[test]
    fn test_modifier_source_feeds_combat() {
        let (store, scheduler) = setup();
        let scheduler = scheduler.with_modifiers(Arc::new(Frenzy));
        let mut target = store.city(CityId(2)).unwrap().unwrap();
        target.units = counts(&[("swordsman", 15)]);
        store
            .transact("seed", |tx| {
                tx.put_city(target.clone());
                Ok(())
            })
            .unwrap();

        // 10 x 10 x 200% = 200 attack beats 15 x 8 = 120 defense
        let movement = scheduler
            .dispatch(
                &order(MovementKind::Attack, land(&[("swordsman", 10)]), Resources::ZERO),
                NOW,
            )
            .unwrap();
        let summary = scheduler.tick(movement.arrival_time);
        assert!(matches!(
            summary.events[0].outcome,
            ArrivalOutcome::Battle {
                attacker_won: true,
                ..
            }
        ));
        let report = store.report(summary.events[0].report).unwrap().unwrap();
        let ReportBody::Battle { result, .. } = report.body else {
            panic!("expected a battle report");
        };
        assert_eq!(result.land.attack_power, 200);
    }
}
