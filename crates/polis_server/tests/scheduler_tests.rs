use std::sync::Arc;
use std::time::Duration;

use polis_core::clock::Clock;
use polis_core::economy::Resources;
use polis_core::ids::{CityId, UnitId};
use polis_core::movement::{ArrivalOutcome, DispatchOrder, MovementKind, TargetRef};
use polis_core::queue::{QueueEvent, QueueKind, QueueTarget};
use polis_server::observer::CityObserver;
use polis_server::scheduler::{Scheduler, SimEvent, TickStats};
use polis_server::ServerConfig;
use polis_test_utils::fixtures::{developed_city, land_army, units, CityBuilder, World};

fn scheduler_for(world: &World) -> Scheduler {
    let config = ServerConfig {
        queue_tick_ms: 1_000,
        movement_tick_ms: 5_000,
        ..ServerConfig::default()
    };
    let clock: Arc<dyn Clock> = world.clock.clone();
    Scheduler::new(world.queues.clone(), world.movements.clone(), clock, &config)
}

#[tokio::test]
async fn queue_tick_publishes_completions() {
    let world = World::standard();
    world.add_city(developed_city(1, 1, 0, 0));
    let item = world
        .queues
        .enqueue(
            CityId(1),
            QueueKind::LandTraining,
            QueueTarget::Unit(UnitId::new("swordsman")),
            5,
            world.now(),
        )
        .unwrap();

    let scheduler = scheduler_for(&world);
    let mut events = scheduler.subscribe();

    assert_eq!(scheduler.queue_tick().await, TickStats::default());

    world.clock.set(item.end_time);
    let stats = scheduler.queue_tick().await;
    assert_eq!(stats.events, 1);

    let event = events.recv().await.unwrap();
    assert!(matches!(
        event,
        SimEvent::Queue(QueueEvent::Completed { city: CityId(1), amount: 5, .. })
    ));
    assert_eq!(event.affected_cities(), vec![CityId(1)]);
}

#[tokio::test]
async fn movement_tick_publishes_arrivals() {
    let world = World::standard();
    let mut home = developed_city(1, 1, 0, 0);
    home.units = units(&[("swordsman", 30)]);
    world.add_city(home);
    world.add_city(CityBuilder::new(2, 2, 0, 5).build());

    let movement = world
        .movements
        .dispatch(
            &DispatchOrder {
                kind: MovementKind::Reinforce,
                origin: CityId(1),
                target: TargetRef::City(CityId(2)),
                army: land_army(&[("swordsman", 30)]),
                resources: Resources::ZERO,
            },
            world.now(),
        )
        .unwrap();

    let scheduler = scheduler_for(&world);
    let mut events = scheduler.subscribe();
    world.clock.set(movement.arrival_time);
    assert_eq!(scheduler.movement_tick().await.events, 1);

    let SimEvent::Movement(event) = events.recv().await.unwrap() else {
        panic!("expected a movement event");
    };
    assert_eq!(event.outcome, ArrivalOutcome::Reinforced);
    assert_eq!(event.affected_cities(), vec![CityId(1), CityId(2)]);
}

#[tokio::test(start_paused = true)]
async fn run_loop_ticks_until_shutdown() {
    let world = World::standard();
    world.add_city(developed_city(1, 1, 0, 0));
    let item = world
        .queues
        .enqueue(
            CityId(1),
            QueueKind::Construction,
            QueueTarget::Building("farm".into()),
            1,
            world.now(),
        )
        .unwrap();
    world.clock.set(item.end_time);

    let scheduler = scheduler_for(&world);
    let mut events = scheduler.subscribe();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let task = tokio::spawn(scheduler.run(shutdown_rx));

    let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("a tick should run")
        .unwrap();
    assert!(matches!(event, SimEvent::Queue(_)));
    assert_eq!(
        world.city(1).building_level(&"farm".into()),
        21
    );

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .expect("scheduler should stop")
        .unwrap();
}

#[tokio::test]
async fn observer_drops_stale_views() {
    let world = World::standard();
    world.add_city(developed_city(1, 1, 0, 0));
    let clock: Arc<dyn Clock> = world.clock.clone();
    let observer = Arc::new(CityObserver::new(world.store.clone(), clock, 24 * 3_600_000));

    let before = observer.view(CityId(1)).unwrap().unwrap();
    assert!(before.outgoing.is_empty());

    let item = world
        .queues
        .enqueue(
            CityId(1),
            QueueKind::LandTraining,
            QueueTarget::Unit(UnitId::new("militia")),
            3,
            world.now(),
        )
        .unwrap();

    // Still cached
    assert_eq!(observer.view(CityId(1)).unwrap().unwrap(), before);

    let scheduler = scheduler_for(&world);
    let events = scheduler.subscribe();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let follower = tokio::spawn(Arc::clone(&observer).follow(events, shutdown_rx));

    world.clock.set(item.end_time);
    scheduler.queue_tick().await;

    let mut fresh = None;
    for _ in 0..100 {
        let view = observer.view(CityId(1)).unwrap().unwrap();
        if view != before {
            fresh = Some(view);
            break;
        }
        tokio::task::yield_now().await;
    }
    let fresh = fresh.expect("observer should invalidate the city");
    assert_eq!(fresh.city.units.get(&UnitId::new("militia")), Some(&3));

    shutdown_tx.send(true).unwrap();
    follower.await.unwrap();
}

#[tokio::test]
async fn observer_lists_movements() {
    let world = World::standard();
    let mut home = developed_city(1, 1, 0, 0);
    home.units = units(&[("scout", 2)]);
    world.add_city(home);
    world.add_city(CityBuilder::new(2, 2, 9, 9).build());
    world
        .movements
        .dispatch(
            &DispatchOrder {
                kind: MovementKind::Scout,
                origin: CityId(1),
                target: TargetRef::City(CityId(2)),
                army: land_army(&[("scout", 2)]),
                resources: Resources::ZERO,
            },
            world.now(),
        )
        .unwrap();

    let clock: Arc<dyn Clock> = world.clock.clone();
    let observer = CityObserver::new(world.store.clone(), clock, 1_000);
    assert_eq!(observer.view(CityId(1)).unwrap().unwrap().outgoing.len(), 1);
    assert_eq!(observer.view(CityId(2)).unwrap().unwrap().incoming.len(), 1);
    assert!(observer.view(CityId(3)).unwrap().is_none());
}

#[tokio::test]
async fn observer_purges_expired_views_on_miss() {
    let world = World::standard();
    world.add_city(developed_city(1, 1, 0, 0));
    world.add_city(developed_city(2, 2, 3, 3));
    let clock: Arc<dyn Clock> = world.clock.clone();
    let observer = CityObserver::new(world.store.clone(), clock, 1_000);

    observer.view(CityId(1)).unwrap().unwrap();
    observer.view(CityId(2)).unwrap().unwrap();
    assert_eq!(observer.cached(), 2);

    world.clock.advance_millis(2_000);
    observer.view(CityId(1)).unwrap().unwrap();
    // City 2 expired and was dropped while city 1 was rebuilt
    assert_eq!(observer.cached(), 1);
}
