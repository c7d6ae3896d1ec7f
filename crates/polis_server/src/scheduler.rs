//! The periodic clock driving both ticks.
//!
//! One task owns two intervals. Queue and movement ticks therefore never
//! overlap; each tick runs on the blocking pool because store commits may
//! sleep between retries. Completed work is republished on a broadcast
//! channel for observers.

use std::sync::Arc;
use std::time::Duration;

use polis_core::clock::Clock;
use polis_core::events::TickSummary;
use polis_core::ids::CityId;
use polis_core::movement::{MovementEvent, MovementScheduler};
use polis_core::queue::{QueueEngine, QueueEvent};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;

use crate::config::ServerConfig;

/// Event published after every tick that completed work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SimEvent {
    /// A queue item completed.
    Queue(QueueEvent),
    /// A movement arrived.
    Movement(MovementEvent),
}

impl SimEvent {
    /// Cities whose state may have changed.
    #[must_use]
    pub fn affected_cities(&self) -> Vec<CityId> {
        match self {
            Self::Queue(event) => vec![event.city()],
            Self::Movement(event) => event.affected_cities(),
        }
    }
}

/// Outcome of one tick as seen by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Events published.
    pub events: usize,
    /// Aggregates left for the next tick.
    pub failures: usize,
}

/// Drives [`QueueEngine::tick`] and [`MovementScheduler::tick`].
#[derive(Clone)]
pub struct Scheduler {
    queues: QueueEngine,
    movements: MovementScheduler,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<SimEvent>,
    queue_interval: Duration,
    movement_interval: Duration,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("queue_interval", &self.queue_interval)
            .field("movement_interval", &self.movement_interval)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a scheduler with the intervals from `config`.
    #[must_use]
    pub fn new(
        queues: QueueEngine,
        movements: MovementScheduler,
        clock: Arc<dyn Clock>,
        config: &ServerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            queues,
            movements,
            clock,
            events,
            queue_interval: Duration::from_millis(config.queue_tick_ms.max(1)),
            movement_interval: Duration::from_millis(config.movement_tick_ms.max(1)),
        }
    }

    /// Receive every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SimEvent> {
        self.events.subscribe()
    }

    /// Run one queue tick at the clock's current time.
    pub async fn queue_tick(&self) -> TickStats {
        let engine = self.queues.clone();
        let now = self.clock.now();
        match tokio::task::spawn_blocking(move || engine.tick(now)).await {
            Ok(summary) => self.publish(summary, SimEvent::Queue),
            Err(err) => {
                tracing::error!(error = %err, "Queue tick aborted");
                TickStats::default()
            }
        }
    }

    /// Run one movement tick at the clock's current time.
    pub async fn movement_tick(&self) -> TickStats {
        let scheduler = self.movements.clone();
        let now = self.clock.now();
        match tokio::task::spawn_blocking(move || scheduler.tick(now)).await {
            Ok(summary) => self.publish(summary, SimEvent::Movement),
            Err(err) => {
                tracing::error!(error = %err, "Movement tick aborted");
                TickStats::default()
            }
        }
    }

    fn publish<E>(&self, summary: TickSummary<E>, wrap: fn(E) -> SimEvent) -> TickStats {
        let stats = TickStats {
            events: summary.events.len(),
            failures: summary.failures.len(),
        };
        for event in summary.events {
            // No subscribers is fine
            let _ = self.events.send(wrap(event));
        }
        if stats.events > 0 || stats.failures > 0 {
            tracing::debug!(
                events = stats.events,
                failures = stats.failures,
                "Tick finished"
            );
        }
        stats
    }

    /// Tick until `shutdown` turns true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut queue_timer = tokio::time::interval(self.queue_interval);
        queue_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut movement_timer = tokio::time::interval(self.movement_interval);
        movement_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            queue_interval_ms = self.queue_interval.as_millis(),
            movement_interval_ms = self.movement_interval.as_millis(),
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = queue_timer.tick() => {
                    self.queue_tick().await;
                }
                _ = movement_timer.tick() => {
                    self.movement_tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Scheduler stopped");
    }
}
