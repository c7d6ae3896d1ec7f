//! Pull-based city views for clients.
//!
//! A view is the city document plus every movement leaving from or heading
//! to it. Views are cached for a short time and dropped as soon as a tick
//! reports a change to the city.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use polis_core::cache::TtlCache;
use polis_core::city::CityState;
use polis_core::clock::Clock;
use polis_core::error::Result;
use polis_core::ids::CityId;
use polis_core::movement::Movement;
use polis_core::store::{DocKey, DocKind, StateStore};
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::scheduler::SimEvent;

/// Snapshot of one city as a client sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CityView {
    /// City document.
    pub city: CityState,
    /// Movements sent from this city, including return trips.
    pub outgoing: Vec<Movement>,
    /// Foreign movements heading to this city.
    pub incoming: Vec<Movement>,
}

/// Serves [`CityView`]s through a TTL cache.
pub struct CityObserver {
    store: StateStore,
    clock: Arc<dyn Clock>,
    cache: Mutex<TtlCache<CityId, CityView>>,
}

impl std::fmt::Debug for CityObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CityObserver")
            .field("cached", &self.cached())
            .finish_non_exhaustive()
    }
}

impl CityObserver {
    /// Create an observer whose views live for `ttl_ms`.
    #[must_use]
    pub fn new(store: StateStore, clock: Arc<dyn Clock>, ttl_ms: u64) -> Self {
        Self {
            store,
            clock,
            cache: Mutex::new(TtlCache::new(ttl_ms)),
        }
    }

    fn cache(&self) -> MutexGuard<'_, TtlCache<CityId, CityView>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current view of a city, `None` if it does not exist.
    pub fn view(&self, city: CityId) -> Result<Option<CityView>> {
        let now = self.clock.now();
        {
            let mut cache = self.cache();
            if let Some(view) = cache.get(&city, now) {
                return Ok(Some(view));
            }
            cache.purge_expired(now);
        }

        let Some(state) = self.store.city(city)? else {
            self.cache().invalidate(&city);
            return Ok(None);
        };

        let mut outgoing = Vec::new();
        let mut incoming = Vec::new();
        for key in self.store.keys(DocKind::Movement)? {
            let DocKey::Movement(id) = key else {
                continue;
            };
            let Some(movement) = self.store.movement(id)? else {
                continue;
            };
            if movement.origin == city {
                outgoing.push(movement);
            } else if movement.target.city() == Some(city) {
                incoming.push(movement);
            }
        }
        outgoing.sort_by_key(|m| (m.arrival_time, m.id));
        incoming.sort_by_key(|m| (m.arrival_time, m.id));

        let view = CityView {
            city: state,
            outgoing,
            incoming,
        };
        self.cache().insert(city, view.clone(), now);
        Ok(Some(view))
    }

    /// Number of cached views, expired ones included until the next miss.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache().len()
    }

    /// Drop the cached view of a city.
    pub fn invalidate(&self, city: CityId) {
        self.cache().invalidate(&city);
    }

    /// Drop cached views touched by an event.
    pub fn handle(&self, event: &SimEvent) {
        let mut cache = self.cache();
        for city in event.affected_cities() {
            cache.invalidate(&city);
        }
    }

    /// Apply events until `shutdown` turns true or the channel closes.
    pub async fn follow(
        self: Arc<Self>,
        mut events: broadcast::Receiver<SimEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => self.handle(&event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Observer lagged, dropping all cached views");
                        self.cache().invalidate_all();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        let purged = self.cache().purge_expired(self.clock.now());
        tracing::debug!(purged, "Observer stopped");
    }
}
