//! Background cache refresh
//!
//! [`Refresher`] runs fetch-or-fallback for a source on a detached tokio task
//! so the request that noticed staleness can answer immediately. Refreshes
//! are single-flight per source key: asking for a key that is already being
//! refreshed attaches to the running task instead of starting another fetch.
//!
//! [`RefreshHandle`] additionally warms every source at startup and then
//! re-checks them on a fixed interval.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::aggregate::SourcePlan;
use crate::cache::{FallbackPolicy, Provenance, Resolution};

/// Result of one background refresh
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// The cache entry was replaced with this many records
    Updated { records: usize },
    /// The fetch failed; the cache was left as it was
    Kept {
        provenance: Provenance,
        reason: Option<String>,
    },
    /// The refresh task itself died
    Aborted(String),
}

impl From<&Resolution> for RefreshOutcome {
    fn from(resolution: &Resolution) -> Self {
        match resolution.provenance {
            Provenance::Live | Provenance::Cache => RefreshOutcome::Updated {
                records: resolution.records.len(),
            },
            provenance => RefreshOutcome::Kept {
                provenance,
                reason: resolution.error.clone(),
            },
        }
    }
}

/// A refresh that any number of callers can await
pub type RefreshFuture = Shared<BoxFuture<'static, RefreshOutcome>>;

type InFlight = Arc<Mutex<HashMap<String, RefreshFuture>>>;

/// Removes a key from the in-flight map when its refresh task ends
///
/// Dropped on every exit path, including a panicking fetch and runtime
/// shutdown, so a dead task never blocks later refreshes of its key.
struct Registration {
    registry: InFlight,
    key: String,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Starts detached, de-duplicated refreshes
#[derive(Clone)]
pub struct Refresher {
    policy: Arc<FallbackPolicy>,
    in_flight: InFlight,
}

impl Refresher {
    pub fn new(policy: Arc<FallbackPolicy>) -> Self {
        Self {
            policy,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Refreshes `source_key` in the background
    ///
    /// The returned future resolves when the refresh finishes; dropping it does
    /// not cancel the refresh. Must be called from within a tokio runtime.
    pub fn refresh(&self, source_key: &str) -> RefreshFuture {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = in_flight.get(source_key) {
            tracing::debug!(source = source_key, "refresh already in flight, attaching");
            return running.clone();
        }

        let policy = Arc::clone(&self.policy);
        let registry = Arc::clone(&self.in_flight);
        let key = source_key.to_string();

        // The task cannot deregister itself before it is registered: removal
        // takes the lock this function still holds.
        let task = tokio::spawn(async move {
            let _registration = Registration {
                registry,
                key: key.clone(),
            };
            tracing::info!(source = %key, "background refresh started");
            let resolution = policy.fetch_or_fallback(&key, Utc::now()).await;
            let outcome = RefreshOutcome::from(&resolution);
            tracing::info!(source = %key, ?outcome, "background refresh finished");
            outcome
        });

        let shared = async move {
            task.await
                .unwrap_or_else(|err| RefreshOutcome::Aborted(err.to_string()))
        }
        .boxed()
        .shared();

        in_flight.insert(source_key.to_string(), shared.clone());
        shared
    }

    /// Starts a refresh for every planned source whose cache is not fresh at `now`
    ///
    /// Returns the keys a refresh was requested for.
    pub fn refresh_stale(&self, plan: &[SourcePlan], now: DateTime<Utc>) -> Vec<String> {
        let store = self.policy.store();
        plan.iter()
            .filter(|source| !store.is_valid(&source.key, now, source.ttl))
            .map(|source| {
                // Detached: the spawned task runs whether or not anyone awaits it
                drop(self.refresh(&source.key));
                source.key.clone()
            })
            .collect()
    }

    /// Number of keys currently being refreshed
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Configuration for periodic refresh
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// How often stale sources are re-checked
    pub interval_secs: u64,
    /// Whether the warm-up loop runs at all
    pub enabled: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300, // 5 minutes
            enabled: true,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Handle for the periodic warm-up loop
pub struct RefreshHandle {
    /// Flag to signal shutdown
    shutdown_tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Spawns the warm-up loop
    ///
    /// The first tick fires immediately, so every source starts fetching at
    /// startup; later ticks only refresh sources whose cache has gone stale.
    pub fn spawn(refresher: Refresher, plan: Vec<SourcePlan>, config: RefreshConfig) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        if config.enabled {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(config.interval());
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let started = refresher.refresh_stale(&plan, Utc::now());
                            if !started.is_empty() {
                                tracing::info!(sources = ?started, "periodic refresh");
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            break;
                        }
                    }
                }
                tracing::debug!("refresh loop stopped");
            });
        }

        Self { shutdown_tx }
    }

    /// Stops the warm-up loop; refreshes already running finish on their own
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}
