//! Reconciler — periodic sweep turning state changes into transition events.
//!
//! Each tick walks the whole `HostStore` under its lock. A host seen for
//! the first time is seeded (`host-initialized`), a host whose state moved
//! since the last acknowledged tick gets `status-changed-to-*`, and a
//! settled host not yet on the roster is promoted (`host-added-to-roster`).
//! Hosts are never removed here.

use std::time::Duration;

use hostwatch_state::{HostStore, SweepEntry, TransitionEvent, TransitionReason};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Default sweep interval.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(1);

pub struct Reconciler {
    store: HostStore,
    interval: Duration,
}

impl Reconciler {
    pub fn new(store: HostStore) -> Self {
        Self::with_interval(store, DEFAULT_RECONCILE_INTERVAL)
    }

    pub fn with_interval(store: HostStore, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Run one sweep and return the events it emitted.
    pub fn sweep(&self) -> Vec<TransitionEvent> {
        let events = self.store.for_each_host(reconcile_entry);
        debug!(hosts = self.store.len(), events = events.len(), "reconciliation sweep");
        events
    }

    /// Sweep every `interval` until `shutdown` fires. The first sweep runs
    /// one interval after start.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.interval, "reconciler started");
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                _ = shutdown.changed() => {
                    info!("reconciler shutting down");
                    return;
                }
            }
        }
    }
}

fn reconcile_entry(entry: &mut SweepEntry<'_>) -> Option<TransitionReason> {
    match entry.previous_is_up() {
        None => {
            entry.acknowledge();
            Some(TransitionReason::HostInitialized)
        }
        Some(previous) if previous != entry.is_up() => {
            entry.acknowledge();
            Some(TransitionReason::status_changed(entry.is_up()))
        }
        Some(_) if !entry.on_roster() => {
            entry.promote_to_roster();
            Some(TransitionReason::HostAddedToRoster)
        }
        Some(_) => None,
    }
}
