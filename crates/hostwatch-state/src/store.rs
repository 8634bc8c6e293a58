//! HostStore — the concurrent table of monitored hosts.
//!
//! One mutex guards the whole map. Every read-modify-write sequence, and
//! every snapshot, runs under it, so a reconciliation sweep never observes
//! a half-applied sample. The raw map is never handed out: callers go
//! through `record_sample`, `snapshot`, `get`, `remove` and `for_each_host`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::error::{StateError, StateResult};
use crate::sink::EventSink;
use crate::types::*;

struct Inner {
    hosts: Mutex<BTreeMap<String, HostStatus>>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

/// Thread-safe store of host statuses. Cheap to clone.
#[derive(Clone)]
pub struct HostStore {
    inner: Arc<Inner>,
}

impl HostStore {
    /// Create an empty store that reports transitions to `sink`.
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self::with_clock(sink, Arc::new(SystemClock))
    }

    /// Create an empty store with a custom time source.
    pub fn with_clock(sink: Arc<dyn EventSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                hosts: Mutex::new(BTreeMap::new()),
                sink,
                clock,
            }),
        }
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> Timestamp {
        self.inner.clock.now_millis()
    }

    // Every mutation is all-or-nothing, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, HostStatus>> {
        self.inner
            .hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one reachability sample for `host`.
    ///
    /// An unseen host is registered silently. A known host whose state
    /// flips gets an immediate `status-changed-to-*` event.
    /// Surrounding whitespace is not part of the host name.
    pub fn record_sample(&self, host: &str, reachable: bool) -> StateResult<()> {
        let trimmed = host.trim();
        if trimmed.is_empty() {
            return Err(StateError::InvalidHost(host.to_string()));
        }
        let host = trimmed;

        let mut hosts = self.lock();
        let now = self.now();

        let Some(status) = hosts.get_mut(host) else {
            info!(%host, reachable, "added host to monitored hosts");
            hosts.insert(host.to_string(), HostStatus::registered(host, reachable, now));
            return Ok(());
        };

        if status.observe(reachable, now) {
            let event = TransitionEvent {
                hostname: host.to_string(),
                timestamp: now,
                reason: TransitionReason::status_changed(reachable),
                is_up: reachable,
            };
            info!(%host, reason = ?event.reason, "{event}");
            self.inner.sink.append(event);
        } else {
            debug!(%host, reachable, "sample recorded, no change");
        }
        Ok(())
    }

    /// Consistent copy of one host's status.
    pub fn get(&self, host: &str) -> Option<HostStatus> {
        self.lock().get(host.trim()).cloned()
    }

    /// Consistent copy of every host's status, ordered by host name.
    pub fn snapshot(&self) -> Vec<HostStatus> {
        self.lock().values().cloned().collect()
    }

    /// Hosts that a sweep has promoted onto the roster.
    pub fn roster(&self) -> Vec<String> {
        self.lock()
            .values()
            .filter(|s| s.on_roster)
            .map(|s| s.host.clone())
            .collect()
    }

    /// Number of registered hosts.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Explicitly stop monitoring a host. Returns true if it existed.
    pub fn remove(&self, host: &str) -> bool {
        let host = host.trim();
        let removed = self.lock().remove(host).is_some();
        if removed {
            info!(%host, "removed host from monitored hosts");
        }
        removed
    }

    /// Visit every host under a single lock acquisition.
    ///
    /// The visitor may update only the reconciliation bookkeeping through
    /// [`SweepEntry`]. Each reason it returns becomes an event stamped with
    /// the sweep start time; the events are sent to the sink and returned.
    pub fn for_each_host<F>(&self, mut visit: F) -> Vec<TransitionEvent>
    where
        F: FnMut(&mut SweepEntry<'_>) -> Option<TransitionReason>,
    {
        let mut hosts = self.lock();
        let now = self.now();
        let mut events = Vec::new();

        for status in hosts.values_mut() {
            let mut entry = SweepEntry { status };
            if let Some(reason) = visit(&mut entry) {
                events.push(TransitionEvent {
                    hostname: entry.status.host.clone(),
                    timestamp: now,
                    reason,
                    is_up: entry.status.is_up,
                });
            }
        }

        for event in &events {
            info!(host = %event.hostname, reason = ?event.reason, "{event}");
            self.inner.sink.append(event.clone());
        }
        events
    }
}

/// Restricted mutable view of one host during a sweep.
pub struct SweepEntry<'a> {
    status: &'a mut HostStatus,
}

impl SweepEntry<'_> {
    pub fn host(&self) -> &str {
        &self.status.host
    }

    pub fn is_up(&self) -> bool {
        self.status.is_up
    }

    /// The last acknowledged state, or `None` before the first seed.
    pub fn previous_is_up(&self) -> Option<bool> {
        self.status
            .previous_is_up_initialized
            .then_some(self.status.previous_is_up)
    }

    pub fn on_roster(&self) -> bool {
        self.status.on_roster
    }

    /// Acknowledge the current state: `previous_is_up = is_up`.
    pub fn acknowledge(&mut self) {
        self.status.previous_is_up = self.status.is_up;
        self.status.previous_is_up_initialized = true;
    }

    pub fn promote_to_roster(&mut self) {
        self.status.on_roster = true;
    }
}
