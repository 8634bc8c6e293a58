//! Domain types for the hostwatch state store.
//!
//! `HostStatus` is the last-known reachability of one monitored host.
//! `TransitionEvent` is the immutable record handed to an event sink when
//! a host is seeded, promoted onto the roster, or flips up/down.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

// ── HostStatus ─────────────────────────────────────────────────────

/// Last-known status of a monitored host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostStatus {
    /// Hostname, optionally with a port. Unique within the store.
    pub host: String,
    /// Current reachability.
    pub is_up: bool,
    /// Reachability as last acknowledged by a reconciliation sweep.
    pub previous_is_up: bool,
    /// Whether `previous_is_up` has been seeded by a sweep.
    pub previous_is_up_initialized: bool,
    /// Whether a sweep has promoted this host onto the roster.
    pub on_roster: bool,
    /// Time of the most recent `is_up` flip (or of registration). Grows
    /// strictly with every flip.
    pub last_change_at: Timestamp,
    /// Start of the current down period. `None` while the host is up.
    pub down_since_at: Option<Timestamp>,
    /// Time of the most recent accepted sample.
    pub last_observed_at: Timestamp,
}

impl HostStatus {
    /// A freshly registered host, not yet seen by any sweep.
    pub(crate) fn registered(host: &str, reachable: bool, now: Timestamp) -> Self {
        Self {
            host: host.to_string(),
            is_up: reachable,
            previous_is_up: false,
            previous_is_up_initialized: false,
            on_roster: false,
            last_change_at: now,
            down_since_at: (!reachable).then_some(now),
            last_observed_at: now,
        }
    }

    /// Apply a sample. Returns `true` if `is_up` flipped.
    pub(crate) fn observe(&mut self, reachable: bool, now: Timestamp) -> bool {
        self.last_observed_at = now;
        if self.is_up == reachable {
            return false;
        }

        self.is_up = reachable;
        // Strictly increasing, even for flips in the same millisecond.
        self.last_change_at = now.max(self.last_change_at.saturating_add(1));
        self.down_since_at = if reachable { None } else { Some(now) };
        true
    }
}

// ── TransitionEvent ────────────────────────────────────────────────

/// Why a transition event was emitted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionReason {
    /// A sweep seeded `previous_is_up` for a newly registered host.
    HostInitialized,
    /// The host flipped from down to up.
    StatusChangedToUp,
    /// The host flipped from up to down.
    StatusChangedToDown,
    /// A sweep promoted the host onto the roster.
    HostAddedToRoster,
}

impl TransitionReason {
    /// The status-change reason for a host that is now `is_up`.
    pub fn status_changed(is_up: bool) -> Self {
        if is_up {
            Self::StatusChangedToUp
        } else {
            Self::StatusChangedToDown
        }
    }

    /// Whether this reason records a real up/down flip.
    pub fn is_status_change(self) -> bool {
        matches!(self, Self::StatusChangedToUp | Self::StatusChangedToDown)
    }
}

/// Immutable record of a host state change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransitionEvent {
    pub hostname: String,
    pub timestamp: Timestamp,
    pub reason: TransitionReason,
    /// Reachability of the host at the time of the event.
    pub is_up: bool,
}

impl fmt::Display for TransitionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_up { "up" } else { "down" };
        match self.reason {
            TransitionReason::HostInitialized => {
                write!(f, "initialized host {} with status {state}", self.hostname)
            }
            TransitionReason::StatusChangedToUp | TransitionReason::StatusChangedToDown => {
                write!(f, "host {} status changed to {state}", self.hostname)
            }
            TransitionReason::HostAddedToRoster => write!(
                f,
                "added host {} to monitored hosts with status {state}",
                self.hostname
            ),
        }
    }
}
