//! hostwatch-state — host reachability state for hostwatch.
//!
//! Holds the last-known status of every monitored host and detects
//! up/down transitions.
//!
//! # Architecture
//!
//! ```text
//! HostStore (Arc<Mutex<BTreeMap<host, HostStatus>>>)
//!   ├── record_sample()  → immediate status-changed events
//!   ├── for_each_host()  → reconciliation sweep (SweepEntry view)
//!   └── Arc<dyn EventSink>
//!         └── ChannelSink → EventLog::drain() (redb)
//! ```
//!
//! The `HostStore` is `Clone` + `Send` + `Sync` and can be shared across
//! async tasks. Exactly one lock exists; nothing nests inside it.

pub mod clock;
pub mod error;
pub mod event_log;
pub mod sink;
pub mod store;
pub mod tables;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{StateError, StateResult};
pub use event_log::{EventLog, LoggedEvent};
pub use sink::{ChannelSink, EventSink};
pub use store::{HostStore, SweepEntry};
pub use types::*;
