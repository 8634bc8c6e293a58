//! hostwatch-monitor — the long-lived loops around the host store.
//!
//! # Architecture
//!
//! ```text
//! WorkloadWatcher ──► DiscoverySource ──retry(ConnectivityCheck)──┐
//!                                                                 ▼
//! QueryService ──Prober::probe──────────────────────────► HostStore
//!                                                                 │
//! Reconciler (every 1s) ──for_each_host──────────────────────────┘
//!                                   └──► EventSink
//! ```
//!
//! Discovery and on-demand queries feed reachability samples in; the
//! reconciler sweeps the store and emits transition events. All three
//! share one `HostStore` and stop on a `watch` shutdown signal.

pub mod backoff;
pub mod discovery;
pub mod error;
pub mod query;
pub mod reconciler;
pub mod watcher;
pub mod workload;

pub use backoff::{RetryOutcome, RetryPolicy, retry};
pub use discovery::{
    ConnectivityCheck, DEFAULT_HOST_ENV_VAR, DEFAULT_LABEL_SELECTOR, DiscoveryConfig,
    DiscoverySource,
};
pub use error::{DiscoveryError, QueryError};
pub use query::{HostQuery, QueryService};
pub use reconciler::{DEFAULT_RECONCILE_INTERVAL, Reconciler};
pub use watcher::{ChannelWatcher, JsonLinesWatcher, WorkloadEventStream, WorkloadWatcher};
pub use workload::{Container, EnvVar, LabelSelector, SkipReason, Workload, WorkloadEvent, WorkloadPhase};
