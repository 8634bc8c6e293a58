//! Error types for discovery and host queries.

use hostwatch_probe::TargetError;
use hostwatch_state::StateError;
use thiserror::Error;

/// Errors raised by the discovery source.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The workload event stream could not be opened. Fatal.
    #[error("failed to establish workload event stream: {0}")]
    StreamEstablishment(String),

    /// One event could not be read or decoded. The stream continues.
    #[error("invalid workload event: {0}")]
    Event(String),

    #[error("invalid label selector {0:?}")]
    InvalidSelector(String),
}

/// Hard failures of an on-demand query, as opposed to `reachable: false`.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid target: {0}")]
    InvalidTarget(#[from] TargetError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("host {0} was removed while it was being queried")]
    Removed(String),
}
