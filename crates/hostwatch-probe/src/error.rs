//! Error types for probing.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// The network stage a probe failed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Dns,
    Tcp,
    Tls,
    Http,
}

/// A probe stage failure. Carried inside `ProbeResult`, never fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeError {
    #[error("DNS resolution failed for {host}: {reason}")]
    Dns { host: String, reason: String },

    #[error("TCP connection failed for {addr}: {reason}")]
    Tcp { addr: String, reason: String },

    #[error("TLS handshake failed for {host}: {reason}")]
    Tls { host: String, reason: String },

    #[error("HTTP request failed for '{url}': {reason}")]
    Http { url: String, reason: String },
}

impl ProbeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Dns { .. } => FailureKind::Dns,
            Self::Tcp { .. } => FailureKind::Tcp,
            Self::Tls { .. } => FailureKind::Tls,
            Self::Http { .. } => FailureKind::Http,
        }
    }
}

/// A `host[:port]` string that cannot be probed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("host is empty")]
    EmptyHost,

    #[error("invalid port in {0:?}")]
    InvalidPort(String),

    #[error("unterminated IPv6 literal in {0:?}")]
    UnterminatedIpv6(String),
}

/// Trust store could not be loaded or turned into a TLS client config.
#[derive(Debug, Error)]
pub enum TrustStoreError {
    #[error("reading cert directory {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("tls configuration error: {0}")]
    Config(String),
}
