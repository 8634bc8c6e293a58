//! hostwatch-probe — staged reachability probes.
//!
//! A probe walks DNS resolution, TCP connect, TLS handshake and an HTTP
//! round trip against one host, timing each stage. Stage failures are
//! captured in the returned `ProbeResult`; nothing here is fatal.
//!
//! # Architecture
//!
//! ```text
//! Prober
//!   ├── ProbeConfig (timeouts, HttpStage policy, cert dir)
//!   ├── rustls ClientConfig ← DirTrustStore (cert dir + webpki roots)
//!   ├── probe(target, path) → ProbeResult
//!   └── tcp_check(host, port) → connect latency
//! ```

pub mod error;
pub mod probe;
pub mod target;
pub mod trust;

pub use error::{FailureKind, ProbeError, TargetError, TrustStoreError};
pub use probe::{DEFAULT_CERT_DIR, HttpStage, ProbeConfig, ProbeResult, Prober};
pub use target::{DEFAULT_PORT, ProbeTarget};
pub use trust::{DirTrustStore, TrustStoreProvider};
