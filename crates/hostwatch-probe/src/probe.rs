//! Staged network probe: DNS → TCP → TLS → HTTP.
//!
//! Each stage runs only if the previous one succeeded. A failing stage
//! records its own elapsed time, leaves later stage timings at zero and
//! ends the probe. One connection is opened per probe; the HTTP request
//! travels over the same TLS session, and every exit path closes it.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::Empty;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use serde::{Serialize, Serializer};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use crate::error::{ProbeError, TrustStoreError};
use crate::target::ProbeTarget;
use crate::trust::{self, DirTrustStore};

/// Directory holding extra CA certificates on typical Linux hosts.
pub const DEFAULT_CERT_DIR: &str = "/usr/local/share/ca-certificates";

/// When the HTTP stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpStage {
    /// Every probe ends with an HTTP GET (to `/` when no path is given).
    #[default]
    Always,
    /// Only probes with a non-empty path issue an HTTP GET.
    WhenPathGiven,
}

impl FromStr for HttpStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(Self::Always),
            "when-path-given" => Ok(Self::WhenPathGiven),
            other => Err(format!("unknown http stage policy: {other}")),
        }
    }
}

/// Probe timeouts and policy.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Bound on DNS resolution and on TCP connect.
    pub connect_timeout: Duration,
    /// Bound on the TLS handshake and on the HTTP round trip.
    pub request_timeout: Duration,
    pub http_stage: HttpStage,
    /// Extra CA certificates, appended to the system roots.
    pub cert_dir: PathBuf,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            http_stage: HttpStage::Always,
            cert_dir: PathBuf::from(DEFAULT_CERT_DIR),
        }
    }
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

/// Outcome of one probe. Produced once and never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProbeResult {
    #[serde(rename = "dns_resolution_ms", serialize_with = "as_millis")]
    pub dns_resolution: Duration,
    #[serde(rename = "tcp_connect_ms", serialize_with = "as_millis")]
    pub tcp_connect: Duration,
    #[serde(rename = "tls_handshake_ms", serialize_with = "as_millis")]
    pub tls_handshake: Duration,
    #[serde(rename = "http_round_trip_ms", serialize_with = "as_millis")]
    pub http_round_trip: Duration,
    pub reachable: bool,
    /// HTTP status if the HTTP stage ran, else 0.
    pub status_code: u16,
    /// Present only when `reachable` is false.
    pub failure_reason: Option<ProbeError>,
}

impl ProbeResult {
    fn failed(mut self, err: ProbeError) -> Self {
        debug!(error = %err, "probe stage failed");
        self.reachable = false;
        self.failure_reason = Some(err);
        self
    }

    pub fn error(&self) -> Option<&ProbeError> {
        self.failure_reason.as_ref()
    }

    /// Sum of all stage timings.
    pub fn total(&self) -> Duration {
        self.dns_resolution + self.tcp_connect + self.tls_handshake + self.http_round_trip
    }
}

/// Aborts the HTTP connection driver when dropped.
struct ConnectionGuard(JoinHandle<()>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs staged probes with a shared TLS trust store. Cheap to clone.
#[derive(Clone)]
pub struct Prober {
    config: ProbeConfig,
    tls: Arc<rustls::ClientConfig>,
}

impl Prober {
    /// Create a prober, loading the trust store from `config.cert_dir`.
    ///
    /// An unreadable certificate directory falls back to system roots.
    pub fn new(config: ProbeConfig) -> Result<Self, TrustStoreError> {
        let roots = trust::load_or_system_roots(&DirTrustStore::new(&config.cert_dir));
        let tls = trust::client_config(roots)?;
        Ok(Self { config, tls })
    }

    /// Create a prober with a pre-built TLS client config.
    pub fn with_tls_config(config: ProbeConfig, tls: Arc<rustls::ClientConfig>) -> Self {
        Self { config, tls }
    }

    fn http_stage_enabled(&self, path: &str) -> bool {
        match self.config.http_stage {
            HttpStage::Always => true,
            HttpStage::WhenPathGiven => !path.is_empty(),
        }
    }

    /// Probe `target`, requesting `path` in the HTTP stage.
    pub async fn probe(&self, target: &ProbeTarget, path: &str) -> ProbeResult {
        let mut result = ProbeResult::default();

        let start = Instant::now();
        let resolved = self.resolve(target).await;
        result.dns_resolution = start.elapsed();
        let addr = match resolved {
            Ok(addr) => addr,
            Err(e) => return result.failed(e),
        };

        let start = Instant::now();
        let connected = self.connect(addr).await;
        result.tcp_connect = start.elapsed();
        let tcp = match connected {
            Ok(tcp) => tcp,
            Err(e) => return result.failed(e),
        };

        let start = Instant::now();
        let handshake = self.handshake(&target.host, tcp).await;
        result.tls_handshake = start.elapsed();
        let tls = match handshake {
            Ok(tls) => tls,
            Err(e) => return result.failed(e),
        };

        if !self.http_stage_enabled(path) {
            result.reachable = true;
            return result;
        }

        let start = Instant::now();
        let (url, response) = self.round_trip(target, path, tls).await;
        result.http_round_trip = start.elapsed();
        match response {
            Ok(status) => {
                result.status_code = status;
                if (200..400).contains(&status) {
                    result.reachable = true;
                    debug!(%target, status, total = ?result.total(), "probe succeeded");
                    result
                } else {
                    result.failed(ProbeError::Http {
                        url,
                        reason: format!("status code {status}"),
                    })
                }
            }
            Err(e) => result.failed(e),
        }
    }

    /// DNS + TCP only. Returns the connect latency.
    pub async fn tcp_check(&self, host: &str, port: u16) -> Result<Duration, ProbeError> {
        let addr = self.resolve(&ProbeTarget::new(host, port)).await?;
        let start = Instant::now();
        let _stream = self.connect(addr).await?;
        Ok(start.elapsed())
    }

    /// Resolve to the first address only.
    async fn resolve(&self, target: &ProbeTarget) -> Result<SocketAddr, ProbeError> {
        let dns_error = |reason: String| ProbeError::Dns {
            host: target.host.clone(),
            reason,
        };

        let lookup = tokio::net::lookup_host((target.host.as_str(), target.port));
        let mut addrs = tokio::time::timeout(self.config.connect_timeout, lookup)
            .await
            .map_err(|_| dns_error(format!("timed out after {:?}", self.config.connect_timeout)))?
            .map_err(|e| dns_error(e.to_string()))?;

        addrs
            .next()
            .ok_or_else(|| dns_error("no addresses returned".to_string()))
    }

    async fn connect(&self, addr: SocketAddr) -> Result<TcpStream, ProbeError> {
        let tcp_error = |reason: String| ProbeError::Tcp {
            addr: addr.to_string(),
            reason,
        };

        tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| tcp_error(format!("timed out after {:?}", self.config.connect_timeout)))?
            .map_err(|e| tcp_error(e.to_string()))
    }

    async fn handshake(
        &self,
        host: &str,
        tcp: TcpStream,
    ) -> Result<TlsStream<TcpStream>, ProbeError> {
        let tls_error = |reason: String| ProbeError::Tls {
            host: host.to_string(),
            reason,
        };

        let server_name =
            ServerName::try_from(host.to_string()).map_err(|e| tls_error(e.to_string()))?;
        let connector = TlsConnector::from(Arc::clone(&self.tls));

        tokio::time::timeout(
            self.config.request_timeout,
            connector.connect(server_name, tcp),
        )
        .await
        .map_err(|_| tls_error(format!("timed out after {:?}", self.config.request_timeout)))?
        .map_err(|e| tls_error(e.to_string()))
    }

    /// HTTP/1.1 GET over the established TLS session. Returns the URL and status.
    async fn round_trip(
        &self,
        target: &ProbeTarget,
        path: &str,
        tls: TlsStream<TcpStream>,
    ) -> (String, Result<u16, ProbeError>) {
        let path = match path {
            "" => "/".to_string(),
            p if p.starts_with('/') => p.to_string(),
            p => format!("/{p}"),
        };
        let host_header = target.host_header();
        let url = format!("https://{host_header}{path}");
        let http_error = |reason: String| ProbeError::Http {
            url: url.clone(),
            reason,
        };

        let request = async {
            let io = TokioIo::new(tls);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| http_error(e.to_string()))?;

            let _guard = ConnectionGuard(tokio::spawn(async move {
                if let Err(e) = conn.await {
                    debug!(error = %e, "probe connection closed with error");
                }
            }));

            let req = http::Request::builder()
                .method(http::Method::GET)
                .uri(path.as_str())
                .header(http::header::HOST, host_header.as_str())
                .header(http::header::USER_AGENT, "hostwatch-probe/0.1")
                .body(Empty::<Bytes>::new())
                .map_err(|e| http_error(e.to_string()))?;

            let resp = sender
                .send_request(req)
                .await
                .map_err(|e| http_error(e.to_string()))?;
            Ok::<u16, ProbeError>(resp.status().as_u16())
        };

        let result = match tokio::time::timeout(self.config.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(http_error(format!(
                "timed out after {:?}",
                self.config.request_timeout
            ))),
        };
        (url, result)
    }
}
