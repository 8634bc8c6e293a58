//! On-demand host queries: probe now, record the sample, report both.

use hostwatch_probe::{ProbeResult, ProbeTarget, Prober};
use hostwatch_state::{HostStatus, HostStore};
use serde::Serialize;
use tracing::debug;

use crate::error::QueryError;

/// Result of one on-demand query.
#[derive(Debug, Clone, Serialize)]
pub struct HostQuery {
    pub host: String,
    pub probe: ProbeResult,
    /// Host status after the sample was recorded.
    pub status: HostStatus,
}

#[derive(Clone)]
pub struct QueryService {
    prober: Prober,
    store: HostStore,
}

impl QueryService {
    pub fn new(prober: Prober, store: HostStore) -> Self {
        Self { prober, store }
    }

    pub fn store(&self) -> &HostStore {
        &self.store
    }

    /// Probe `host` (`host[:port]`, port defaults to 443) and record the
    /// outcome under `host` as given.
    ///
    /// An unreachable host is a successful query with `reachable: false`.
    pub async fn query_host(&self, host: &str, path: Option<&str>) -> Result<HostQuery, QueryError> {
        let target = ProbeTarget::parse(host)?;
        let key = host.trim();

        let probe = self.prober.probe(&target, path.unwrap_or_default()).await;
        debug!(host = %key, reachable = probe.reachable, total = ?probe.total(), "on-demand probe");

        self.store.record_sample(key, probe.reachable)?;
        let status = self
            .store
            .get(key)
            .ok_or_else(|| QueryError::Removed(key.to_string()))?;

        Ok(HostQuery {
            host: key.to_string(),
            probe,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use hostwatch_probe::{FailureKind, ProbeConfig, TargetError};
    use hostwatch_state::{ChannelSink, TransitionReason};
    use tokio::net::TcpListener;

    fn service() -> (QueryService, tokio::sync::mpsc::UnboundedReceiver<hostwatch_state::TransitionEvent>) {
        let (sink, rx) = ChannelSink::new();
        let prober = Prober::new(ProbeConfig {
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(2),
            ..ProbeConfig::default()
        })
        .unwrap();
        (QueryService::new(prober, HostStore::new(Arc::new(sink))), rx)
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn empty_host_is_a_hard_error() {
        let (service, _rx) = service();
        let err = service.query_host("  ", None).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidTarget(TargetError::EmptyHost)));
        assert!(service.store().is_empty());
    }

    #[tokio::test]
    async fn unreachable_host_is_recorded_down() {
        let (service, _rx) = service();
        let host = format!("127.0.0.1:{}", closed_port().await);

        let query = service.query_host(&host, Some("/")).await.unwrap();

        assert!(!query.probe.reachable);
        assert_eq!(
            query.probe.error().map(|e| e.kind()),
            Some(FailureKind::Tcp)
        );
        assert_eq!(query.host, host);
        assert!(!query.status.is_up);
        assert!(query.status.down_since_at.is_some());
    }

    #[tokio::test]
    async fn repeated_failure_emits_no_event() {
        let (service, mut rx) = service();
        let host = format!("127.0.0.1:{}", closed_port().await);

        service.query_host(&host, None).await.unwrap();
        service.query_host(&host, None).await.unwrap();

        assert!(rx.try_recv().is_err());
        assert_eq!(service.store().len(), 1);
    }

    #[tokio::test]
    async fn query_flip_emits_status_changed() {
        let (service, mut rx) = service();
        let host = format!("127.0.0.1:{}", closed_port().await);
        service.query_host(&host, None).await.unwrap();

        // Simulate the host having been up before the failing query.
        service.store().record_sample(&host, true).unwrap();
        let event = rx.try_recv().unwrap();
        assert_eq!(event.reason, TransitionReason::StatusChangedToUp);

        service.query_host(&host, None).await.unwrap();
        let event = rx.try_recv().unwrap();
        assert_eq!(event.reason, TransitionReason::StatusChangedToDown);
        assert_eq!(event.hostname, host);
    }
}
