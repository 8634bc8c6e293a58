//! Discovery source — derives monitored hosts from workload events.
//!
//! For every added or modified workload that is running and has an
//! address, each `CLIENT_DOMAIN` env var names a candidate host. The
//! candidate is checked over TCP with retry/backoff and the outcome is
//! recorded in the `HostStore`: up on success, down once retries are
//! exhausted. Deleted workloads never retract hosts.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use hostwatch_probe::{DEFAULT_PORT, ProbeError, Prober};
use hostwatch_state::HostStore;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::backoff::{RetryOutcome, RetryPolicy, retry};
use crate::error::DiscoveryError;
use crate::watcher::{WorkloadEventStream, WorkloadWatcher};
use crate::workload::{LabelSelector, Workload, WorkloadEvent};

/// Env var whose value names a host to monitor.
pub const DEFAULT_HOST_ENV_VAR: &str = "CLIENT_DOMAIN";

/// Label selector scoping the watched workloads.
pub const DEFAULT_LABEL_SELECTOR: &str = "workload-class=webstack-php";

/// TCP reachability check used to validate candidate hosts.
pub trait ConnectivityCheck: Send + Sync {
    fn check(
        &self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = Result<Duration, ProbeError>> + Send;
}

impl ConnectivityCheck for Prober {
    async fn check(&self, host: &str, port: u16) -> Result<Duration, ProbeError> {
        self.tcp_check(host, port).await
    }
}

/// Discovery settings.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub namespace: String,
    pub label_selector: LabelSelector,
    pub host_env_var: String,
    /// Port used for the TCP validation check.
    pub port: u16,
    pub retry: RetryPolicy,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            label_selector: DEFAULT_LABEL_SELECTOR
                .parse()
                .unwrap_or_default(),
            host_env_var: DEFAULT_HOST_ENV_VAR.to_string(),
            port: DEFAULT_PORT,
            retry: RetryPolicy::default(),
        }
    }
}

/// Consumes workload events and registers validated hosts.
pub struct DiscoverySource<W, C> {
    watcher: W,
    check: C,
    store: HostStore,
    config: DiscoveryConfig,
}

impl<W, C> DiscoverySource<W, C>
where
    W: WorkloadWatcher,
    C: ConnectivityCheck,
{
    pub fn new(watcher: W, check: C, store: HostStore, config: DiscoveryConfig) -> Self {
        Self {
            watcher,
            check,
            store,
            config,
        }
    }

    /// Process events until the stream ends or `shutdown` fires.
    ///
    /// Only a failure to open the stream is returned as an error.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), DiscoveryError> {
        let mut stream = self
            .watcher
            .watch(&self.config.namespace, &self.config.label_selector)
            .await
            .inspect_err(|e| error!(error = %e, "workload watch could not be established"))?;

        info!(
            namespace = %self.config.namespace,
            selector = %self.config.label_selector,
            "discovery started"
        );

        loop {
            let next = tokio::select! {
                next = stream.next() => next,
                _ = shutdown.changed() => {
                    info!("discovery shutting down");
                    return Ok(());
                }
            };

            match next {
                None => {
                    info!("workload event stream ended");
                    return Ok(());
                }
                Some(Err(e)) => warn!(error = %e, "skipping workload event"),
                Some(Ok(event)) => {
                    if self.handle_event(event, &mut shutdown).await.is_break() {
                        info!("discovery shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn handle_event(
        &self,
        event: WorkloadEvent,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ControlFlow<()> {
        let workload = match event {
            WorkloadEvent::Deleted(w) => {
                info!(workload = %w.key(), "workload deleted, its hosts stay monitored");
                return ControlFlow::Continue(());
            }
            WorkloadEvent::Added(w) | WorkloadEvent::Modified(w) => w,
        };
        debug!(workload = %workload.key(), phase = ?workload.phase, "workload event");

        if !self.config.label_selector.matches(&workload.labels) {
            debug!(workload = %workload.key(), "workload outside label selector, skipping");
            return ControlFlow::Continue(());
        }
        if let Some(reason) = workload.skip_reason() {
            debug!(workload = %workload.key(), %reason, "workload not actionable, skipping");
            return ControlFlow::Continue(());
        }

        self.validate_hosts(&workload, shutdown).await
    }

    async fn validate_hosts(
        &self,
        workload: &Workload,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ControlFlow<()> {
        let port = self.config.port;
        let check = &self.check;

        for host in workload.env_values(&self.config.host_env_var) {
            let host = host.trim();
            if host.is_empty() {
                debug!(workload = %workload.key(), "empty host env var, skipping");
                continue;
            }
            info!(workload = %workload.key(), %host, "workload exposes host");

            let outcome = retry(&self.config.retry, shutdown, move |_| check.check(host, port)).await;
            let reachable = match outcome {
                RetryOutcome::Succeeded(latency) => {
                    info!(%host, port, ?latency, "host validated");
                    true
                }
                RetryOutcome::Exhausted(e) => {
                    warn!(%host, port, error = %e, "host currently unreachable");
                    false
                }
                RetryOutcome::Cancelled => return ControlFlow::Break(()),
            };

            if let Err(e) = self.store.record_sample(host, reachable) {
                warn!(%host, error = %e, "failed to record discovered host");
            }
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::{Arc, Mutex};

    use crate::watcher::ChannelWatcher;
    use crate::workload::{Container, EnvVar, WorkloadPhase};
    use hostwatch_state::{ChannelSink, ManualClock};

    /// Fails each host a configured number of times, then succeeds.
    #[derive(Default)]
    struct ScriptedCheck {
        failures: Mutex<HashMap<String, u32>>,
        calls: Mutex<Vec<(String, u16)>>,
    }

    impl ScriptedCheck {
        fn failing(host: &str, times: u32) -> Self {
            let check = Self::default();
            check.failures.lock().unwrap().insert(host.to_string(), times);
            check
        }

        fn calls(&self) -> Vec<(String, u16)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ConnectivityCheck for Arc<ScriptedCheck> {
        async fn check(&self, host: &str, port: u16) -> Result<Duration, ProbeError> {
            self.calls.lock().unwrap().push((host.to_string(), port));
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(host) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    Err(ProbeError::Tcp {
                        addr: format!("{host}:{port}"),
                        reason: "connection refused".to_string(),
                    })
                }
                _ => Ok(Duration::from_millis(5)),
            }
        }
    }

    fn test_store() -> HostStore {
        let (sink, _rx) = ChannelSink::new();
        HostStore::with_clock(Arc::new(sink), Arc::new(ManualClock::new(1_000)))
    }

    fn workload(domain: &str) -> Workload {
        Workload {
            namespace: "shop".to_string(),
            name: "web-0".to_string(),
            labels: BTreeMap::from([("workload-class".to_string(), "webstack-php".to_string())]),
            pod_ip: Some("10.1.2.3".to_string()),
            phase: WorkloadPhase::Running,
            containers: vec![Container {
                name: "php".to_string(),
                env: vec![EnvVar {
                    name: "CLIENT_DOMAIN".to_string(),
                    value: domain.to_string(),
                }],
            }],
        }
    }

    async fn run_events(
        check: Arc<ScriptedCheck>,
        store: &HostStore,
        events: Vec<WorkloadEvent>,
    ) -> Result<(), DiscoveryError> {
        let (tx, watcher) = ChannelWatcher::new(events.len().max(1));
        for event in events {
            tx.send(event).await.unwrap();
        }
        drop(tx);

        let source = DiscoverySource::new(watcher, check, store.clone(), DiscoveryConfig::default());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        source.run(shutdown_rx).await
    }

    #[test]
    fn default_config() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.host_env_var, "CLIENT_DOMAIN");
        assert_eq!(config.port, 443);
        assert_eq!(config.label_selector.to_string(), "workload-class=webstack-php");
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[tokio::test(start_paused = true)]
    async fn reachable_host_is_registered_up() {
        let store = test_store();
        let check = Arc::new(ScriptedCheck::default());

        run_events(check.clone(), &store, vec![WorkloadEvent::Added(workload("b.example"))])
            .await
            .unwrap();

        assert!(store.get("b.example").unwrap().is_up);
        assert_eq!(check.calls(), vec![("b.example".to_string(), 443)]);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_register_host_down() {
        let store = test_store();
        let check = Arc::new(ScriptedCheck::failing("b.example", 10));
        let start = tokio::time::Instant::now();

        run_events(check.clone(), &store, vec![WorkloadEvent::Modified(workload("b.example"))])
            .await
            .unwrap();

        let status = store.get("b.example").unwrap();
        assert!(!status.is_up);
        assert!(status.down_since_at.is_some());
        assert_eq!(check.calls().len(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn non_actionable_workloads_are_skipped() {
        let store = test_store();
        let check = Arc::new(ScriptedCheck::default());

        let mut no_ip = workload("a.example");
        no_ip.pod_ip = None;
        let mut finished = workload("b.example");
        finished.phase = WorkloadPhase::Failed;
        let mut pending = workload("c.example");
        pending.phase = WorkloadPhase::Pending;
        let mut other_class = workload("d.example");
        other_class.labels.clear();

        run_events(
            check.clone(),
            &store,
            vec![
                WorkloadEvent::Added(no_ip),
                WorkloadEvent::Added(finished),
                WorkloadEvent::Modified(pending),
                WorkloadEvent::Added(other_class),
            ],
        )
        .await
        .unwrap();

        assert!(store.is_empty());
        assert!(check.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deleted_workload_keeps_host() {
        let store = test_store();
        let check = Arc::new(ScriptedCheck::default());

        run_events(
            check.clone(),
            &store,
            vec![
                WorkloadEvent::Added(workload("b.example")),
                WorkloadEvent::Deleted(workload("b.example")),
            ],
        )
        .await
        .unwrap();

        assert!(store.get("b.example").unwrap().is_up);
        assert_eq!(check.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_establishment_failure_is_fatal() {
        let store = test_store();
        let (_tx, watcher) = ChannelWatcher::new(1);
        // Take the only stream so the source's watch fails.
        watcher
            .watch("default", &LabelSelector::default())
            .await
            .unwrap();

        let source = DiscoverySource::new(
            watcher,
            Arc::new(ScriptedCheck::default()),
            store,
            DiscoveryConfig::default(),
        );
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let err = source.run(shutdown_rx).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::StreamEstablishment(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_backoff_records_nothing() {
        let store = test_store();
        let (tx, watcher) = ChannelWatcher::new(1);
        tx.send(WorkloadEvent::Added(workload("b.example")))
            .await
            .unwrap();

        let source = DiscoverySource::new(
            watcher,
            Arc::new(ScriptedCheck::failing("b.example", 10)),
            store.clone(),
            DiscoveryConfig::default(),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let _ = shutdown_tx.send(true);
        });

        source.run(shutdown_rx).await.unwrap();
        assert!(store.get("b.example").is_none());
        drop(tx);
    }
}
