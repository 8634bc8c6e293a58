//! Workload event sources.
//!
//! A `WorkloadWatcher` opens a stream of lifecycle events for one
//! namespace and label selector. Failing to open it is fatal to discovery;
//! a bad individual event is not.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Mutex;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::DiscoveryError;
use crate::workload::{LabelSelector, WorkloadEvent};

/// A live sequence of workload events.
pub trait WorkloadEventStream: Send {
    /// Next event, a per-event error, or `None` at end of stream.
    fn next(&mut self) -> impl Future<Output = Option<Result<WorkloadEvent, DiscoveryError>>> + Send;
}

/// Opens workload event streams.
pub trait WorkloadWatcher: Send + Sync {
    type Stream: WorkloadEventStream;

    fn watch(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> impl Future<Output = Result<Self::Stream, DiscoveryError>> + Send;
}

// ── Channel ────────────────────────────────────────────────────────

/// Watcher fed through a tokio channel by an embedding application.
///
/// The stream can be opened once.
pub struct ChannelWatcher {
    rx: Mutex<Option<mpsc::Receiver<WorkloadEvent>>>,
}

impl ChannelWatcher {
    /// Create a watcher and the sender that feeds it.
    pub fn new(buffer: usize) -> (mpsc::Sender<WorkloadEvent>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            tx,
            Self {
                rx: Mutex::new(Some(rx)),
            },
        )
    }
}

pub struct ChannelStream {
    rx: mpsc::Receiver<WorkloadEvent>,
}

impl WorkloadEventStream for ChannelStream {
    async fn next(&mut self) -> Option<Result<WorkloadEvent, DiscoveryError>> {
        self.rx.recv().await.map(Ok)
    }
}

impl WorkloadWatcher for ChannelWatcher {
    type Stream = ChannelStream;

    async fn watch(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<ChannelStream, DiscoveryError> {
        let rx = self
            .rx
            .lock()
            .map_err(|_| DiscoveryError::StreamEstablishment("watcher lock poisoned".into()))?
            .take()
            .ok_or_else(|| {
                DiscoveryError::StreamEstablishment("channel stream already taken".into())
            })?;
        debug!(%namespace, %selector, "channel workload stream opened");
        Ok(ChannelStream { rx })
    }
}

// ── JSON lines ─────────────────────────────────────────────────────

/// Watcher reading one JSON-encoded `WorkloadEvent` per line from a file.
///
/// Blank lines are skipped. A line that fails to decode is a per-event
/// error; a read error ends the stream after being reported.
#[derive(Debug, Clone)]
pub struct JsonLinesWatcher {
    path: PathBuf,
}

impl JsonLinesWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

pub struct JsonLinesStream {
    lines: Lines<BufReader<File>>,
    line_no: usize,
    done: bool,
}

impl WorkloadEventStream for JsonLinesStream {
    async fn next(&mut self) -> Option<Result<WorkloadEvent, DiscoveryError>> {
        while !self.done {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    self.done = true;
                    return Some(Err(DiscoveryError::Event(format!(
                        "read failed after line {}: {e}",
                        self.line_no
                    ))));
                }
            };
            self.line_no += 1;

            if line.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&line).map_err(|e| {
                DiscoveryError::Event(format!("line {}: {e}", self.line_no))
            }));
        }
        self.done = true;
        None
    }
}

impl WorkloadWatcher for JsonLinesWatcher {
    type Stream = JsonLinesStream;

    async fn watch(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<JsonLinesStream, DiscoveryError> {
        let file = File::open(&self.path).await.map_err(|e| {
            DiscoveryError::StreamEstablishment(format!("{}: {e}", self.path.display()))
        })?;
        debug!(path = ?self.path, %namespace, %selector, "json-lines workload stream opened");
        Ok(JsonLinesStream {
            lines: BufReader::new(file).lines(),
            line_no: 0,
            done: false,
        })
    }
}
