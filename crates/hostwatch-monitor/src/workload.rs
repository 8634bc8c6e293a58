//! Workload lifecycle events and label selectors.
//!
//! The wire shape mirrors a Kubernetes pod watch:
//! `{"type": "ADDED", "object": {"namespace": ..., "name": ..., ...}}`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;

/// Lifecycle phase of a workload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum WorkloadPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl WorkloadPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub env: Vec<EnvVar>,
}

/// Snapshot of one workload as carried by a lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Assigned network address, if any.
    #[serde(default, rename = "podIP")]
    pub pod_ip: Option<String>,
    #[serde(default)]
    pub phase: WorkloadPhase,
    #[serde(default)]
    pub containers: Vec<Container>,
}

/// Why a workload is not actionable yet. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoAddress,
    Terminal(WorkloadPhase),
    NotRunning(WorkloadPhase),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAddress => write!(f, "no address assigned yet"),
            Self::Terminal(phase) => write!(f, "phase {phase:?} is terminal"),
            Self::NotRunning(phase) => write!(f, "phase {phase:?} is not running"),
        }
    }
}

impl Workload {
    /// `{namespace}/{name}`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        if self.pod_ip.as_deref().is_none_or(str::is_empty) {
            Some(SkipReason::NoAddress)
        } else if self.phase.is_terminal() {
            Some(SkipReason::Terminal(self.phase))
        } else if self.phase != WorkloadPhase::Running {
            Some(SkipReason::NotRunning(self.phase))
        } else {
            None
        }
    }

    /// Values of every env var called `name`, across all containers.
    pub fn env_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.containers
            .iter()
            .flat_map(|c| c.env.iter())
            .filter(move |var| var.name == name)
            .map(|var| var.value.as_str())
    }
}

/// A workload lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "object", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkloadEvent {
    Added(Workload),
    Modified(Workload),
    Deleted(Workload),
}

impl WorkloadEvent {
    pub fn workload(&self) -> &Workload {
        match self {
            Self::Added(w) | Self::Modified(w) | Self::Deleted(w) => w,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Modified(_) => "modified",
            Self::Deleted(_) => "deleted",
        }
    }
}

// ── LabelSelector ──────────────────────────────────────────────────

/// Equality-based label selector: `key=value[,key=value...]`.
///
/// The empty selector matches every workload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelSelector {
    requirements: Vec<(String, String)>,
}

impl LabelSelector {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}

impl FromStr for LabelSelector {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut requirements = Vec::new();
        for term in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (key, value) = term
                .split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| DiscoveryError::InvalidSelector(s.to_string()))?;
            requirements.push((key.to_string(), value.to_string()));
        }
        Ok(Self { requirements })
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}
