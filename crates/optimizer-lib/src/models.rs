//! Core data models for the instance optimizer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Lifecycle state of a compute instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Running,
    Stopped,
    #[serde(other)]
    Other,
}

/// Candidate instance as reported by the inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub instance_id: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    pub state: InstanceState,
}

impl InstanceDescriptor {
    pub fn new(instance_id: impl Into<String>, state: InstanceState) -> Self {
        Self {
            instance_id: instance_id.into(),
            tags: HashMap::new(),
            state,
        }
    }

    /// Add a tag, builder style
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Average utilization over a trailing window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UtilizationSample {
    pub average_percent: f64,
    pub window_end: DateTime<Utc>,
}

/// Why an instance should be stopped
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StopReason {
    AfterHours,
    LowCpu(f64),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::AfterHours => write!(f, "After hours"),
            StopReason::LowCpu(value) => write!(f, "Low CPU: {}%", value),
        }
    }
}

/// Stop/no-stop decision for one instance
///
/// The reason is singular: a verdict either carries exactly one
/// [`StopReason`] or none at all.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub reason: Option<StopReason>,
}

impl Verdict {
    pub fn stop(reason: StopReason) -> Self {
        Self {
            reason: Some(reason),
        }
    }

    pub fn keep() -> Self {
        Self { reason: None }
    }

    pub fn should_stop(&self) -> bool {
        self.reason.is_some()
    }
}

/// Append-only audit entry, keyed by (instance_id, timestamp)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuditRecord {
    pub instance_id: String,
    /// Evaluation time in the configured zone, `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
    pub reason: String,
    #[serde(default)]
    pub dry_run: bool,
}

impl AuditRecord {
    /// Composite key; two records for one instance need distinct timestamps
    pub fn key(&self) -> (&str, &str) {
        (&self.instance_id, &self.timestamp)
    }
}

/// Result of a single step in the action sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    /// Stop command intentionally not issued (dry run)
    Simulated,
    Skipped,
    Failed(String),
}

impl StepStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepStatus::Failed(_))
    }
}

/// Per-step results of executing a stop verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub stop: StepStatus,
    pub audit: StepStatus,
    pub notification: StepStatus,
}

impl ActionOutcome {
    pub fn skipped() -> Self {
        Self {
            stop: StepStatus::Skipped,
            audit: StepStatus::Skipped,
            notification: StepStatus::Skipped,
        }
    }

    /// True when the instance was stopped, or would have been under dry run
    pub fn stopped(&self) -> bool {
        matches!(self.stop, StepStatus::Completed | StepStatus::Simulated)
    }

    pub fn has_failure(&self) -> bool {
        self.stop.is_failed() || self.audit.is_failed() || self.notification.is_failed()
    }
}

/// Everything that happened to one candidate during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceOutcome {
    pub instance_id: String,
    pub utilization_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_error: Option<String>,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionOutcome>,
}

impl InstanceOutcome {
    pub fn stopped(&self) -> bool {
        self.action.as_ref().is_some_and(ActionOutcome::stopped)
    }

    pub fn failed(&self) -> bool {
        self.action.as_ref().is_some_and(ActionOutcome::has_failure)
    }
}

/// Aggregate result of one evaluation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub dry_run: bool,
    pub evaluated: usize,
    /// Stopped for real, or would-stop under dry run
    pub stopped: usize,
    pub failed: usize,
    pub outcomes: Vec<InstanceOutcome>,
}

impl RunSummary {
    pub fn from_outcomes(dry_run: bool, mut outcomes: Vec<InstanceOutcome>) -> Self {
        outcomes.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        Self {
            dry_run,
            evaluated: outcomes.len(),
            stopped: outcomes.iter().filter(|o| o.stopped()).count(),
            failed: outcomes.iter().filter(|o| o.failed()).count(),
            outcomes,
        }
    }

    pub fn outcome(&self, instance_id: &str) -> Option<&InstanceOutcome> {
        self.outcomes.iter().find(|o| o.instance_id == instance_id)
    }
}

/// Response shape of a single invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub status_code: u16,
    pub body: String,
}
