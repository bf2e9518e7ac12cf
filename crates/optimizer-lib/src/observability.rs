//! Observability infrastructure for the optimizer
//!
//! Provides:
//! - Prometheus metrics (instances evaluated, stops by mode, step failures, run duration)
//! - Structured JSON logging with tracing

use crate::models::{RunSummary, StopReason};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for whole-run duration (in seconds)
const RUN_DURATION_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<OptimizerMetricsInner> = OnceLock::new();

struct OptimizerMetricsInner {
    runs_total: IntCounter,
    run_duration_seconds: Histogram,
    instances_evaluated: IntCounter,
    instances_stopped: IntCounterVec,
    step_failures: IntCounterVec,
    metric_unavailable: IntCounter,
}

impl OptimizerMetricsInner {
    fn new() -> Self {
        Self {
            runs_total: register_int_counter!(
                "instance_optimizer_runs_total",
                "Number of optimization passes executed"
            )
            .expect("Failed to register runs_total"),

            run_duration_seconds: register_histogram!(
                "instance_optimizer_run_duration_seconds",
                "Wall-clock time of a full optimization pass",
                RUN_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register run_duration_seconds"),

            instances_evaluated: register_int_counter!(
                "instance_optimizer_instances_evaluated_total",
                "Candidate instances evaluated"
            )
            .expect("Failed to register instances_evaluated"),

            instances_stopped: register_int_counter_vec!(
                "instance_optimizer_instances_stopped_total",
                "Instances stopped, labelled real or simulated",
                &["mode", "reason"]
            )
            .expect("Failed to register instances_stopped"),

            step_failures: register_int_counter_vec!(
                "instance_optimizer_step_failures_total",
                "Failed action steps by step name",
                &["step"]
            )
            .expect("Failed to register step_failures"),

            metric_unavailable: register_int_counter!(
                "instance_optimizer_metric_unavailable_total",
                "Utilization lookups that failed and degraded to no data"
            )
            .expect("Failed to register metric_unavailable"),
        }
    }
}

/// Action step names used as metric labels
pub mod steps {
    pub const STOP: &str = "stop";
    pub const AUDIT: &str = "audit";
    pub const NOTIFY: &str = "notify";
}

/// Optimizer metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance. Clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct OptimizerMetrics {
    _private: (),
}

impl Default for OptimizerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(OptimizerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &OptimizerMetricsInner {
        GLOBAL_METRICS.get_or_init(OptimizerMetricsInner::new)
    }

    pub fn observe_run(&self, duration_secs: f64) {
        self.inner().runs_total.inc();
        self.inner().run_duration_seconds.observe(duration_secs);
    }

    pub fn inc_evaluated(&self) {
        self.inner().instances_evaluated.inc();
    }

    pub fn inc_stopped(&self, dry_run: bool, reason: &StopReason) {
        let mode = if dry_run { "simulated" } else { "real" };
        let reason = match reason {
            StopReason::AfterHours => "after_hours",
            StopReason::LowCpu(_) => "low_cpu",
        };
        self.inner()
            .instances_stopped
            .with_label_values(&[mode, reason])
            .inc();
    }

    pub fn inc_step_failure(&self, step: &str) {
        self.inner().step_failures.with_label_values(&[step]).inc();
    }

    pub fn inc_metric_unavailable(&self) {
        self.inner().metric_unavailable.inc();
    }
}

/// Structured logger for optimizer events
///
/// Every event carries the table name so audit-trail inconsistencies can
/// be traced back to a store.
#[derive(Clone)]
pub struct StructuredLogger {
    table_name: String,
}

impl StructuredLogger {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
        }
    }

    pub fn log_run_started(&self, candidates: usize, dry_run: bool) {
        info!(
            event = "run_started",
            table = %self.table_name,
            candidates = candidates,
            dry_run = dry_run,
            "Optimization run started"
        );
    }

    pub fn log_verdict(&self, instance_id: &str, utilization: Option<f64>, reason: Option<&StopReason>) {
        info!(
            event = "verdict",
            instance_id = %instance_id,
            utilization_percent = ?utilization,
            should_stop = reason.is_some(),
            reason = %reason.map(ToString::to_string).unwrap_or_default(),
            "Instance evaluated"
        );
    }

    pub fn log_metric_unavailable(&self, instance_id: &str, error: &str) {
        warn!(
            event = "metric_unavailable",
            instance_id = %instance_id,
            error = %error,
            "Utilization unavailable, treating as no data"
        );
    }

    pub fn log_stop_action(&self, instance_id: &str, reason: &StopReason, dry_run: bool) {
        info!(
            event = "instance_stopped",
            table = %self.table_name,
            instance_id = %instance_id,
            reason = %reason,
            dry_run = dry_run,
            "Stop action applied"
        );
    }

    pub fn log_step_failure(&self, instance_id: &str, step: &str, error: &str) {
        error!(
            event = "action_step_failed",
            instance_id = %instance_id,
            step = %step,
            error = %error,
            "Action step failed"
        );
    }

    /// The instance was stopped but no audit record exists for it
    pub fn log_audit_inconsistency(&self, instance_id: &str, error: &str) {
        error!(
            event = "audit_inconsistency",
            table = %self.table_name,
            instance_id = %instance_id,
            error = %error,
            "Instance stopped without an audit record"
        );
    }

    pub fn log_run_completed(&self, summary: &RunSummary, elapsed_ms: u128) {
        if summary.failed > 0 {
            warn!(
                event = "run_completed",
                table = %self.table_name,
                evaluated = summary.evaluated,
                stopped = summary.stopped,
                failed = summary.failed,
                dry_run = summary.dry_run,
                elapsed_ms = elapsed_ms,
                "Optimization run completed with failures"
            );
        } else {
            info!(
                event = "run_completed",
                table = %self.table_name,
                evaluated = summary.evaluated,
                stopped = summary.stopped,
                failed = summary.failed,
                dry_run = summary.dry_run,
                elapsed_ms = elapsed_ms,
                "Optimization run completed"
            );
        }
    }
}
