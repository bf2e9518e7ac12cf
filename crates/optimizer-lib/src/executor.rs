//! Action execution for stop verdicts
//!
//! Steps run strictly in order for one instance:
//!
//! 1. Stop command (skipped under dry run). A failure aborts the rest.
//! 2. Audit record, written for real and simulated stops alike. A failure
//!    does not undo step 1: storage and compute are not transactional, so
//!    a real stop may exist without its audit record.
//! 3. Notification. A failure is reported and nothing else.

use crate::error::OptimizerError;
use crate::models::{ActionOutcome, AuditRecord, InstanceDescriptor, StepStatus, StopReason, Verdict};
use crate::notify::{Notification, Notifier};
use crate::observability::{steps, OptimizerMetrics, StructuredLogger};
use crate::store::AuditStore;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

/// Audit timestamp layout, seconds precision
pub const AUDIT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Compute control plane used to stop instances
#[async_trait]
pub trait ComputeControl: Send + Sync {
    async fn stop_instance(&self, instance_id: &str) -> Result<()>;
}

/// Format an evaluation time the way audit records store it
pub fn audit_timestamp(now: DateTime<Utc>, timezone: Tz) -> String {
    now.with_timezone(&timezone)
        .format(AUDIT_TIMESTAMP_FORMAT)
        .to_string()
}

/// Applies stop verdicts: stop command, audit record, notification
#[derive(Clone)]
pub struct ActionExecutor {
    compute: Arc<dyn ComputeControl>,
    audit: Arc<dyn AuditStore>,
    notifier: Arc<dyn Notifier>,
    timezone: Tz,
    metrics: OptimizerMetrics,
    logger: StructuredLogger,
}

impl ActionExecutor {
    pub fn new(
        compute: Arc<dyn ComputeControl>,
        audit: Arc<dyn AuditStore>,
        notifier: Arc<dyn Notifier>,
        timezone: Tz,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            compute,
            audit,
            notifier,
            timezone,
            metrics: OptimizerMetrics::new(),
            logger,
        }
    }

    /// Execute the side effects of a verdict
    ///
    /// A no-stop verdict performs nothing and reports every step skipped.
    pub async fn execute(
        &self,
        descriptor: &InstanceDescriptor,
        verdict: &Verdict,
        now: DateTime<Utc>,
        dry_run: bool,
    ) -> ActionOutcome {
        let Some(reason) = verdict.reason else {
            return ActionOutcome::skipped();
        };
        let instance_id = descriptor.instance_id.as_str();

        let stop = if dry_run {
            StepStatus::Simulated
        } else {
            match self.compute.stop_instance(instance_id).await {
                Ok(()) => StepStatus::Completed,
                Err(e) => {
                    let err = OptimizerError::StopAction {
                        instance_id: instance_id.to_string(),
                        message: format!("{:#}", e),
                    };
                    self.record_failure(instance_id, steps::STOP, &err);
                    return ActionOutcome {
                        stop: StepStatus::Failed(err.to_string()),
                        audit: StepStatus::Skipped,
                        notification: StepStatus::Skipped,
                    };
                }
            }
        };

        self.metrics.inc_stopped(dry_run, &reason);
        self.logger.log_stop_action(instance_id, &reason, dry_run);

        let audit = self.write_audit(instance_id, &reason, now, dry_run).await;
        let notification = self.notify(instance_id, &reason, dry_run).await;

        ActionOutcome {
            stop,
            audit,
            notification,
        }
    }

    async fn write_audit(
        &self,
        instance_id: &str,
        reason: &StopReason,
        now: DateTime<Utc>,
        dry_run: bool,
    ) -> StepStatus {
        let record = AuditRecord {
            instance_id: instance_id.to_string(),
            timestamp: audit_timestamp(now, self.timezone),
            reason: reason.to_string(),
            dry_run,
        };

        match self.audit.put_record(&record).await {
            Ok(()) => StepStatus::Completed,
            Err(e) => {
                let err = OptimizerError::Persistence {
                    instance_id: instance_id.to_string(),
                    message: format!("{:#}", e),
                };
                self.record_failure(instance_id, steps::AUDIT, &err);
                if !dry_run {
                    self.logger.log_audit_inconsistency(instance_id, &err.to_string());
                }
                StepStatus::Failed(err.to_string())
            }
        }
    }

    async fn notify(&self, instance_id: &str, reason: &StopReason, dry_run: bool) -> StepStatus {
        let notification = Notification::for_stop(instance_id, reason, dry_run);

        match self.notifier.publish(&notification).await {
            Ok(()) => StepStatus::Completed,
            Err(e) => {
                let err = OptimizerError::Notification {
                    instance_id: instance_id.to_string(),
                    message: format!("{:#}", e),
                };
                self.record_failure(instance_id, steps::NOTIFY, &err);
                StepStatus::Failed(err.to_string())
            }
        }
    }

    fn record_failure(&self, instance_id: &str, step: &str, err: &OptimizerError) {
        self.metrics.inc_step_failure(step);
        self.logger.log_step_failure(instance_id, step, &err.to_string());
    }
}
