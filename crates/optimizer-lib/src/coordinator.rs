//! Run coordination
//!
//! Drives one evaluation pass over the candidate set. Each instance goes
//! through fetch utilization -> evaluate -> execute on its own; instances
//! share no mutable state and may run concurrently up to the configured
//! limit. A failure on one instance never stops the others.

use crate::config::OptimizerConfig;
use crate::error::{ConfigError, OptimizerError};
use crate::evaluator::evaluate;
use crate::executor::ActionExecutor;
use crate::inventory::InstanceInventory;
use crate::models::{InstanceDescriptor, InstanceOutcome, InvocationResponse, RunSummary};
use crate::observability::{OptimizerMetrics, StructuredLogger};
use crate::utilization::{MetricGateway, UtilizationSampler};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

/// Evaluates candidates and applies verdicts
pub struct RunCoordinator {
    config: OptimizerConfig,
    sampler: UtilizationSampler,
    executor: ActionExecutor,
    metrics: OptimizerMetrics,
    logger: StructuredLogger,
}

impl RunCoordinator {
    pub fn new(
        config: OptimizerConfig,
        gateway: Arc<dyn MetricGateway>,
        executor: ActionExecutor,
        logger: StructuredLogger,
    ) -> Self {
        let sampler = UtilizationSampler::new(gateway, config.metric_period);
        Self {
            config,
            sampler,
            executor,
            metrics: OptimizerMetrics::new(),
            logger,
        }
    }

    /// Evaluate every candidate once and aggregate the outcomes
    pub async fn run(&self, candidates: Vec<InstanceDescriptor>, now: DateTime<Utc>) -> RunSummary {
        let started = Instant::now();
        self.logger
            .log_run_started(candidates.len(), self.config.dry_run);

        let outcomes: Vec<InstanceOutcome> = stream::iter(candidates)
            .map(|descriptor| self.process(descriptor, now))
            .buffer_unordered(self.config.max_concurrency)
            .collect()
            .await;

        let summary = RunSummary::from_outcomes(self.config.dry_run, outcomes);

        let elapsed = started.elapsed();
        self.metrics.observe_run(elapsed.as_secs_f64());
        self.logger.log_run_completed(&summary, elapsed.as_millis());

        summary
    }

    async fn process(&self, descriptor: InstanceDescriptor, now: DateTime<Utc>) -> InstanceOutcome {
        let instance_id = descriptor.instance_id.clone();
        self.metrics.inc_evaluated();

        let (sample, metric_error) = match self
            .sampler
            .get_average_utilization(&instance_id, self.config.metric_window, now)
            .await
        {
            Ok(sample) => (sample, None),
            Err(e) => {
                self.metrics.inc_metric_unavailable();
                self.logger.log_metric_unavailable(&instance_id, &e.to_string());
                (None, Some(e.to_string()))
            }
        };

        let verdict = evaluate(&descriptor, now, sample.as_ref(), &self.config.evaluation);
        let utilization_percent = sample.map(|s| s.average_percent);
        self.logger
            .log_verdict(&instance_id, utilization_percent, verdict.reason.as_ref());

        let action = if verdict.should_stop() {
            Some(
                self.executor
                    .execute(&descriptor, &verdict, now, self.config.dry_run)
                    .await,
            )
        } else {
            None
        };

        InstanceOutcome {
            instance_id,
            utilization_percent,
            metric_error,
            verdict,
            action,
        }
    }
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    message: &'static str,
    #[serde(flatten)]
    summary: &'a RunSummary,
}

/// Entry point for one scheduled invocation
pub struct Optimizer {
    inventory: Arc<dyn InstanceInventory>,
    coordinator: RunCoordinator,
}

impl Optimizer {
    pub fn new(inventory: Arc<dyn InstanceInventory>, coordinator: RunCoordinator) -> Self {
        Self {
            inventory,
            coordinator,
        }
    }

    /// Run one pass; the trigger payload is ignored
    pub async fn invoke(&self, _trigger: &serde_json::Value) -> (InvocationResponse, Option<RunSummary>) {
        self.invoke_at(Utc::now()).await
    }

    /// Run one pass as of `now`
    pub async fn invoke_at(&self, now: DateTime<Utc>) -> (InvocationResponse, Option<RunSummary>) {
        let candidates = match self.inventory.list_candidates().await {
            Ok(candidates) => candidates,
            Err(e) => {
                let err = OptimizerError::Inventory(format!("{:#}", e));
                error!(error = %err, "Aborting run, no candidates evaluated");
                return (
                    InvocationResponse {
                        status_code: 502,
                        body: err.to_string(),
                    },
                    None,
                );
            }
        };

        let summary = self.coordinator.run(candidates, now).await;
        let body = CompletionBody {
            message: "Optimization complete",
            summary: &summary,
        };

        let response = match serde_json::to_string(&body) {
            Ok(body) => InvocationResponse {
                status_code: 200,
                body,
            },
            Err(e) => InvocationResponse {
                status_code: 500,
                body: format!("Failed to render run summary: {}", e),
            },
        };

        (response, Some(summary))
    }
}

/// Response for a run aborted by invalid configuration
pub fn configuration_failure(err: &ConfigError) -> InvocationResponse {
    InvocationResponse {
        status_code: 500,
        body: format!("Configuration error: {}", err),
    }
}
