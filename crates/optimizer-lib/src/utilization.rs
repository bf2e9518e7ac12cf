//! Utilization lookups through the metric gateway
//!
//! The gateway returns raw datapoints for a trailing window; the sampler
//! reduces them to the most recent average. There is no retry here: a
//! transport failure is reported once and treated as "no data" upstream.

use crate::error::{OptimizerError, OptimizerResult};
use crate::models::UtilizationSample;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One aggregated datapoint for a single period
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub timestamp: DateTime<Utc>,
    pub average: f64,
}

/// Parameters of a utilization lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtilizationQuery {
    pub metric_name: String,
    pub statistic: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub period: Duration,
}

impl UtilizationQuery {
    /// CPU average over the window ending at `end`
    pub fn cpu_average(end: DateTime<Utc>, window: Duration, period: Duration) -> Self {
        let window = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            metric_name: "CPUUtilization".to_string(),
            statistic: "Average".to_string(),
            start: end - window,
            end,
            period,
        }
    }
}

/// Transport to the metrics collection service
#[async_trait]
pub trait MetricGateway: Send + Sync {
    async fn datapoints(&self, instance_id: &str, query: &UtilizationQuery)
        -> Result<Vec<Datapoint>>;
}

/// Most recent datapoint, if any
pub fn latest_datapoint(points: &[Datapoint]) -> Option<&Datapoint> {
    points.iter().max_by_key(|p| p.timestamp)
}

/// Reduces gateway datapoints to a single [`UtilizationSample`]
#[derive(Clone)]
pub struct UtilizationSampler {
    gateway: Arc<dyn MetricGateway>,
    period: Duration,
}

impl UtilizationSampler {
    pub fn new(gateway: Arc<dyn MetricGateway>, period: Duration) -> Self {
        Self { gateway, period }
    }

    /// Latest average utilization over the trailing window ending at `now`
    ///
    /// `Ok(None)` means the window held no datapoints.
    pub async fn get_average_utilization(
        &self,
        instance_id: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> OptimizerResult<Option<UtilizationSample>> {
        let query = UtilizationQuery::cpu_average(now, window, self.period);

        let points = self
            .gateway
            .datapoints(instance_id, &query)
            .await
            .map_err(|e| OptimizerError::MetricUnavailable {
                instance_id: instance_id.to_string(),
                message: format!("{:#}", e),
            })?;

        let sample = latest_datapoint(&points).map(|p| UtilizationSample {
            average_percent: p.average,
            window_end: query.end,
        });

        debug!(
            instance_id = %instance_id,
            datapoints = points.len(),
            average_percent = ?sample.map(|s| s.average_percent),
            "Fetched utilization"
        );

        Ok(sample)
    }
}
