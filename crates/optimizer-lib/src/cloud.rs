//! HTTP client for the cloud control API
//!
//! One client serves three collaborator roles: candidate inventory,
//! metric gateway and compute control. Endpoints:
//!
//! - `GET  /instances`
//! - `GET  /instances/{id}/metrics/{metric}?start=&end=&period=&statistic=`
//! - `POST /instances/{id}/stop`

use crate::executor::ComputeControl;
use crate::inventory::{CandidateFilter, InstanceInventory};
use crate::models::InstanceDescriptor;
use crate::utilization::{Datapoint, MetricGateway, UtilizationQuery};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Deserialize)]
struct InstanceList {
    instances: Vec<InstanceDescriptor>,
}

#[derive(Debug, Deserialize)]
struct MetricSeries {
    #[serde(default)]
    datapoints: Vec<Datapoint>,
}

/// Cloud control API client
pub struct CloudApiClient {
    client: Client,
    base_url: Url,
    filter: CandidateFilter,
}

impl CloudApiClient {
    /// Create a client; `timeout` bounds every request
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid cloud API URL")?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Cloud API URL cannot carry a path: {}", base_url);
        }

        Ok(Self {
            client,
            base_url,
            filter: CandidateFilter::default(),
        })
    }

    /// Endpoint below the base URL
    ///
    /// Each segment is percent-encoded as exactly one path segment, so an
    /// instance id can never address a different resource.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        if let Some(bad) = segments.iter().find(|s| matches!(**s, "" | "." | "..")) {
            anyhow::bail!("Invalid path segment '{}'", bad);
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Cloud API URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse response")
    }
}

async fn check_status(response: Response) -> Result<Response> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("API error ({}): {}", status, body);
    }
    Ok(response)
}

#[async_trait]
impl InstanceInventory for CloudApiClient {
    async fn list_candidates(&self) -> Result<Vec<InstanceDescriptor>> {
        let list: InstanceList = self.get(self.endpoint(&["instances"])?).await?;
        let total = list.instances.len();
        let candidates = self.filter.apply(list.instances);

        info!(
            total = total,
            candidates = candidates.len(),
            "Listed candidate instances"
        );
        Ok(candidates)
    }
}

#[async_trait]
impl MetricGateway for CloudApiClient {
    async fn datapoints(
        &self,
        instance_id: &str,
        query: &UtilizationQuery,
    ) -> Result<Vec<Datapoint>> {
        let mut url = self.endpoint(&[
            "instances",
            instance_id,
            "metrics",
            query.metric_name.as_str(),
        ])?;
        url.query_pairs_mut()
            .append_pair("start", &query.start.to_rfc3339_opts(SecondsFormat::Secs, true))
            .append_pair("end", &query.end.to_rfc3339_opts(SecondsFormat::Secs, true))
            .append_pair("period", &query.period.as_secs().to_string())
            .append_pair("statistic", &query.statistic);

        let series: MetricSeries = self.get(url).await?;
        debug!(
            instance_id = %instance_id,
            datapoints = series.datapoints.len(),
            "Fetched metric series"
        );
        Ok(series.datapoints)
    }
}

#[async_trait]
impl ComputeControl for CloudApiClient {
    async fn stop_instance(&self, instance_id: &str) -> Result<()> {
        let url = self.endpoint(&["instances", instance_id, "stop"])?;
        let response = self
            .client
            .post(url)
            .send()
            .await
            .context("Failed to send stop request")?;
        check_status(response).await?;

        info!(instance_id = %instance_id, "Stop command accepted");
        Ok(())
    }
}
