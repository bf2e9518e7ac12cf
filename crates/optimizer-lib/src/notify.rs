//! Stop notifications
//!
//! Handles:
//! - Building the notification text, marking dry-run stops as simulated
//! - Formatting notifications as Alertmanager webhook alerts
//! - Publishing them to the configured target

use crate::models::StopReason;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Subject shared by every stop notification
pub const ALERT_SUBJECT: &str = "Instance Optimization Alert";

/// Marker appended to the message of a dry-run stop
pub const SIMULATED_MARKER: &str = " (simulated)";

/// A single stop notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub message: String,
    pub instance_id: String,
    pub reason: StopReason,
    pub dry_run: bool,
}

impl Notification {
    /// `Stopped <id> due to <reason>`, with a simulation marker under dry run
    pub fn for_stop(instance_id: &str, reason: &StopReason, dry_run: bool) -> Self {
        let mut message = format!("Stopped {} due to {}", instance_id, reason);
        if dry_run {
            message.push_str(SIMULATED_MARKER);
        }

        Self {
            subject: ALERT_SUBJECT.to_string(),
            message,
            instance_id: instance_id.to_string(),
            reason: *reason,
            dry_run,
        }
    }
}

/// Pub/sub transport for notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, notification: &Notification) -> Result<()>;
}

/// Alertmanager webhook alert format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerAlert {
    pub status: String,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    /// Start time in RFC3339 format
    pub starts_at: String,
}

/// Alertmanager webhook payload (array of alerts)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertmanagerPayload {
    pub alerts: Vec<AlertmanagerAlert>,
}

impl AlertmanagerAlert {
    pub fn from_notification(notification: &Notification, at: DateTime<Utc>) -> Self {
        let reason_label = match notification.reason {
            StopReason::AfterHours => "after_hours",
            StopReason::LowCpu(_) => "low_cpu",
        };

        let mut labels = HashMap::new();
        labels.insert("alertname".to_string(), "InstanceStopped".to_string());
        labels.insert("severity".to_string(), "info".to_string());
        labels.insert("instance_id".to_string(), notification.instance_id.clone());
        labels.insert("reason".to_string(), reason_label.to_string());
        labels.insert(
            "mode".to_string(),
            if notification.dry_run { "simulated" } else { "real" }.to_string(),
        );

        let mut annotations = HashMap::new();
        annotations.insert("summary".to_string(), notification.subject.clone());
        annotations.insert("description".to_string(), notification.message.clone());

        Self {
            status: "firing".to_string(),
            labels,
            annotations,
            starts_at: at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Publishes notifications to an Alertmanager-compatible webhook
pub struct WebhookNotifier {
    client: Client,
    target: Url,
}

impl WebhookNotifier {
    pub fn new(target: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        let target = Url::parse(target).context("Invalid notification target URL")?;
        if !matches!(target.scheme(), "http" | "https") {
            anyhow::bail!("Notification target must be an http(s) URL, got {}", target);
        }

        Ok(Self { client, target })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        let payload = AlertmanagerPayload {
            alerts: vec![AlertmanagerAlert::from_notification(notification, Utc::now())],
        };

        let response = self
            .client
            .post(self.target.clone())
            .json(&payload)
            .send()
            .await
            .context("Failed to send notification")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Notification target error ({}): {}", status, body);
        }

        Ok(())
    }
}
