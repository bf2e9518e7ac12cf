//! In-process collaborators shared by the integration tests

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use optimizer_lib::store::InMemoryAuditStore;
use optimizer_lib::{
    ActionExecutor, ComputeControl, Datapoint, InstanceDescriptor, InstanceInventory,
    InstanceState, MetricGateway, Notification, Notifier, Optimizer, OptimizerConfig,
    RunCoordinator, StructuredLogger, UtilizationQuery,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub const TIMEZONE: &str = "America/New_York";

pub fn config(dry_run: bool) -> OptimizerConfig {
    OptimizerConfig::from_vars([
        ("TIMEZONE", TIMEZONE),
        ("TABLE_NAME", "optimizer-audit"),
        ("NOTIFICATION_TARGET", "http://alerts.local/hook"),
        ("CPU_THRESHOLD", "5"),
        ("DRY_RUN", if dry_run { "true" } else { "false" }),
    ])
    .expect("test configuration is valid")
}

/// `hour:minute` on 2024-03-05 in the test zone, as UTC
pub fn local_time(hour: u32, minute: u32) -> DateTime<Utc> {
    chrono_tz::America::New_York
        .with_ymd_and_hms(2024, 3, 5, hour, minute, 0)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn candidate(instance_id: &str) -> InstanceDescriptor {
    InstanceDescriptor::new(instance_id, InstanceState::Running)
        .with_tag("AutoStop", "Yes")
        .with_tag("Environment", "Dev")
        .with_tag("Critical", "No")
}

#[derive(Default)]
pub struct FakeGateway {
    series: Mutex<HashMap<String, Vec<Datapoint>>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeGateway {
    pub fn with_cpu(self, instance_id: &str, average: f64, at: DateTime<Utc>) -> Self {
        self.series
            .lock()
            .unwrap()
            .entry(instance_id.to_string())
            .or_default()
            .push(Datapoint {
                timestamp: at - chrono::Duration::minutes(5),
                average,
            });
        self
    }

    pub fn failing_for(self, instance_id: &str) -> Self {
        self.failing.lock().unwrap().insert(instance_id.to_string());
        self
    }
}

#[async_trait]
impl MetricGateway for FakeGateway {
    async fn datapoints(&self, instance_id: &str, _: &UtilizationQuery) -> Result<Vec<Datapoint>> {
        if self.failing.lock().unwrap().contains(instance_id) {
            anyhow::bail!("metrics endpoint timed out");
        }
        Ok(self
            .series
            .lock()
            .unwrap()
            .get(instance_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeCompute {
    pub stopped: Mutex<Vec<String>>,
    failing: HashSet<String>,
}

impl FakeCompute {
    pub fn failing_for(mut self, instance_id: &str) -> Self {
        self.failing.insert(instance_id.to_string());
        self
    }

    pub fn stopped(&self) -> Vec<String> {
        let mut ids = self.stopped.lock().unwrap().clone();
        ids.sort();
        ids
    }
}

#[async_trait]
impl ComputeControl for FakeCompute {
    async fn stop_instance(&self, instance_id: &str) -> Result<()> {
        if self.failing.contains(instance_id) {
            anyhow::bail!("IncorrectInstanceState");
        }
        self.stopped.lock().unwrap().push(instance_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
    failing: HashSet<String>,
}

impl RecordingNotifier {
    pub fn failing_for(mut self, instance_id: &str) -> Self {
        self.failing.insert(instance_id.to_string());
        self
    }

    pub fn messages(&self) -> Vec<String> {
        let mut messages: Vec<_> = self
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.message.clone())
            .collect();
        messages.sort();
        messages
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        if self.failing.contains(&notification.instance_id) {
            anyhow::bail!("publish rejected");
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

pub struct FakeInventory {
    pub candidates: Option<Vec<InstanceDescriptor>>,
}

#[async_trait]
impl InstanceInventory for FakeInventory {
    async fn list_candidates(&self) -> Result<Vec<InstanceDescriptor>> {
        match &self.candidates {
            Some(candidates) => Ok(candidates.clone()),
            None => anyhow::bail!("describe call throttled"),
        }
    }
}

/// A coordinator wired to fakes, with handles kept for assertions
pub struct Fixture {
    pub compute: Arc<FakeCompute>,
    pub audit: Arc<InMemoryAuditStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub coordinator: RunCoordinator,
}

pub fn fixture(
    config: OptimizerConfig,
    gateway: FakeGateway,
    compute: FakeCompute,
    notifier: RecordingNotifier,
) -> Fixture {
    let compute = Arc::new(compute);
    let audit = Arc::new(InMemoryAuditStore::new());
    let notifier = Arc::new(notifier);
    let logger = StructuredLogger::new(config.table_name.clone());

    let executor = ActionExecutor::new(
        compute.clone(),
        audit.clone(),
        notifier.clone(),
        config.evaluation.timezone,
        logger.clone(),
    );
    let coordinator = RunCoordinator::new(config, Arc::new(gateway), executor, logger);

    Fixture {
        compute,
        audit,
        notifier,
        coordinator,
    }
}

impl Fixture {
    /// Wrap the coordinator in an invocation entry point
    pub fn into_optimizer(
        self,
        inventory: FakeInventory,
    ) -> (Optimizer, Arc<InMemoryAuditStore>, Arc<RecordingNotifier>) {
        (
            Optimizer::new(Arc::new(inventory), self.coordinator),
            self.audit,
            self.notifier,
        )
    }
}
