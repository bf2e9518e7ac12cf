//! Core library for the instance optimizer
//!
//! This crate provides:
//! - Configuration loading and validation
//! - The eligibility evaluator (after-hours and low-CPU rules)
//! - The action executor (stop, audit record, notification)
//! - The run coordinator and invocation entry point
//! - Collaborator interfaces with HTTP and file-backed adapters
//! - Health checks and observability

pub mod cloud;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod health;
pub mod inventory;
pub mod models;
pub mod notify;
pub mod observability;
pub mod store;
pub mod utilization;

pub use config::{EvaluationConfig, OptimizerConfig};
pub use coordinator::{configuration_failure, Optimizer, RunCoordinator};
pub use error::{ConfigError, OptimizerError};
pub use evaluator::evaluate;
pub use executor::{ActionExecutor, ComputeControl};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use inventory::{CandidateFilter, InstanceInventory};
pub use models::*;
pub use notify::{Notification, Notifier};
pub use observability::{OptimizerMetrics, StructuredLogger};
pub use store::AuditStore;
pub use utilization::{Datapoint, MetricGateway, UtilizationQuery, UtilizationSampler};
