//! Error taxonomy for an optimization run
//!
//! Only [`ConfigError`] aborts a whole run. Every [`OptimizerError`] is
//! scoped to a single instance and ends up in the run summary.

use thiserror::Error;

/// Invalid or missing configuration, detected before any instance is processed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },

    #[error("failed to read configuration: {0}")]
    Source(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Source(e.to_string())
    }
}

/// Instance-scoped failures
#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("utilization unavailable for {instance_id}: {message}")]
    MetricUnavailable {
        instance_id: String,
        message: String,
    },

    #[error("stop command failed for {instance_id}: {message}")]
    StopAction {
        instance_id: String,
        message: String,
    },

    #[error("audit write failed for {instance_id}: {message}")]
    Persistence {
        instance_id: String,
        message: String,
    },

    #[error("notification failed for {instance_id}: {message}")]
    Notification {
        instance_id: String,
        message: String,
    },

    #[error("candidate inventory unavailable: {0}")]
    Inventory(String),
}

pub type OptimizerResult<T> = Result<T, OptimizerError>;
