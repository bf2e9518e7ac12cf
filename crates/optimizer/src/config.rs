//! Service configuration
//!
//! Adapter endpoints and process settings. Decision options live in
//! [`optimizer_lib::OptimizerConfig`].

use optimizer_lib::ConfigError;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Cloud control API base URL
    #[serde(default = "default_cloud_api_url")]
    pub cloud_api_url: String,

    /// Directory holding the audit table file
    #[serde(default = "default_audit_dir")]
    pub audit_dir: PathBuf,

    /// Port for the invoke/health/metrics server
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Timeout applied to every outbound call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_cloud_api_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_audit_dir() -> PathBuf {
    PathBuf::from("/var/lib/instance-optimizer")
}

fn default_api_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    10
}

impl ServiceConfig {
    /// Load from `OPTIMIZER_*` environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_environment(config::Environment::with_prefix("OPTIMIZER"))
    }

    fn from_environment(env: config::Environment) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(env.try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
