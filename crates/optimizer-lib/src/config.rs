//! Optimizer configuration
//!
//! Every recognized option is read once from the environment, validated,
//! and turned into a typed [`OptimizerConfig`]. Anything missing or
//! malformed is a [`ConfigError`]; only `DRY_RUN`, `CPU_THRESHOLD` and the
//! tuning knobs have defaults.

use crate::error::ConfigError;
use chrono_tz::Tz;
use serde::Deserialize;
use std::time::Duration;

/// Default CPU threshold in percent
pub const DEFAULT_CPU_THRESHOLD: f64 = 5.0;

/// Default start of business hours (inclusive)
pub const DEFAULT_BUSINESS_START_HOUR: u32 = 8;

/// Default end of business hours (exclusive)
pub const DEFAULT_BUSINESS_END_HOUR: u32 = 20;

/// Default trailing window for utilization lookups
pub const DEFAULT_METRIC_WINDOW_MINUTES: u64 = 30;

/// Longest accepted utilization window (366 days)
pub const MAX_METRIC_WINDOW_MINUTES: u64 = 366 * 24 * 60;

/// Default datapoint period (5 minutes)
pub const DEFAULT_METRIC_PERIOD_SECS: u64 = 300;

/// Default number of instances processed in parallel
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Options consumed by the eligibility evaluator
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationConfig {
    pub cpu_threshold: f64,
    pub business_start_hour: u32,
    pub business_end_hour: u32,
    pub timezone: Tz,
}

/// Validated optimizer configuration
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    pub dry_run: bool,
    pub evaluation: EvaluationConfig,
    pub table_name: String,
    pub notification_target: String,
    pub metric_window: Duration,
    pub metric_period: Duration,
    pub max_concurrency: usize,
}

/// Raw environment values before validation
///
/// Keys arrive lowercased from [`config::Environment`].
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    dry_run: Option<String>,
    cpu_threshold: Option<String>,
    timezone: Option<String>,
    table_name: Option<String>,
    notification_target: Option<String>,
    sns_topic_arn: Option<String>,
    business_start_hour: Option<String>,
    business_end_hour: Option<String>,
    metric_window_minutes: Option<String>,
    metric_period_seconds: Option<String>,
    max_concurrency: Option<String>,
}

impl OptimizerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_environment(config::Environment::default())
    }

    /// Load configuration from an explicit set of variables
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let source: config::Map<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::from_environment(config::Environment::default().source(Some(source)))
    }

    fn from_environment(env: config::Environment) -> Result<Self, ConfigError> {
        let raw: RawConfig = config::Config::builder()
            .add_source(env)
            .build()?
            .try_deserialize()?;
        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> Result<Self, ConfigError> {
        let dry_run = match non_empty(raw.dry_run) {
            Some(value) => parse_bool("DRY_RUN", &value)?,
            None => false,
        };

        let cpu_threshold = match non_empty(raw.cpu_threshold) {
            Some(value) => parse_percent("CPU_THRESHOLD", &value)?,
            None => DEFAULT_CPU_THRESHOLD,
        };

        let timezone_name = non_empty(raw.timezone).ok_or(ConfigError::Missing("TIMEZONE"))?;
        let timezone: Tz = timezone_name.parse().map_err(|_| ConfigError::Invalid {
            name: "TIMEZONE",
            message: format!("unknown IANA zone '{}'", timezone_name),
        })?;

        let table_name = non_empty(raw.table_name).ok_or(ConfigError::Missing("TABLE_NAME"))?;
        let notification_target = non_empty(raw.notification_target)
            .or_else(|| non_empty(raw.sns_topic_arn))
            .ok_or(ConfigError::Missing("NOTIFICATION_TARGET"))?;

        let business_start_hour = parse_or(
            "BUSINESS_START_HOUR",
            raw.business_start_hour,
            DEFAULT_BUSINESS_START_HOUR,
        )?;
        let business_end_hour = parse_or(
            "BUSINESS_END_HOUR",
            raw.business_end_hour,
            DEFAULT_BUSINESS_END_HOUR,
        )?;
        if business_end_hour > 24 {
            return Err(ConfigError::Invalid {
                name: "BUSINESS_END_HOUR",
                message: format!("{} is not an hour of the day", business_end_hour),
            });
        }
        if business_start_hour >= business_end_hour {
            return Err(ConfigError::Invalid {
                name: "BUSINESS_START_HOUR",
                message: format!(
                    "start hour {} must be before end hour {}",
                    business_start_hour, business_end_hour
                ),
            });
        }

        let window_minutes: u64 = parse_or(
            "METRIC_WINDOW_MINUTES",
            raw.metric_window_minutes,
            DEFAULT_METRIC_WINDOW_MINUTES,
        )?;
        let period_secs: u64 = parse_or(
            "METRIC_PERIOD_SECONDS",
            raw.metric_period_seconds,
            DEFAULT_METRIC_PERIOD_SECS,
        )?;
        let max_concurrency: usize =
            parse_or("MAX_CONCURRENCY", raw.max_concurrency, DEFAULT_MAX_CONCURRENCY)?;

        for (name, value) in [
            ("METRIC_WINDOW_MINUTES", window_minutes),
            ("METRIC_PERIOD_SECONDS", period_secs),
            ("MAX_CONCURRENCY", max_concurrency as u64),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    name,
                    message: "must be greater than zero".to_string(),
                });
            }
        }

        let metric_window = window_minutes
            .checked_mul(60)
            .filter(|_| window_minutes <= MAX_METRIC_WINDOW_MINUTES)
            .map(Duration::from_secs)
            .ok_or_else(|| ConfigError::Invalid {
                name: "METRIC_WINDOW_MINUTES",
                message: format!(
                    "{} exceeds the maximum of {} minutes",
                    window_minutes, MAX_METRIC_WINDOW_MINUTES
                ),
            })?;

        Ok(Self {
            dry_run,
            evaluation: EvaluationConfig {
                cpu_threshold,
                business_start_hour,
                business_end_hour,
                timezone,
            },
            table_name,
            notification_target,
            metric_window,
            metric_period: Duration::from_secs(period_secs),
            max_concurrency,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        other => Err(ConfigError::Invalid {
            name,
            message: format!("'{}' is not a boolean", other),
        }),
    }
}

fn parse_percent(name: &'static str, value: &str) -> Result<f64, ConfigError> {
    let parsed: f64 = value.parse().map_err(|_| ConfigError::Invalid {
        name,
        message: format!("'{}' is not a number", value),
    })?;
    if !parsed.is_finite() || !(0.0..=100.0).contains(&parsed) {
        return Err(ConfigError::Invalid {
            name,
            message: format!("{} is outside 0-100", parsed),
        });
    }
    Ok(parsed)
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match non_empty(value) {
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
            name,
            message: format!("'{}' is not a valid value", v),
        }),
        None => Ok(default),
    }
}
