//! Eligibility evaluation
//!
//! Maps an instance, the current time and its recent utilization to a
//! [`Verdict`]. Rules are ordered and the first match wins:
//!
//! 1. Outside business hours (`hour >= end` or `hour < start`, in the
//!    configured zone) the instance is stopped for `AfterHours`. CPU is not
//!    consulted.
//! 2. Otherwise a utilization sample strictly below the threshold stops it
//!    for `LowCpu`.
//! 3. Otherwise it keeps running. A missing sample never stops an instance.
//!
//! Tag and state eligibility is enforced upstream by
//! [`CandidateFilter`](crate::inventory::CandidateFilter).

use crate::config::EvaluationConfig;
use crate::models::{InstanceDescriptor, StopReason, UtilizationSample, Verdict};
use chrono::{DateTime, Timelike, Utc};

/// Decide whether a candidate instance should be stopped
pub fn evaluate(
    _descriptor: &InstanceDescriptor,
    now: DateTime<Utc>,
    sample: Option<&UtilizationSample>,
    config: &EvaluationConfig,
) -> Verdict {
    let hour = now.with_timezone(&config.timezone).hour();

    if is_after_hours(hour, config) {
        return Verdict::stop(StopReason::AfterHours);
    }

    match sample {
        Some(sample) if sample.average_percent < config.cpu_threshold => {
            Verdict::stop(StopReason::LowCpu(sample.average_percent))
        }
        _ => Verdict::keep(),
    }
}

/// Start hour is inside business hours, end hour is not
pub fn is_after_hours(hour: u32, config: &EvaluationConfig) -> bool {
    hour >= config.business_end_hour || hour < config.business_start_hour
}
