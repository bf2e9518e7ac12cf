//! Candidate inventory and the tag/state safety filter

use crate::models::{InstanceDescriptor, InstanceState};
use anyhow::Result;
use async_trait::async_trait;

/// Tag/state predicate every candidate must satisfy before evaluation
///
/// The evaluator never sees an instance this filter rejects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFilter {
    pub auto_stop_tag: (String, String),
    pub environment_tag: String,
    pub allowed_environments: Vec<String>,
    pub critical_tag: (String, String),
}

impl Default for CandidateFilter {
    fn default() -> Self {
        Self {
            auto_stop_tag: ("AutoStop".to_string(), "Yes".to_string()),
            environment_tag: "Environment".to_string(),
            allowed_environments: vec!["Dev".to_string(), "Test".to_string()],
            critical_tag: ("Critical".to_string(), "No".to_string()),
        }
    }
}

impl CandidateFilter {
    pub fn matches(&self, descriptor: &InstanceDescriptor) -> bool {
        let (auto_key, auto_value) = &self.auto_stop_tag;
        let (critical_key, critical_value) = &self.critical_tag;

        descriptor.state == InstanceState::Running
            && descriptor.tag(auto_key) == Some(auto_value.as_str())
            && descriptor.tag(critical_key) == Some(critical_value.as_str())
            && descriptor
                .tag(&self.environment_tag)
                .is_some_and(|env| self.allowed_environments.iter().any(|a| a == env))
    }

    /// Keep only descriptors that pass the filter
    pub fn apply(&self, descriptors: Vec<InstanceDescriptor>) -> Vec<InstanceDescriptor> {
        descriptors.into_iter().filter(|d| self.matches(d)).collect()
    }
}

/// Source of candidate instances
///
/// Implementations return only descriptors that satisfy a [`CandidateFilter`].
#[async_trait]
pub trait InstanceInventory: Send + Sync {
    async fn list_candidates(&self) -> Result<Vec<InstanceDescriptor>>;
}
