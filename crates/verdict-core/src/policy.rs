//! Execution policy resolution

use crate::config::RulesetConfig;
use crate::{Error, Result};
use std::time::Duration;
use tracing::debug;

/// Budget for a full batch when the policy does not set one
pub const DEFAULT_MAX_EXECUTION_TIME: Duration = Duration::from_secs(5);

/// The effective execution policy of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Stop AND rulesets at the first failing member
    pub stop_on_failure: bool,
    /// Deadline for evaluating every ruleset
    pub max_execution_time: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            stop_on_failure: true,
            max_execution_time: DEFAULT_MAX_EXECUTION_TIME,
        }
    }
}

impl RulesetConfig {
    /// Resolve the active execution policy named by `error_handling.execution_policy`.
    ///
    /// The named policy must exist. Its `stop_on_failure` always applies;
    /// an empty `max_execution_time` keeps the default budget.
    pub fn execution_policy(&self) -> Result<Policy> {
        let name = &self.error_handling.execution_policy;
        let configured = self
            .execution_policies
            .get(name)
            .ok_or_else(|| Error::PolicyNotFound(name.clone()))?;

        let mut policy = Policy {
            stop_on_failure: configured.stop_on_failure,
            ..Policy::default()
        };

        let text = configured.max_execution_time.trim();
        if !text.is_empty() {
            policy.max_execution_time =
                humantime::parse_duration(text).map_err(|source| Error::InvalidDuration {
                    policy: name.clone(),
                    value: text.to_string(),
                    source,
                })?;
        }

        debug!(
            policy = %name,
            stop_on_failure = policy.stop_on_failure,
            max_execution_time = ?policy.max_execution_time,
            "resolved execution policy"
        );
        Ok(policy)
    }
}
