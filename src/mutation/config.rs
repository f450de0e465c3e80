//! Mutation run configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected configuration values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The timeout factor must be finite and positive.
    #[error("timeout factor must be a finite positive number, got {0}")]
    TimeoutFactor(f64),
}

/// Configuration for a mutation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MutationConfig {
    /// Mutant deadline as a multiple of the baseline duration.
    pub timeout_factor: f64,
    /// Deadline floor, used when the baseline is not longer than it.
    pub min_timeout: Duration,
    /// How long a cancelled execution unit may take to stop before it is detached.
    pub kill_grace: Duration,
    /// Suppress program output while variants initialise and tests run.
    pub suppress_output: bool,
    /// Run only this test in suites that carry no filter of their own.
    pub test_filter: Option<String>,
    /// Optional JSON-lines event log.
    pub events_path: Option<PathBuf>,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            timeout_factor: 5.0,
            min_timeout: Duration::from_secs(1),
            kill_grace: Duration::from_secs(2),
            suppress_output: false,
            test_filter: None,
            events_path: None,
        }
    }
}

impl MutationConfig {
    /// Set the timeout factor.
    pub fn with_timeout_factor(mut self, timeout_factor: f64) -> Self {
        self.timeout_factor = timeout_factor;
        self
    }

    /// Set the deadline floor.
    pub fn with_min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    /// Set the cancellation grace period.
    pub fn with_kill_grace(mut self, kill_grace: Duration) -> Self {
        self.kill_grace = kill_grace;
        self
    }

    /// Enable or disable output suppression.
    pub fn with_suppress_output(mut self, suppress_output: bool) -> Self {
        self.suppress_output = suppress_output;
        self
    }

    /// Set the default narrowing filter.
    pub fn with_test_filter(mut self, test_filter: impl Into<String>) -> Self {
        self.test_filter = Some(test_filter.into());
        self
    }

    /// Set the event log path.
    pub fn with_events_path(mut self, events_path: impl Into<PathBuf>) -> Self {
        self.events_path = Some(events_path.into());
        self
    }

    /// Check values the builders accept but a run cannot use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.timeout_factor.is_finite() || self.timeout_factor <= 0.0 {
            return Err(ConfigError::TimeoutFactor(self.timeout_factor));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_builder_overrides_work() {
        let default = MutationConfig::default();
        assert_eq!(default.timeout_factor, 5.0);
        assert_eq!(default.min_timeout, Duration::from_secs(1));
        assert!(!default.suppress_output);

        let cfg = MutationConfig::default()
            .with_timeout_factor(3.0)
            .with_min_timeout(Duration::from_millis(250))
            .with_kill_grace(Duration::from_millis(100))
            .with_suppress_output(true)
            .with_test_filter("test_add")
            .with_events_path("/tmp/events.jsonl");

        assert_eq!(cfg.timeout_factor, 3.0);
        assert_eq!(cfg.min_timeout, Duration::from_millis(250));
        assert_eq!(cfg.kill_grace, Duration::from_millis(100));
        assert!(cfg.suppress_output);
        assert_eq!(cfg.test_filter.as_deref(), Some("test_add"));
        assert_eq!(cfg.events_path, Some(PathBuf::from("/tmp/events.jsonl")));
    }

    #[test]
    fn validate_rejects_unusable_timeout_factors() {
        assert_eq!(MutationConfig::default().validate(), Ok(()));
        for factor in [0.0, -1.0, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(
                MutationConfig::default().with_timeout_factor(factor).validate(),
                Err(ConfigError::TimeoutFactor(factor))
            );
        }
        assert!(
            MutationConfig::default()
                .with_timeout_factor(f64::NAN)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = MutationConfig::default().with_test_filter("t");
        let json = serde_json::to_string(&cfg).expect("config should serialize");
        let back: MutationConfig = serde_json::from_str(&json).expect("config should parse");
        assert_eq!(back, cfg);
    }
}
