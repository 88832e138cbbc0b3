use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retry::{DelayStrategy, RetryPolicy};

/// Forwarding retry configuration
///
/// A request is attempted once plus up to `budget` retries; the delay
/// before retry `k` is derived from `strategy` and `base_delay_ms`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Maximum number of additional attempts after the initial one
    #[serde(default = "default_budget")]
    pub budget: u32,
    /// Backoff strategy
    #[serde(default)]
    pub strategy: DelayStrategy,
    /// Base delay between retries in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound on a single retry delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Add random jitter (±25%) to delays
    #[serde(default)]
    pub jitter: bool,
}

fn default_budget() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            budget: default_budget(),
            strategy: DelayStrategy::default(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Validate retry configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.base_delay_ms == 0 {
            return Err(anyhow::anyhow!("Retry base_delay_ms must be greater than 0"));
        }

        if self.max_delay_ms < self.base_delay_ms {
            return Err(anyhow::anyhow!(
                "Retry max_delay_ms ({}) must not be less than base_delay_ms ({})",
                self.max_delay_ms,
                self.base_delay_ms
            ));
        }

        Ok(())
    }

    /// Build the runtime retry policy from this configuration
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            budget: self.budget,
            strategy: self.strategy,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.budget, 3);
        assert_eq!(config.base_delay_ms, 100);
        assert!(!config.jitter);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let zero_base = RetryConfig {
            base_delay_ms: 0,
            ..Default::default()
        };
        assert!(zero_base.validate().is_err());

        let inverted = RetryConfig {
            base_delay_ms: 1_000,
            max_delay_ms: 100,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_to_policy() {
        let config = RetryConfig {
            budget: 2,
            base_delay_ms: 10,
            ..Default::default()
        };
        let policy = config.to_policy();
        assert_eq!(policy.budget, 2);
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
    }

    #[test]
    fn test_parse_strategy() {
        let parsed: RetryConfig = toml::from_str(
            r#"
budget = 1
strategy = "exponential"
base_delay_ms = 50
"#,
        )
        .unwrap();
        assert_eq!(parsed.budget, 1);
        assert!(matches!(parsed.strategy, DelayStrategy::Exponential));
    }
}
