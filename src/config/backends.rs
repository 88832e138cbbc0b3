use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Individual backend server
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Base URL for forwarding and health checks
    pub url: String,
    /// Backend identifier; defaults to its position in the pool
    pub name: Option<String>,
    /// Relative weight for weighted policies (default: 1)
    pub weight: Option<u32>,
}

/// Load balancing configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LoadBalancingConfig {
    pub policy: LoadBalancingType,
}

/// Load balancing algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingType {
    #[default]
    RoundRobin,
    WeightedRoundRobin,
    Random,
}

/// Health check configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthCheckConfig {
    /// Seconds between periodic probe cycles
    pub interval: u64,
    /// Per-probe deadline in seconds
    pub timeout: u64,
    /// Path probed on each backend, joined onto its base URL
    #[serde(default = "default_health_path")]
    pub path: String,
}

fn default_health_path() -> String {
    "/".to_string()
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: 30,
            timeout: 5,
            path: default_health_path(),
        }
    }
}

impl BackendConfig {
    /// Validate backend configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.url.is_empty() {
            return Err(anyhow::anyhow!("Backend url cannot be empty"));
        }

        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "Backend url must be a valid HTTP/HTTPS URL: {}",
                self.url
            ));
        }

        if let Some(name) = &self.name {
            if name.is_empty() {
                return Err(anyhow::anyhow!("Backend name cannot be empty"));
            }
        }

        if let Some(weight) = self.weight {
            if weight == 0 {
                return Err(anyhow::anyhow!(
                    "Backend weight must be at least 1: {}",
                    self.url
                ));
            }
        }

        Ok(())
    }

    /// Get the weight for this backend (default: 1)
    pub fn get_weight(&self) -> u32 {
        self.weight.unwrap_or(1)
    }
}

impl HealthCheckConfig {
    /// Validate health check configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.interval == 0 {
            return Err(anyhow::anyhow!(
                "Health check interval must be greater than 0"
            ));
        }

        if self.timeout == 0 {
            return Err(anyhow::anyhow!(
                "Health check timeout must be greater than 0"
            ));
        }

        if self.timeout >= self.interval {
            return Err(anyhow::anyhow!(
                "Health check timeout ({}) must be less than interval ({})",
                self.timeout,
                self.interval
            ));
        }

        Ok(())
    }

    /// Get the interval as Duration
    pub fn get_interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// Get the timeout as Duration
    pub fn get_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}
