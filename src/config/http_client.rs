use serde::{Deserialize, Serialize};

/// Upstream HTTP client pool configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct HttpClientConfig {
    /// Request-level timeout for upstream calls in seconds (default: 5)
    pub request_timeout_secs: Option<u64>,
    /// How long an idle pooled connection is kept in seconds (default: 90)
    pub pool_idle_timeout_secs: Option<u64>,
    /// Maximum idle pooled connections per backend host (default: 32)
    pub pool_max_idle_per_host: Option<usize>,
}

impl HttpClientConfig {
    /// Validate HTTP client configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(secs) = self.request_timeout_secs {
            if secs == 0 {
                return Err(anyhow::anyhow!(
                    "http_client request_timeout_secs must be greater than 0"
                ));
            }
        }

        if let Some(secs) = self.pool_idle_timeout_secs {
            if secs == 0 {
                return Err(anyhow::anyhow!(
                    "http_client pool_idle_timeout_secs must be greater than 0"
                ));
            }
        }

        Ok(())
    }
}
