//! # 配置管理模块
//!
//! 本模块提供了Steer负载均衡器的完整配置管理功能，包括：
//!
//! - TOML配置文件解析和验证
//! - 环境变量替换和扩展
//! - 类型安全的配置结构定义
//!
//! ## 配置结构
//!
//! 主配置包含以下子模块：
//! - `server`: 服务器基础配置（入口监听地址）
//! - `backends`: 后端服务器列表、负载均衡算法和健康检查配置
//! - `retry`: 转发重试预算和退避策略配置
//! - `logging`: 日志级别配置
//! - `http_client`: 上游HTTP客户端连接池配置（可选）
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use steer::config::Config;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file_with_env("config.toml").await?;
//! println!("入口监听地址: {}", config.server.bind);
//! # Ok(())
//! # }
//! ```

pub mod backends; // 后端目标服务器配置模块
pub mod http_client; // HTTP客户端配置模块
pub mod logging; // 日志记录配置模块
pub mod retry; // 重试策略配置模块
pub mod server; // 服务器配置模块

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use tracing::{info, warn};

// Re-export all public types
pub use backends::{BackendConfig, HealthCheckConfig, LoadBalancingConfig, LoadBalancingType};
pub use http_client::HttpClientConfig;
pub use logging::LoggingConfig;
pub use retry::RetryConfig;
pub use server::ServerConfig;

/// Steer负载均衡器主配置结构
///
/// 包含所有子系统的配置选项，支持TOML格式序列化和反序列化。
/// 可选配置项允许按需启用功能模块。
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// 服务器基础配置（入口监听地址）
    pub server: ServerConfig,
    /// 后端目标服务器列表
    pub backends: Vec<BackendConfig>,
    /// 负载均衡算法配置
    pub load_balancing: LoadBalancingConfig,
    /// 健康检查配置
    pub health_check: HealthCheckConfig,
    /// 转发重试配置
    #[serde(default)]
    pub retry: RetryConfig,
    /// 日志记录配置
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 上游HTTP客户端连接池配置（可选）
    pub http_client: Option<HttpClientConfig>,
}

impl Config {
    /// Load configuration from file with environment variable expansion
    pub async fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;

        // Expand environment variables in the content
        let expanded_content = expand_env_vars(&content);

        let mut config: Config = toml::from_str(&expanded_content)?;

        // Post-process configuration
        config.apply_defaults();
        config.validate()?;

        info!("Configuration loaded from {:?}", path.as_ref());
        Ok(config)
    }

    /// Parse configuration from a TOML string (defaults applied, validated)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.apply_defaults();
        config.validate()?;
        Ok(config)
    }

    /// Apply default values where needed
    fn apply_defaults(&mut self) {
        // Generate stable names for anonymous backends; position is part of
        // the contract with round-robin policies, so names follow pool order.
        for (i, backend) in self.backends.iter_mut().enumerate() {
            if backend.name.is_none() {
                backend.name = Some(format!("backend-{}", i + 1));
            }
        }

        // The health check path must be absolute for URL joining
        if !self.health_check.path.starts_with('/') {
            self.health_check.path.insert(0, '/');
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            return Err(anyhow::anyhow!("At least one backend must be configured"));
        }

        for backend in &self.backends {
            backend.validate()?;
        }

        self.health_check.validate()?;
        self.retry.validate()?;

        if let Some(http_client) = &self.http_client {
            http_client.validate()?;
        }

        // Weighted policies need a meaningful weight on every backend
        if matches!(
            self.load_balancing.policy,
            LoadBalancingType::WeightedRoundRobin
        ) && self.backends.iter().all(|b| b.weight.is_none())
        {
            warn!("Weighted round robin selected but no backend declares a weight; all backends default to weight 1");
        }

        Ok(())
    }
}

/// Expand environment variables in configuration content
/// Supports ${VAR} and ${VAR:-default} syntax
fn expand_env_vars(content: &str) -> String {
    let mut expanded = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(open) = rest.find("${") {
        expanded.push_str(&rest[..open]);
        let tail = &rest[open + 2..];

        match tail.find('}') {
            Some(close) => {
                expanded.push_str(&resolve_env_expr(&tail[..close]));
                rest = &tail[close + 1..];
            }
            None => {
                // Unterminated expression, kept literally
                expanded.push_str(&rest[open..]);
                rest = "";
            }
        }
    }

    expanded.push_str(rest);
    expanded
}

/// Resolve a single `VAR` or `VAR:-default` expression.
fn resolve_env_expr(expr: &str) -> String {
    let (name, fallback) = match expr.split_once(":-") {
        Some((name, fallback)) => (name, Some(fallback)),
        None => (expr, None),
    };

    match env::var(name) {
        Ok(value) => value,
        Err(_) => match fallback {
            Some(fallback) => fallback.to_string(),
            None => {
                warn!("Environment variable '{}' is not set, substituting empty string", name);
                String::new()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASE_CONFIG: &str = r#"
[server]
bind = "127.0.0.1:8080"

[[backends]]
url = "http://localhost:8081"
weight = 2

[[backends]]
url = "http://localhost:8082"
name = "second"

[load_balancing]
policy = "round_robin"

[health_check]
interval = 30
timeout = 5
"#;

    /// Helper function to create a temporary config file
    fn create_temp_config_file(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[tokio::test]
    async fn test_basic_config_loading() {
        let temp_file = create_temp_config_file(BASE_CONFIG);
        let config = Config::from_file_with_env(temp_file.path()).await.unwrap();

        assert_eq!(config.server.bind.to_string(), "127.0.0.1:8080");
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[0].url, "http://localhost:8081");
        assert_eq!(config.backends[0].get_weight(), 2);
        assert_eq!(config.backends[1].get_weight(), 1);
    }

    #[tokio::test]
    async fn test_config_defaults() {
        let config = Config::from_toml_str(BASE_CONFIG).unwrap();

        // Anonymous backends get positional names
        assert_eq!(config.backends[0].name.as_deref(), Some("backend-1"));
        assert_eq!(config.backends[1].name.as_deref(), Some("second"));

        // Retry and health check defaults
        assert_eq!(config.retry.budget, 3);
        assert_eq!(config.health_check.path, "/");
    }

    #[tokio::test]
    async fn test_env_var_expansion() {
        env::set_var("STEER_TEST_HOST", "127.0.0.1");

        let config_content = r#"
[server]
bind = "${STEER_TEST_HOST:-localhost}:${STEER_TEST_PORT:-8080}"

[[backends]]
url = "http://${STEER_TEST_HOST}:3000"

[load_balancing]
policy = "random"

[health_check]
interval = 30
timeout = 5
"#;

        let temp_file = create_temp_config_file(config_content);
        let config = Config::from_file_with_env(temp_file.path()).await.unwrap();

        assert_eq!(config.server.bind.to_string(), "127.0.0.1:8080");
        assert_eq!(config.backends[0].url, "http://127.0.0.1:3000");

        env::remove_var("STEER_TEST_HOST");
    }

    #[test]
    fn test_expand_env_vars() {
        env::set_var("STEER_TEST_VAR", "test_value");

        let content = "host = \"${STEER_TEST_VAR}\"";
        let result = expand_env_vars(content);
        assert_eq!(result, "host = \"test_value\"");

        let content_with_default = "host = \"${MISSING_VAR:-default_value}\"";
        let result = expand_env_vars(content_with_default);
        assert_eq!(result, "host = \"default_value\"");

        env::remove_var("STEER_TEST_VAR");
    }

    #[test]
    fn test_empty_backends_rejected() {
        let config_content = r#"
[server]
bind = "127.0.0.1:8080"

backends = []

[load_balancing]
policy = "round_robin"

[health_check]
interval = 30
timeout = 5
"#;
        let result = Config::from_toml_str(config_content);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("At least one backend"));
    }

    #[test]
    fn test_invalid_backend_url_rejected() {
        let config_content = r#"
[server]
bind = "127.0.0.1:8080"

[[backends]]
url = "ftp://localhost:8081"

[load_balancing]
policy = "round_robin"

[health_check]
interval = 30
timeout = 5
"#;
        let result = Config::from_toml_str(config_content);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("url"));
    }

    #[test]
    fn test_health_check_timeout_must_be_below_interval() {
        let config_content = r#"
[server]
bind = "127.0.0.1:8080"

[[backends]]
url = "http://localhost:8081"

[load_balancing]
policy = "round_robin"

[health_check]
interval = 5
timeout = 5
"#;
        let result = Config::from_toml_str(config_content);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_weight_rejected() {
        let config_content = r#"
[server]
bind = "127.0.0.1:8080"

[[backends]]
url = "http://localhost:8081"
weight = 0

[load_balancing]
policy = "weighted_round_robin"

[health_check]
interval = 30
timeout = 5
"#;
        let result = Config::from_toml_str(config_content);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("weight"));
    }

    #[test]
    fn test_health_path_normalized() {
        let config_content = r#"
[server]
bind = "127.0.0.1:8080"

[[backends]]
url = "http://localhost:8081"

[load_balancing]
policy = "round_robin"

[health_check]
interval = 30
timeout = 5
path = "healthz"
"#;
        let config = Config::from_toml_str(config_content).unwrap();
        assert_eq!(config.health_check.path, "/healthz");
    }
}
