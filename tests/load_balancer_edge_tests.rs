use steer::balancer::{HealthStatus, LoadBalancer};
use steer::config::Config;
use steer::error::SteerError;
use tokio_util::sync::CancellationToken;

/// Test load balancer edge cases and boundary conditions
mod load_balancer_edge_tests {
    use super::*;

    fn config_for(urls: &[&str], policy: &str) -> Config {
        let mut toml = String::from(
            "[server]\nbind = \"127.0.0.1:0\"\n\n",
        );
        for url in urls {
            toml.push_str(&format!("[[backends]]\nurl = \"{}\"\n\n", url));
        }
        toml.push_str(&format!(
            "[load_balancing]\npolicy = \"{}\"\n\n[health_check]\ninterval = 30\ntimeout = 5\n",
            policy
        ));
        Config::from_toml_str(&toml).unwrap()
    }

    /// Before the first probe completes every backend is UNKNOWN and
    /// selection reports the distinguished no-healthy-backend failure.
    #[tokio::test]
    async fn test_selection_fails_before_first_probe() {
        let config = config_for(&["http://localhost:8081", "http://localhost:8082"], "round_robin");
        let lb = LoadBalancer::new(&config, &CancellationToken::new());

        for backend in lb.pool().all() {
            assert_eq!(backend.status(), HealthStatus::Unknown);
        }
        assert!(lb.healthy_set().is_empty());

        let result = lb.select();
        assert!(matches!(result, Err(SteerError::NoHealthyBackend)));
    }

    /// A single healthy backend is returned by every policy.
    #[tokio::test]
    async fn test_single_backend_all_policies() {
        for policy in ["round_robin", "weighted_round_robin", "random"] {
            let config = config_for(&["http://localhost:8000"], policy);
            let lb = LoadBalancer::new(&config, &CancellationToken::new());

            lb.pool().all()[0].set_status(HealthStatus::Healthy);
            lb.pool().rebuild_healthy();

            for _ in 0..5 {
                let selection = lb.select().unwrap();
                assert_eq!(selection.backend.url(), "http://localhost:8000");
                assert_eq!(selection.index, 0);
            }
        }
    }

    /// Backends that turn unhealthy disappear from selection; the pool
    /// itself never shrinks.
    #[tokio::test]
    async fn test_unhealthy_backend_excluded_from_selection() {
        let config = config_for(
            &[
                "http://localhost:8081",
                "http://localhost:8082",
                "http://localhost:8083",
            ],
            "round_robin",
        );
        let lb = LoadBalancer::new(&config, &CancellationToken::new());

        for backend in lb.pool().all() {
            backend.set_status(HealthStatus::Healthy);
        }
        lb.pool().rebuild_healthy();
        assert_eq!(lb.healthy_set().len(), 3);

        lb.pool().all()[1].set_status(HealthStatus::Unhealthy);
        lb.pool().rebuild_healthy();
        assert_eq!(lb.healthy_set().len(), 2);
        assert_eq!(lb.pool().len(), 3);

        for _ in 0..20 {
            let selection = lb.select().unwrap();
            assert_ne!(selection.backend.url(), "http://localhost:8082");
        }
    }

    /// Stats snapshots carry the shutdown report fields.
    #[tokio::test]
    async fn test_stats_report_shape() {
        let config = config_for(&["http://localhost:8081"], "round_robin");
        let lb = LoadBalancer::new(&config, &CancellationToken::new());

        lb.pool().all()[0].set_status(HealthStatus::Healthy);
        lb.pool().all()[0].record_success();

        let stats = lb.stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].name, "backend-1");
        assert_eq!(stats[0].url, "http://localhost:8081");
        assert_eq!(stats[0].total_requests, 1);
        assert_eq!(stats[0].status, HealthStatus::Healthy);
    }

    /// Validation rejects the boundary configurations the loader must catch.
    #[test]
    fn test_config_boundaries() {
        // Empty pool
        let result = Config::from_toml_str(
            r#"
[server]
bind = "127.0.0.1:0"

backends = []

[load_balancing]
policy = "round_robin"

[health_check]
interval = 30
timeout = 5
"#,
        );
        assert!(result.is_err());

        // Weight below 1
        let result = Config::from_toml_str(
            r#"
[server]
bind = "127.0.0.1:0"

[[backends]]
url = "http://localhost:8081"
weight = 0

[load_balancing]
policy = "weighted_round_robin"

[health_check]
interval = 30
timeout = 5
"#,
        );
        assert!(result.is_err());
    }

    /// A zero retry budget still permits the single initial attempt.
    #[test]
    fn test_zero_retry_budget() {
        let config = Config::from_toml_str(
            r#"
[server]
bind = "127.0.0.1:0"

[[backends]]
url = "http://localhost:8081"

[load_balancing]
policy = "round_robin"

[health_check]
interval = 30
timeout = 5

[retry]
budget = 0
"#,
        )
        .unwrap();

        assert_eq!(config.retry.budget, 0);
        assert_eq!(config.retry.to_policy().max_attempts(), 1);
    }
}
