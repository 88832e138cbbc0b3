use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::backend::{BackendPool, BackendStats, HealthySet};
use super::health::HealthChecker;
use super::policy::{build_policy, Selection, SelectionPolicy};
use crate::config::Config;
use crate::error::SteerResult;

/// The load balancer core: pool, healthy set, selection policy and health
/// checker wired together
pub struct LoadBalancer {
    pool: Arc<BackendPool>,
    policy: Box<dyn SelectionPolicy>,
    checker: Arc<HealthChecker>,
}

impl LoadBalancer {
    /// Build the balancer from validated configuration. The health checker
    /// is created but not started; call `start()`.
    pub fn new(config: &Config, shutdown: &CancellationToken) -> Self {
        let pool = Arc::new(BackendPool::from_config(&config.backends, shutdown));
        let policy = build_policy(config.load_balancing.policy);
        let checker = HealthChecker::new(
            Arc::clone(&pool),
            config.health_check.clone(),
            shutdown,
        );

        info!(
            backends = pool.len(),
            policy = policy.name(),
            "Load balancer initialized"
        );

        Self {
            pool,
            policy,
            checker,
        }
    }

    /// Start periodic health checking, beginning with an eager first pass.
    pub async fn start(&self) {
        self.checker.start().await;
    }

    /// Select the next backend from the current healthy set.
    pub fn select(&self) -> SteerResult<Selection> {
        let healthy = self.pool.healthy();
        self.policy.next_server(&healthy)
    }

    /// Take a consistent snapshot of the healthy set.
    pub fn healthy_set(&self) -> Arc<HealthySet> {
        self.pool.healthy()
    }

    /// Get the backend pool.
    pub fn pool(&self) -> &Arc<BackendPool> {
        &self.pool
    }

    /// Get the health checker, e.g. for on-demand probes.
    pub fn checker(&self) -> &Arc<HealthChecker> {
        &self.checker
    }

    /// Get the active policy name.
    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Stop health checking and wait for in-flight probes to terminate.
    pub async fn shutdown(&self) {
        self.checker.stop().await;
    }

    /// Snapshot per-backend statistics for the shutdown report.
    pub fn stats(&self) -> Vec<BackendStats> {
        self.pool.stats()
    }
}
