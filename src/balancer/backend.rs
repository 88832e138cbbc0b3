use arc_swap::ArcSwap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::BackendConfig;

/// Health status of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Backend answered its last probe with a 2xx
    Healthy,
    /// Backend failed its last probe
    Unhealthy,
    /// Backend has not been probed yet
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Unhealthy => write!(f, "UNHEALTHY"),
            HealthStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// A single backend server
///
/// Created once at startup and shared between the pool, the healthy set and
/// in-flight requests; lives for the lifetime of the load balancer. Status is
/// written only by the health checker while holding the probe gate; counters
/// are written from the data plane with atomic increments.
#[derive(Debug)]
pub struct Backend {
    /// Backend identifier
    name: String,
    /// Base URL for forwarding and probes, without trailing slash
    url: String,
    /// Relative weight for weighted policies
    weight: u32,
    /// Current health status
    status: RwLock<HealthStatus>,
    /// Requests served over the backend's lifetime
    total_requests: AtomicU64,
    /// Requests served since the last status transition
    requests_since_status_change: AtomicU64,
    /// Serializes probes of this backend; concurrent probe attempts queue
    /// here and adopt the completed probe's result instead of re-probing
    probe_gate: tokio::sync::Mutex<()>,
    /// Incremented after every completed probe
    probe_epoch: AtomicU64,
    /// Shared cancellation handle aborting in-flight work on shutdown
    cancel: CancellationToken,
}

impl Backend {
    /// Create a backend from configuration.
    pub fn new(config: &BackendConfig, cancel: CancellationToken) -> Self {
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| config.url.clone());

        Self {
            name,
            url: config.url.trim_end_matches('/').to_string(),
            weight: config.get_weight(),
            status: RwLock::new(HealthStatus::Unknown),
            total_requests: AtomicU64::new(0),
            requests_since_status_change: AtomicU64::new(0),
            probe_gate: tokio::sync::Mutex::new(()),
            probe_epoch: AtomicU64::new(0),
            cancel,
        }
    }

    /// Get the backend name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the backend base URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the backend weight.
    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Get the current health status.
    pub fn status(&self) -> HealthStatus {
        *self.status.read().expect("status lock poisoned")
    }

    /// Check if the backend may receive traffic.
    pub fn is_healthy(&self) -> bool {
        self.status() == HealthStatus::Healthy
    }

    /// Get the shared cancellation handle.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Transition the health status.
    ///
    /// Setting the current value is a no-op and returns false. A real
    /// transition resets `requests_since_status_change` and returns true; the
    /// caller must republish the healthy set before the transition becomes
    /// observable to probe waiters.
    pub fn set_status(&self, new: HealthStatus) -> bool {
        let mut status = self.status.write().expect("status lock poisoned");
        if *status == new {
            return false;
        }
        *status = new;
        self.requests_since_status_change.store(0, Ordering::Relaxed);
        true
    }

    /// Record a response served to a client through this backend.
    pub fn record_success(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.requests_since_status_change
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Get the lifetime request counter.
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Get the request counter since the last status transition.
    pub fn requests_since_status_change(&self) -> u64 {
        self.requests_since_status_change.load(Ordering::Relaxed)
    }

    /// Get the probe serialization gate.
    pub(crate) fn probe_gate(&self) -> &tokio::sync::Mutex<()> {
        &self.probe_gate
    }

    /// Get the probe epoch, advanced after every completed probe.
    pub(crate) fn probe_epoch(&self) -> u64 {
        self.probe_epoch.load(Ordering::Acquire)
    }

    /// Mark a probe as completed. Must be called while holding the gate.
    pub(crate) fn complete_probe(&self) {
        self.probe_epoch.fetch_add(1, Ordering::Release);
    }

    /// Snapshot the backend statistics for reporting.
    pub fn stats(&self) -> BackendStats {
        BackendStats {
            name: self.name.clone(),
            url: self.url.clone(),
            total_requests: self.total_requests(),
            requests_since_status_change: self.requests_since_status_change(),
            status: self.status(),
        }
    }
}

/// Point-in-time statistics for one backend
#[derive(Debug, Clone)]
pub struct BackendStats {
    pub name: String,
    pub url: String,
    pub total_requests: u64,
    pub requests_since_status_change: u64,
    pub status: HealthStatus,
}

/// The healthy subset of the pool, published as an immutable snapshot
///
/// Pool order is preserved. The generation advances only when membership
/// changes, so selection policies can detect topology changes without
/// resetting on every probe cycle.
#[derive(Debug)]
pub struct HealthySet {
    backends: Vec<Arc<Backend>>,
    generation: u64,
}

impl HealthySet {
    fn empty() -> Self {
        Self {
            backends: Vec::new(),
            generation: 0,
        }
    }

    /// Get the healthy backends in pool order.
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    /// Get the membership generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of healthy backends.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Check if no backend is healthy.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

/// The fixed, ordered pool of configured backends
///
/// The healthy view is maintained as a lock-free snapshot swapped atomically
/// after probe completions, so data-plane readers never block.
#[derive(Debug)]
pub struct BackendPool {
    backends: Vec<Arc<Backend>>,
    healthy: ArcSwap<HealthySet>,
}

impl BackendPool {
    /// Create a pool from already constructed backends.
    pub fn new(backends: Vec<Arc<Backend>>) -> Self {
        Self {
            backends,
            healthy: ArcSwap::from_pointee(HealthySet::empty()),
        }
    }

    /// Create a pool from configuration, wiring the shared cancellation
    /// handle into every backend.
    pub fn from_config(configs: &[BackendConfig], cancel: &CancellationToken) -> Self {
        let backends = configs
            .iter()
            .map(|c| Arc::new(Backend::new(c, cancel.clone())))
            .collect();
        Self::new(backends)
    }

    /// Get all backends in configuration order.
    pub fn all(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    /// Pool size.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Check if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Take a consistent snapshot of the healthy set.
    pub fn healthy(&self) -> Arc<HealthySet> {
        self.healthy.load_full()
    }

    /// Recompute the healthy set from current statuses and publish it.
    ///
    /// The new snapshot is swapped in atomically; the generation is bumped
    /// only when membership actually changed.
    pub fn rebuild_healthy(&self) {
        self.healthy.rcu(|current| {
            let members: Vec<Arc<Backend>> = self
                .backends
                .iter()
                .filter(|b| b.is_healthy())
                .cloned()
                .collect();

            if same_membership(current.backends(), &members) {
                Arc::clone(current)
            } else {
                Arc::new(HealthySet {
                    backends: members,
                    generation: current.generation + 1,
                })
            }
        });
    }

    /// Snapshot statistics for every backend.
    pub fn stats(&self) -> Vec<BackendStats> {
        self.backends.iter().map(|b| b.stats()).collect()
    }
}

fn same_membership(current: &[Arc<Backend>], candidate: &[Arc<Backend>]) -> bool {
    current.len() == candidate.len()
        && current
            .iter()
            .zip(candidate.iter())
            .all(|(a, b)| Arc::ptr_eq(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_config(url: &str, weight: Option<u32>) -> BackendConfig {
        BackendConfig {
            url: url.to_string(),
            name: None,
            weight,
        }
    }

    fn make_backend(url: &str) -> Backend {
        Backend::new(&backend_config(url, None), CancellationToken::new())
    }

    #[test]
    fn test_backend_initial_state() {
        let backend = make_backend("http://localhost:8081/");
        assert_eq!(backend.status(), HealthStatus::Unknown);
        assert!(!backend.is_healthy());
        assert_eq!(backend.url(), "http://localhost:8081");
        assert_eq!(backend.weight(), 1);
        assert_eq!(backend.total_requests(), 0);
    }

    #[test]
    fn test_status_transition_resets_counter() {
        let backend = make_backend("http://localhost:8081");
        backend.set_status(HealthStatus::Healthy);

        backend.record_success();
        backend.record_success();
        assert_eq!(backend.total_requests(), 2);
        assert_eq!(backend.requests_since_status_change(), 2);

        // Same-value transition is a no-op
        assert!(!backend.set_status(HealthStatus::Healthy));
        assert_eq!(backend.requests_since_status_change(), 2);

        // Real transition resets the windowed counter, not the total
        assert!(backend.set_status(HealthStatus::Unhealthy));
        assert_eq!(backend.requests_since_status_change(), 0);
        assert_eq!(backend.total_requests(), 2);
    }

    #[test]
    fn test_counters_monotonic() {
        let backend = make_backend("http://localhost:8081");
        let mut last = 0;
        for _ in 0..10 {
            backend.record_success();
            let total = backend.total_requests();
            assert!(total > last);
            last = total;
        }
    }

    #[test]
    fn test_healthy_set_empty_before_first_probe() {
        let pool = BackendPool::from_config(
            &[
                backend_config("http://localhost:8081", None),
                backend_config("http://localhost:8082", None),
            ],
            &CancellationToken::new(),
        );

        assert_eq!(pool.len(), 2);
        let healthy = pool.healthy();
        assert!(healthy.is_empty());
        assert_eq!(healthy.generation(), 0);
    }

    #[test]
    fn test_rebuild_preserves_pool_order() {
        let pool = BackendPool::from_config(
            &[
                backend_config("http://localhost:8081", None),
                backend_config("http://localhost:8082", None),
                backend_config("http://localhost:8083", None),
            ],
            &CancellationToken::new(),
        );

        for backend in pool.all() {
            backend.set_status(HealthStatus::Healthy);
        }
        pool.rebuild_healthy();

        let healthy = pool.healthy();
        assert_eq!(healthy.len(), 3);
        let urls: Vec<&str> = healthy.backends().iter().map(|b| b.url()).collect();
        assert_eq!(
            urls,
            vec![
                "http://localhost:8081",
                "http://localhost:8082",
                "http://localhost:8083"
            ]
        );
    }

    #[test]
    fn test_generation_bumps_only_on_membership_change() {
        let pool = BackendPool::from_config(
            &[
                backend_config("http://localhost:8081", None),
                backend_config("http://localhost:8082", None),
            ],
            &CancellationToken::new(),
        );

        pool.all()[0].set_status(HealthStatus::Healthy);
        pool.rebuild_healthy();
        assert_eq!(pool.healthy().generation(), 1);

        // Rebuild with unchanged membership keeps the generation
        pool.rebuild_healthy();
        assert_eq!(pool.healthy().generation(), 1);

        pool.all()[1].set_status(HealthStatus::Healthy);
        pool.rebuild_healthy();
        assert_eq!(pool.healthy().generation(), 2);
        assert_eq!(pool.healthy().len(), 2);

        pool.all()[0].set_status(HealthStatus::Unhealthy);
        pool.rebuild_healthy();
        let healthy = pool.healthy();
        assert_eq!(healthy.generation(), 3);
        assert_eq!(healthy.len(), 1);
        assert_eq!(healthy.backends()[0].url(), "http://localhost:8082");
    }

    #[test]
    fn test_stats_snapshot() {
        let backend = make_backend("http://localhost:8081");
        backend.set_status(HealthStatus::Healthy);
        backend.record_success();

        let stats = backend.stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.requests_since_status_change, 1);
        assert_eq!(stats.status, HealthStatus::Healthy);
        assert_eq!(stats.url, "http://localhost:8081");
    }
}
