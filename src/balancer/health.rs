use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backend::{Backend, BackendPool, HealthStatus};
use crate::config::HealthCheckConfig;
use crate::proxy::http_client;

/// Active health checker
///
/// Probes every backend at a fixed cadence and on demand, and maintains the
/// pool's healthy set. Probes are coalesced per backend: whoever holds the
/// backend's probe gate runs the single in-flight probe, everyone else waits
/// on the gate and adopts that probe's result.
pub struct HealthChecker {
    pool: Arc<BackendPool>,
    config: HealthCheckConfig,
    /// Child of the shared cancellation handle, so `stop()` can abort probes
    /// without tearing down the rest of the process
    cancel: CancellationToken,
    driver: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl HealthChecker {
    /// Create a health checker over the pool. Probing starts with `start()`.
    pub fn new(
        pool: Arc<BackendPool>,
        config: HealthCheckConfig,
        shutdown: &CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            config,
            cancel: shutdown.child_token(),
            driver: tokio::sync::Mutex::new(None),
        })
    }

    /// Start the periodic probe schedule.
    ///
    /// The first pass runs eagerly; until it completes every backend stays
    /// UNKNOWN and the healthy set is empty.
    pub async fn start(self: &Arc<Self>) {
        let checker = Arc::clone(self);
        let handle = tokio::spawn(async move {
            checker.run().await;
        });
        *self.driver.lock().await = Some(handle);
    }

    /// Stop the periodic schedule, abort in-flight probes and wait for every
    /// probe to terminate. Idempotent.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.driver.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        debug!("Health checker stopped");
    }

    /// Periodic driver: one probe task per backend per tick.
    ///
    /// Ticks do not wait for the previous cycle; an overlapping cycle's
    /// probes collapse into the still-running ones at the probe gate.
    async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.get_interval());
        let mut probes: JoinSet<()> = JoinSet::new();

        debug!(
            interval_secs = self.config.interval,
            path = %self.config.path,
            "Starting health check schedule"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    for backend in self.pool.all() {
                        let checker = Arc::clone(&self);
                        let backend = Arc::clone(backend);
                        probes.spawn(async move {
                            checker.probe_backend(&backend).await;
                        });
                    }
                }
                Some(_) = probes.join_next() => {}
            }
        }

        // Cancellation has fired; outstanding probes observe it and finish
        while probes.join_next().await.is_some() {}
        debug!("Health check schedule terminated");
    }

    /// Probe one backend and fold the outcome into the healthy set.
    ///
    /// This is the single entry point for periodic and on-demand probes.
    /// Callers that find a probe already in flight wait for it and observe
    /// its result instead of launching a second one.
    pub async fn probe_backend(&self, backend: &Arc<Backend>) -> HealthStatus {
        let epoch = backend.probe_epoch();
        let _gate = backend.probe_gate().lock().await;

        if backend.probe_epoch() != epoch {
            // A probe completed while we waited on the gate; its result is
            // the answer to this request as well.
            return backend.status();
        }

        let outcome = match self.execute_probe(backend).await {
            Some(healthy) => healthy,
            None => return backend.status(), // cancelled mid-probe
        };

        let status = if outcome {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };

        let previous = backend.status();
        if backend.set_status(status) {
            // Publish before waking gate waiters so no observer sees a
            // HEALTHY backend missing from the healthy set.
            self.pool.rebuild_healthy();
            match status {
                HealthStatus::Healthy => info!(
                    backend = %backend.name(),
                    url = %backend.url(),
                    previous = %previous,
                    "Backend is now healthy"
                ),
                _ => warn!(
                    backend = %backend.name(),
                    url = %backend.url(),
                    previous = %previous,
                    "Backend is now unhealthy"
                ),
            }
        }

        backend.complete_probe();
        status
    }

    /// Execute a single HTTP probe. Returns None when cancelled.
    async fn execute_probe(&self, backend: &Arc<Backend>) -> Option<bool> {
        let url = format!("{}{}", backend.url(), self.config.path);
        let deadline = self.config.get_timeout();

        tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = http_client::get_status(&url, deadline) => {
                match result {
                    Ok(status) => {
                        let healthy = status.is_success();
                        debug!(
                            backend = %backend.name(),
                            status = %status,
                            healthy,
                            "Probe completed"
                        );
                        Some(healthy)
                    }
                    Err(e) => {
                        debug!(backend = %backend.name(), error = %e, "Probe failed");
                        metrics::counter!("steer_probe_failures_total").increment(1);
                        Some(false)
                    }
                }
            }
        }
    }
}
