use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::handler::ProxyHandler;
use super::http_client;
use crate::balancer::LoadBalancer;
use crate::config::Config;
use crate::error::{SteerError, SteerResult};
use crate::retry::RetryPolicy;

/// Ingress HTTP server
///
/// Owns the load balancer, the shared cancellation handle and the serve
/// task. The listener accepts as soon as `start()` binds; early requests may
/// see 500 until the first health pass completes.
pub struct ProxyServer {
    bind_addr: SocketAddr,
    load_balancer: Arc<LoadBalancer>,
    retry: RetryPolicy,
    shutdown: CancellationToken,
    serve_handle: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    local_addr: std::sync::Mutex<Option<SocketAddr>>,
    closed: AtomicBool,
}

impl ProxyServer {
    pub fn new(config: &Config) -> Self {
        // Initialize the shared HTTP client pool with config (first call wins)
        http_client::init(config.http_client.as_ref());

        let shutdown = CancellationToken::new();
        let load_balancer = Arc::new(LoadBalancer::new(config, &shutdown));

        Self {
            bind_addr: config.server.bind,
            load_balancer,
            retry: config.retry.to_policy(),
            shutdown,
            serve_handle: tokio::sync::Mutex::new(None),
            local_addr: std::sync::Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Override the bind address from configuration (CLI `--bind`).
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Bind the ingress port, start health checking and begin serving.
    /// Returns the bound address (useful when binding port 0).
    pub async fn start(&self) -> SteerResult<SocketAddr> {
        self.load_balancer.start().await;

        let handler = ProxyHandler::new(Arc::clone(&self.load_balancer), self.retry.clone());

        let make_service = make_service_fn(move |conn: &AddrStream| {
            let handler = handler.clone();
            let remote = conn.remote_addr();
            async move {
                Ok::<_, Infallible>(service_fn(move |mut req| {
                    let handler = handler.clone();
                    // Attach remote addr to request extensions
                    req.extensions_mut().insert(remote);
                    async move { handler.handle_request(req).await }
                }))
            }
        });

        let server = Server::try_bind(&self.bind_addr)
            .map_err(|e| {
                SteerError::config(format!("Failed to bind {}: {}", self.bind_addr, e))
            })?
            .serve(make_service);

        let local_addr = server.local_addr();
        *self
            .local_addr
            .lock()
            .expect("local addr lock poisoned") = Some(local_addr);

        info!(
            addr = %local_addr,
            policy = self.load_balancer.policy_name(),
            "HTTP load balancer listening"
        );

        let shutdown = self.shutdown.clone();
        let graceful = server.with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        });

        let handle = tokio::spawn(async move {
            if let Err(e) = graceful.await {
                error!("HTTP server error: {}", e);
            }
        });
        *self.serve_handle.lock().await = Some(handle);

        Ok(local_addr)
    }

    /// The bound ingress address, once `start()` has run.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().expect("local addr lock poisoned")
    }

    /// Access the load balancer core.
    pub fn load_balancer(&self) -> &Arc<LoadBalancer> {
        &self.load_balancer
    }

    /// Shut down: stop health checking, fire the shared cancellation handle
    /// (aborting in-flight probes and upstream requests), close the listener,
    /// drain in-flight handlers and report per-backend statistics.
    /// Subsequent calls return immediately.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Shutting down load balancer");

        self.load_balancer.shutdown().await;
        self.shutdown.cancel();

        let handle = self.serve_handle.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        for stats in self.load_balancer.stats() {
            info!(
                backend = %stats.name,
                url = %stats.url,
                total_requests = stats.total_requests,
                since_status_change = stats.requests_since_status_change,
                status = %stats.status,
                "Backend statistics"
            );
        }

        info!("Shutdown complete");
    }
}
