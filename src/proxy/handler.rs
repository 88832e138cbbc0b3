use chrono::Utc;
use hyper::{Body, Request, Response, StatusCode};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::http_client::{self, BufferedRequest, RetryCoordinator};
use crate::balancer::{Backend, LoadBalancer, Selection};
use crate::error::{SteerError, SteerResult};
use crate::retry::RetryPolicy;

/// Per-request forwarding orchestrator
///
/// Drives selection, forwarding and retry for each incoming request and maps
/// terminal failures to a synthesized 500. Retries never leak to the client.
#[derive(Clone)]
pub struct ProxyHandler {
    load_balancer: Arc<LoadBalancer>,
    retry: RetryPolicy,
}

impl ProxyHandler {
    pub fn new(load_balancer: Arc<LoadBalancer>, retry: RetryPolicy) -> Self {
        Self {
            load_balancer,
            retry,
        }
    }

    pub async fn handle_request(&self, req: Request<Body>) -> Result<Response<Body>, Infallible> {
        metrics::counter!("steer_requests_total").increment(1);

        match self.process_request(req).await {
            Ok(response) => Ok(response),
            Err(e) => {
                match &e {
                    SteerError::Cancelled { .. } => {
                        debug!("Request aborted by shutdown: {}", e)
                    }
                    SteerError::NoHealthyBackend => warn!("No healthy backend available"),
                    _ => warn!("Request processing error: {}", e),
                }
                metrics::counter!("steer_request_failures_total").increment(1);
                Ok(Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::from("Internal server error"))
                    .unwrap())
            }
        }
    }

    async fn process_request(&self, req: Request<Body>) -> SteerResult<Response<Body>> {
        let request_id = Uuid::new_v4();
        let start_time = Utc::now();
        let client_addr = req.extensions().get::<SocketAddr>().copied();

        // Gate on the healthy set before doing any work; an empty set is an
        // immediate 500, not a retry sequence.
        let healthy = self.load_balancer.healthy_set();
        if healthy.is_empty() {
            return Err(SteerError::NoHealthyBackend);
        }

        let selection = self.load_balancer.select()?;
        debug!(
            request_id = %request_id,
            method = %req.method(),
            path = %req.uri().path(),
            backend = %selection.backend.url(),
            "Forwarding request"
        );

        // The selected backend's handle aborts this forward on shutdown
        let cancel = selection.backend.cancellation().clone();
        let initial_target = selection.backend.url().to_string();
        let buffered = BufferedRequest::buffer(req, client_addr).await?;

        let context = ForwardContext {
            load_balancer: Arc::clone(&self.load_balancer),
            request_id,
            current: Mutex::new(selection),
        };

        let response = http_client::forward_with_retry(
            &buffered,
            initial_target,
            &self.retry,
            &cancel,
            &context,
        )
        .await?;

        // Count only responses actually relayed to the client
        let serving = context.current_backend();
        serving.record_success();

        let elapsed = Utc::now() - start_time;
        info!(
            request_id = %request_id,
            backend = %serving.url(),
            status = %response.status(),
            elapsed_ms = elapsed.num_milliseconds(),
            "Request completed"
        );

        Ok(response)
    }
}

/// Retry-time state for one request: which backend is currently targeted
struct ForwardContext {
    load_balancer: Arc<LoadBalancer>,
    request_id: Uuid,
    current: Mutex<Selection>,
}

impl ForwardContext {
    fn current_backend(&self) -> Arc<Backend> {
        Arc::clone(
            &self
                .current
                .lock()
                .expect("selection lock poisoned")
                .backend,
        )
    }
}

impl RetryCoordinator for ForwardContext {
    fn next_target<'a>(
        &'a self,
        failed_target: &'a str,
        attempt: u32,
        error: &'a SteerError,
    ) -> Pin<Box<dyn Future<Output = SteerResult<String>> + Send + 'a>> {
        Box::pin(async move {
            if error.is_connection_refused() {
                // A refusal is a health signal: probe the backend now so the
                // healthy set reflects it before re-selection.
                let failed = self.current_backend();
                warn!(
                    request_id = %self.request_id,
                    backend = %failed_target,
                    attempt,
                    "Connection refused, probing backend"
                );
                self.load_balancer.checker().probe_backend(&failed).await;
            } else {
                warn!(
                    request_id = %self.request_id,
                    backend = %failed_target,
                    attempt,
                    error = %error,
                    "Upstream attempt failed, retrying"
                );
            }

            let next = self.load_balancer.select()?;
            let url = next.backend.url().to_string();
            *self.current.lock().expect("selection lock poisoned") = next;
            Ok(url)
        })
    }
}
