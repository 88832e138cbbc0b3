use hyper::client::HttpConnector;
use hyper::header::{HeaderMap, HeaderValue, HOST};
use hyper::{Body, Client, Method, Request, Response, Uri};
use hyper_rustls::HttpsConnectorBuilder;
use once_cell::sync::Lazy;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::HttpClientConfig;
use crate::error::{SteerError, SteerResult};
use crate::retry::RetryPolicy;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

/// Shared hyper client with connection pooling (HTTP/HTTPS via rustls)
///
/// - Single client instance reused across requests to enable pooling
/// - Tuned pool settings to reduce connection churn under load
/// - Supports both http and https upstreams
#[allow(clippy::type_complexity)]
static SHARED_CLIENT: Lazy<
    RwLock<Arc<Client<hyper_rustls::HttpsConnector<HttpConnector>, Body>>>,
> = Lazy::new(|| RwLock::new(Arc::new(build_client(None))));

// Request-level timeout for upstream calls (connect + first response byte)
static REQUEST_TIMEOUT_SECS: Lazy<RwLock<u64>> =
    Lazy::new(|| RwLock::new(DEFAULT_REQUEST_TIMEOUT_SECS));

/// Initialize or reinitialize the shared HTTP client with optional
/// configuration. Safe to call multiple times; later calls replace the
/// client.
pub fn init(config: Option<&HttpClientConfig>) {
    let new_client = Arc::new(build_client(config));
    if let Ok(mut guard) = SHARED_CLIENT.write() {
        *guard = new_client;
    }
    if let Some(c) = config {
        if let Some(secs) = c.request_timeout_secs {
            if let Ok(mut g) = REQUEST_TIMEOUT_SECS.write() {
                *g = secs.max(1);
            }
        }
    }
}

fn get_client() -> Arc<Client<hyper_rustls::HttpsConnector<HttpConnector>, Body>> {
    SHARED_CLIENT
        .read()
        .ok()
        .map(|g| Arc::clone(&*g))
        .unwrap_or_else(|| Arc::new(build_client(None)))
}

fn request_timeout() -> Duration {
    let secs = REQUEST_TIMEOUT_SECS
        .read()
        .map(|g| *g)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

fn build_client(
    config: Option<&HttpClientConfig>,
) -> Client<hyper_rustls::HttpsConnector<HttpConnector>, Body> {
    // Base TCP connector; request-level timeout bounds the connect phase
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_nodelay(true);

    // Wrap with rustls HTTPS support and allow both https and http
    let https = HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();

    let pool_idle_timeout_secs = config.and_then(|c| c.pool_idle_timeout_secs).unwrap_or(90);
    let pool_max_idle_per_host = config.and_then(|c| c.pool_max_idle_per_host).unwrap_or(32);

    Client::builder()
        .pool_idle_timeout(Duration::from_secs(pool_idle_timeout_secs))
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .build::<_, Body>(https)
}

/// A client request buffered so it can be re-sent across retry attempts
///
/// Hyper bodies are single-use streams; the forwarder reads the body once
/// and every attempt replays the same method, path, headers and bytes.
#[derive(Debug, Clone)]
pub struct BufferedRequest {
    method: Method,
    path_and_query: String,
    headers: HeaderMap,
    body: hyper::body::Bytes,
    client_addr: Option<SocketAddr>,
}

impl BufferedRequest {
    /// Buffer an incoming request.
    pub async fn buffer(
        req: Request<Body>,
        client_addr: Option<SocketAddr>,
    ) -> SteerResult<Self> {
        let (parts, body) = req.into_parts();
        let body = hyper::body::to_bytes(body)
            .await
            .map_err(|e| SteerError::proxy(format!("Failed to read request body: {}", e)))?;

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        Ok(Self {
            method: parts.method,
            path_and_query,
            headers: parts.headers,
            body,
            client_addr,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path_and_query(&self) -> &str {
        &self.path_and_query
    }
}

/// Per-attempt re-selection hook for the retry loop
///
/// Invoked after a retryable failure; implementations triage the error
/// (triggering an on-demand probe on a refusal), pick the next backend and
/// return its base URL. Returning an error aborts the remaining retries.
pub trait RetryCoordinator: Send + Sync {
    fn next_target<'a>(
        &'a self,
        failed_target: &'a str,
        attempt: u32,
        error: &'a SteerError,
    ) -> Pin<Box<dyn Future<Output = SteerResult<String>> + Send + 'a>>;
}

/// Forward a buffered request once to the given backend base URL.
pub async fn forward_once(
    req: &BufferedRequest,
    target_base: &str,
    cancel: &CancellationToken,
) -> SteerResult<Response<Body>> {
    let base: Uri = target_base
        .parse()
        .map_err(|e| SteerError::proxy(format!("invalid target url: {}", e)))?;

    let scheme = base.scheme_str().unwrap_or("http");
    let authority = base.authority().ok_or_else(|| {
        SteerError::proxy(format!("target URI missing authority: {}", target_base))
    })?;
    let uri: Uri = format!("{}://{}{}", scheme, authority, req.path_and_query)
        .parse()
        .map_err(|e| SteerError::proxy(format!("invalid upstream uri: {}", e)))?;

    let mut headers = req.headers.clone();
    strip_hop_by_hop_headers(&mut headers);
    headers.insert(
        HOST,
        authority
            .as_str()
            .parse()
            .map_err(|e| SteerError::proxy(format!("bad host header: {}", e)))?,
    );
    headers.entry("x-forwarded-proto").or_insert_with(|| {
        if scheme == "https" {
            HeaderValue::from_static("https")
        } else {
            HeaderValue::from_static("http")
        }
    });
    if let Some(addr) = req.client_addr {
        if let Ok(value) = addr.ip().to_string().parse() {
            headers.entry("x-forwarded-for").or_insert(value);
        }
    }

    let mut upstream_req = Request::new(Body::from(req.body.clone()));
    *upstream_req.method_mut() = req.method.clone();
    *upstream_req.uri_mut() = uri;
    *upstream_req.headers_mut() = headers;

    let client = get_client();
    let timeout = request_timeout();
    let fut = client.request(upstream_req);

    tokio::select! {
        _ = cancel.cancelled() => Err(SteerError::cancelled("upstream request")),
        result = tokio::time::timeout(timeout, fut) => {
            match result {
                Ok(Ok(response)) => Ok(build_downstream_response(response)),
                Ok(Err(e)) => Err(SteerError::from(e)),
                Err(_) => Err(SteerError::timeout(timeout, "upstream request")),
            }
        }
    }
}

/// Forward a buffered request with bounded retries.
///
/// Attempts = 1 initial + up to `retry.budget` retries. Transport failures
/// and upstream 5xx are retried; 2xx/3xx/4xx responses are returned as-is.
/// Before each retry the coordinator picks the next target; a refused
/// connection goes straight back to selection after its probe, any other
/// retryable failure sleeps the configured delay first. Exhaustion returns
/// the last error.
pub async fn forward_with_retry(
    req: &BufferedRequest,
    initial_target: String,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
    coordinator: &dyn RetryCoordinator,
) -> SteerResult<Response<Body>> {
    let max_attempts = retry.max_attempts();
    let mut target = initial_target;
    let mut attempt = 1u32;

    loop {
        let error = match forward_once(req, &target, cancel).await {
            Ok(response) if response.status().is_server_error() => {
                SteerError::upstream(&target, response.status())
            }
            Ok(response) => return Ok(response),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => e,
        };

        if attempt >= max_attempts {
            debug!(
                attempts = attempt,
                error = %error,
                "Forward attempts exhausted"
            );
            return Err(error);
        }

        metrics::counter!("steer_upstream_retries_total").increment(1);

        // Refusals feed back into health state and retry immediately; all
        // other retryable failures back off first.
        if !error.is_connection_refused() {
            retry.sleep_before_retry(attempt, cancel).await?;
        }

        target = coordinator.next_target(&target, attempt, &error).await?;
        attempt += 1;
    }
}

/// Lightweight GET that returns only the status code, used by health probes.
/// The caller supplies the per-probe deadline.
pub async fn get_status(url: &str, timeout: Duration) -> SteerResult<hyper::StatusCode> {
    let uri: Uri = url.parse()?;
    let req = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())?;

    let client = get_client();
    let fut = client.request(req);
    let resp = tokio::time::timeout(timeout, fut).await??;
    Ok(resp.status())
}

fn build_downstream_response(upstream: Response<Body>) -> Response<Body> {
    let (parts, body) = upstream.into_parts();
    let mut builder = Response::builder().status(parts.status);

    // Copy headers except hop-by-hop
    for (name, value) in parts.headers.iter() {
        if !is_hop_by_hop_header(name.as_str()) {
            builder = builder.header(name, value);
        }
    }

    builder
        .body(body)
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

fn strip_hop_by_hop_headers(headers: &mut HeaderMap) {
    const HOP_HEADERS: &[&str] = &[
        "connection",
        "keep-alive",
        "proxy-authenticate",
        "proxy-authorization",
        "te",
        "trailers",
        "transfer-encoding",
        "upgrade",
    ];

    // If the Connection header listed additional hop-by-hop headers, those
    // go too
    let extra: Vec<String> = headers
        .get("connection")
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .collect()
        })
        .unwrap_or_default();

    for h in HOP_HEADERS {
        headers.remove(*h);
    }
    for name in extra {
        headers.remove(name.as_str());
    }
}
