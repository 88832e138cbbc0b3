use thiserror::Error;
use tokio::time::Duration;

/// Main error type for the Steer load balancer
#[derive(Error, Debug, Clone)]
pub enum SteerError {
    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Network related errors (reset, DNS failure, broken transport)
    #[error("Network error: {message}")]
    Network { message: String },

    /// Connection refused by an upstream
    #[error("Connection refused by {target}")]
    ConnectionRefused { target: String },

    /// No backend in the healthy set
    #[error("No healthy backend available")]
    NoHealthyBackend,

    /// Upstream answered with a server error
    #[error("Upstream {target} returned {status}")]
    Upstream {
        target: String,
        status: hyper::StatusCode,
    },

    /// Health check errors
    #[error("Health check error: {message}")]
    HealthCheck { message: String },

    /// Proxy request errors
    #[error("Proxy error: {message}")]
    Proxy { message: String },

    /// Timeout errors
    #[error("Operation timed out after {duration:?}: {operation}")]
    Timeout {
        duration: Duration,
        operation: String,
    },

    /// Operation aborted by the shared cancellation handle
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    /// IO related errors
    #[error("IO error: {message}")]
    Io { message: String },

    /// Internal server errors
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl SteerError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a connection refused error
    pub fn connection_refused<S: Into<String>>(target: S) -> Self {
        Self::ConnectionRefused {
            target: target.into(),
        }
    }

    /// Create an upstream server error
    pub fn upstream<S: Into<String>>(target: S, status: hyper::StatusCode) -> Self {
        Self::Upstream {
            target: target.into(),
            status,
        }
    }

    /// Create a health check error
    pub fn health_check<S: Into<String>>(message: S) -> Self {
        Self::HealthCheck {
            message: message.into(),
        }
    }

    /// Create a proxy error
    pub fn proxy<S: Into<String>>(message: S) -> Self {
        Self::Proxy {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(duration: Duration, operation: S) -> Self {
        Self::Timeout {
            duration,
            operation: operation.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled<S: Into<String>>(operation: S) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create an IO error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if the error is retryable against a different backend.
    ///
    /// Transport failures and upstream 5xx responses are retryable;
    /// configuration errors, cancellation and selection failure are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SteerError::Network { .. }
                | SteerError::ConnectionRefused { .. }
                | SteerError::Timeout { .. }
                | SteerError::Upstream { .. }
        )
    }

    /// Check if the error indicates a refused connection, which additionally
    /// triggers an on-demand health probe of the failed backend.
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, SteerError::ConnectionRefused { .. })
    }
}

/// Result type alias for Steer operations
pub type SteerResult<T> = Result<T, SteerError>;

/// Walk the source chain of a hyper error looking for a refused connection.
fn hyper_error_is_refused(err: &hyper::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
            return io_err.kind() == std::io::ErrorKind::ConnectionRefused;
        }
        source = cause.source();
    }
    false
}

/// Convert from hyper::Error to SteerError
///
/// Refused connections are kept distinct from other connect failures because
/// they feed back into health state.
impl From<hyper::Error> for SteerError {
    fn from(err: hyper::Error) -> Self {
        if hyper_error_is_refused(&err) {
            SteerError::connection_refused(err.to_string())
        } else if err.is_timeout() {
            SteerError::timeout(Duration::from_secs(30), "HTTP request")
        } else if err.is_connect() {
            SteerError::network(format!("Connection error: {}", err))
        } else {
            SteerError::network(format!("HTTP error: {}", err))
        }
    }
}

/// Convert from std::io::Error to SteerError
impl From<std::io::Error> for SteerError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::ConnectionRefused {
            SteerError::connection_refused(err.to_string())
        } else {
            SteerError::io(format!("IO error: {}", err))
        }
    }
}

/// Convert from toml::de::Error to SteerError
impl From<toml::de::Error> for SteerError {
    fn from(err: toml::de::Error) -> Self {
        SteerError::config(format!("TOML parsing error: {}", err))
    }
}

/// Convert from hyper::http::uri::InvalidUri to SteerError
impl From<hyper::http::uri::InvalidUri> for SteerError {
    fn from(err: hyper::http::uri::InvalidUri) -> Self {
        SteerError::config(format!("Invalid URI: {}", err))
    }
}

/// Convert from hyper::http::Error to SteerError
impl From<hyper::http::Error> for SteerError {
    fn from(err: hyper::http::Error) -> Self {
        SteerError::network(format!("HTTP error: {}", err))
    }
}

/// Convert from tokio::time::Elapsed to SteerError
impl From<tokio::time::error::Elapsed> for SteerError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        SteerError::timeout(Duration::from_secs(30), "operation")
    }
}
