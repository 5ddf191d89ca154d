//! Error taxonomy for downstream dispatch.
//!
//! Two layers live here:
//! * [`TransportError`] is what interceptors and the socket-level sender
//!   produce while a call is in flight. It carries the original fault.
//! * [`ErrorKind`] is the closed classification the rest of the gateway
//!   reasons about. [`DispatchError`] pairs the two so diagnostics are never
//!   lost when a fault is classified.
use std::{error::Error as StdError, fmt, time::Duration};

use http::StatusCode;
use thiserror::Error;

/// Boxed error used for faults raised by interceptors or the HTTP stack.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Faults raised inside the interceptor chain or by the sender.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// The caller's cancellation token fired before the call finished.
    #[error("Request was canceled by the caller")]
    Canceled,

    /// A deadline owned by the chain expired.
    #[error("Timeout making http request after {}", humantime::format_duration(*after))]
    TimedOut { after: Duration },

    /// The route's circuit breaker rejected the call without network I/O.
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    /// Connection-level fault (DNS, refused, reset).
    #[error("Error connecting to downstream service: {message}")]
    Connect {
        message: String,
        #[source]
        source: BoxError,
    },

    /// The outgoing request could not be turned into a wire request.
    #[error("Invalid downstream request: {message}")]
    InvalidRequest {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Any other fault reported by the HTTP stack or an interceptor.
    #[error("Error making downstream request: {message}")]
    Other {
        message: String,
        #[source]
        source: BoxError,
    },
}

impl TransportError {
    /// Wrap an arbitrary fault, keeping it reachable through `source()`.
    pub fn other<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Other {
            message: error.to_string(),
            source: Box::new(error),
        }
    }

    /// A request rejected before it reached the network, with no underlying error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a connection-level fault.
    pub fn connect<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Connect {
            message: error.to_string(),
            source: Box::new(error),
        }
    }
}

/// Result alias for calls travelling through the chain.
pub type TransportResult<T> = Result<T, TransportError>;

/// Returned by a breaker that refuses a call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Circuit is open for route '{route}'")]
pub struct CircuitOpenError {
    pub route: String,
}

/// Faults while constructing a transport. These indicate a configuration
/// defect and are surfaced to the caller instead of becoming a per-request
/// failure.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportBuildError {
    #[error("Failed to build HTTP client for route '{route}': {message}")]
    Client {
        route: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Invalid transport options for route '{route}': {message}")]
    InvalidOptions { route: String, message: String },
}

/// Closed set of dispatch failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Canceled,
    Timeout,
    CircuitOpen,
    ConnectionFailed,
    UnknownDispatchError,
}

impl ErrorKind {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Canceled => "canceled",
            ErrorKind::Timeout => "timeout",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::ConnectionFailed => "connection_failed",
            ErrorKind::UnknownDispatchError => "unknown_dispatch_error",
        }
    }

    /// Status code the gateway historically answered with for this kind.
    ///
    /// This is a hint for the inbound pipeline, which owns the final mapping.
    /// 499 is the non-standard "client closed request" code.
    pub fn status_hint(&self) -> StatusCode {
        match self {
            ErrorKind::Canceled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ErrorKind::Timeout | ErrorKind::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::ConnectionFailed => StatusCode::BAD_GATEWAY,
            ErrorKind::UnknownDispatchError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified dispatch failure. The mapped kind is additive: the original
/// fault stays available through [`DispatchError::fault`] and `source()`.
#[derive(Error, Debug)]
#[error("{kind}: {message}")]
pub struct DispatchError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<TransportError>,
}

impl DispatchError {
    pub fn new(kind: ErrorKind, fault: TransportError) -> Self {
        Self {
            kind,
            message: fault.to_string(),
            source: Some(fault),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn fault(&self) -> Option<&TransportError> {
        self.source.as_ref()
    }

    /// Full `source()` chain rendered for diagnostics, outermost first.
    pub fn detail(&self) -> String {
        let mut detail = self.message.clone();
        let mut next = self.source.as_ref().and_then(|fault| fault.source());
        while let Some(cause) = next {
            detail.push_str(": ");
            detail.push_str(&cause.to_string());
            next = cause.source();
        }
        detail
    }
}
