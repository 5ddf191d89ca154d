//! Resolved route description consumed by the dispatch core.
//!
//! A [`Route`] is produced upstream (route matching, configuration) and handed
//! to the dispatcher as an `Arc<Route>`. The dispatch core never mutates it.
use std::{
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use thiserror::Error;
use url::Url;

/// Default idle lifetime of pooled downstream connections.
pub const DEFAULT_POOLED_CONNECTION_LIFETIME: Duration = Duration::from_secs(120);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AddressError {
    #[error("Invalid downstream address '{0}': {1}")]
    Invalid(String, String),

    #[error("Downstream address must use http or https, got: {0}")]
    UnsupportedScheme(String),
}

/// One resolved downstream target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DownstreamAddress {
    scheme: String,
    host: String,
    port: u16,
}

impl DownstreamAddress {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, the key used for per-server connection limits.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for DownstreamAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl FromStr for DownstreamAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s).map_err(|e| AddressError::Invalid(s.to_string(), e.to_string()))?;
        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(AddressError::UnsupportedScheme(scheme.to_string()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| AddressError::Invalid(s.to_string(), "missing host".to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| AddressError::Invalid(s.to_string(), "missing port".to_string()))?;
        Ok(Self::new(scheme, host, port))
    }
}

/// Socket-level behavior of the route's pooled sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpHandlerOptions {
    /// Follow downstream redirects instead of returning them.
    pub allow_auto_redirect: bool,
    /// Keep a cookie jar per transport.
    pub use_cookie_container: bool,
    /// Honor system proxy settings.
    pub use_proxy: bool,
    /// Add the tracing interceptor to the chain.
    pub use_tracing: bool,
    /// Concurrent connections per downstream server. `None` means unbounded.
    pub max_connections_per_server: Option<usize>,
    /// Maximum age of the route's connection pool. Once reached, the next
    /// request builds a fresh pool so DNS changes are picked up; idle
    /// connections are also closed after this long. Zero never recycles.
    pub pooled_connection_lifetime: Duration,
}

impl Default for HttpHandlerOptions {
    fn default() -> Self {
        Self {
            allow_auto_redirect: false,
            use_cookie_container: false,
            use_proxy: true,
            use_tracing: false,
            max_connections_per_server: None,
            pooled_connection_lifetime: DEFAULT_POOLED_CONNECTION_LIFETIME,
        }
    }
}

/// Resilience settings: a deadline plus a circuit breaker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QosOptions {
    pub use_qos: bool,
    /// Deadline applied inside breaker admission.
    pub timeout: Option<Duration>,
    /// Consecutive failures that open the circuit. Zero disables the breaker.
    pub exceptions_allowed_before_breaking: u32,
    pub duration_of_break: Duration,
    /// Count downstream 5xx responses as breaker failures.
    pub break_on_server_errors: bool,
}

/// A matched route, as seen by the dispatch core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub name: String,
    pub downstream_addresses: Vec<DownstreamAddress>,
    pub interceptor_order: Vec<String>,
    pub handler_options: HttpHandlerOptions,
    pub qos: QosOptions,
    /// Whole-call deadline. Falls back to the dispatcher default.
    pub timeout: Option<Duration>,
    pub dangerous_accept_any_server_certificate: bool,
}

impl Route {
    pub fn builder(name: impl Into<String>) -> RouteBuilder {
        RouteBuilder::new(name)
    }
}

/// Fluent construction for [`Route`], mostly for embedding and tests.
#[derive(Debug, Clone)]
pub struct RouteBuilder {
    route: Route,
}

impl RouteBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            route: Route {
                name: name.into(),
                downstream_addresses: Vec::new(),
                interceptor_order: Vec::new(),
                handler_options: HttpHandlerOptions::default(),
                qos: QosOptions::default(),
                timeout: None,
                dangerous_accept_any_server_certificate: false,
            },
        }
    }

    pub fn downstream(mut self, address: DownstreamAddress) -> Self {
        self.route.downstream_addresses.push(address);
        self
    }

    pub fn interceptor(mut self, name: impl Into<String>) -> Self {
        self.route.interceptor_order.push(name.into());
        self
    }

    pub fn handler_options(mut self, options: HttpHandlerOptions) -> Self {
        self.route.handler_options = options;
        self
    }

    pub fn use_tracing(mut self, enabled: bool) -> Self {
        self.route.handler_options.use_tracing = enabled;
        self
    }

    pub fn qos(mut self, qos: QosOptions) -> Self {
        self.route.qos = qos;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.route.timeout = Some(timeout);
        self
    }

    pub fn dangerous_accept_any_server_certificate(mut self, enabled: bool) -> Self {
        self.route.dangerous_accept_any_server_certificate = enabled;
        self
    }

    pub fn build(self) -> Route {
        self.route
    }
}

/// Cache key for per-route state. Compares by allocation, not by content.
///
/// Holding the `Arc` keeps the allocation alive, so the address can never be
/// reused by another route while the key exists.
#[derive(Clone)]
pub struct RouteKey(Arc<Route>);

impl RouteKey {
    pub fn new(route: &Arc<Route>) -> Self {
        Self(Arc::clone(route))
    }

    pub fn route(&self) -> &Arc<Route> {
        &self.0
    }
}

impl PartialEq for RouteKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for RouteKey {}

impl Hash for RouteKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

impl fmt::Debug for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RouteKey")
            .field(&self.0.name)
            .field(&Arc::as_ptr(&self.0))
            .finish()
    }
}
