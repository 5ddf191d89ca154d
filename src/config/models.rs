//! Configuration data structures for the dispatch core.
//!
//! These types map directly to YAML (also JSON / TOML) files. Durations are
//! humantime strings such as `"90s"` or `"250ms"`. Every section has defaults
//! so minimal files stay short; [`RouteValidator`](super::RouteValidator)
//! turns the definitions into runtime [`Route`](crate::core::route::Route)s.
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Whole-call timeout used when a route does not set one.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(90);

fn default_timeout() -> String {
    "90s".to_string()
}

fn default_use_proxy() -> bool {
    true
}

fn default_pooled_connection_lifetime() -> String {
    "120s".to_string()
}

fn default_duration_of_break() -> String {
    "5s".to_string()
}

/// Top-level dispatch configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DispatchConfig {
    #[serde(default = "default_timeout")]
    pub default_timeout: String,
    #[serde(default)]
    pub routes: Vec<RouteDefinition>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_timeout: default_timeout(),
            routes: Vec::new(),
        }
    }
}

/// One route as written in the configuration file.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RouteDefinition {
    pub name: String,
    #[serde(default)]
    pub downstream_addresses: Vec<String>,
    /// Interceptor names in application order.
    #[serde(default)]
    pub interceptors: Vec<String>,
    #[serde(default)]
    pub handler_options: HandlerOptionsDefinition,
    #[serde(default)]
    pub qos: QosDefinition,
    #[serde(default)]
    pub timeout: Option<String>,
    #[serde(default)]
    pub dangerous_accept_any_server_certificate: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HandlerOptionsDefinition {
    #[serde(default)]
    pub allow_auto_redirect: bool,
    #[serde(default)]
    pub use_cookie_container: bool,
    #[serde(default = "default_use_proxy")]
    pub use_proxy: bool,
    #[serde(default)]
    pub use_tracing: bool,
    #[serde(default)]
    pub max_connections_per_server: Option<usize>,
    #[serde(default = "default_pooled_connection_lifetime")]
    pub pooled_connection_lifetime: String,
}

impl Default for HandlerOptionsDefinition {
    fn default() -> Self {
        Self {
            allow_auto_redirect: false,
            use_cookie_container: false,
            use_proxy: default_use_proxy(),
            use_tracing: false,
            max_connections_per_server: None,
            pooled_connection_lifetime: default_pooled_connection_lifetime(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QosDefinition {
    /// Explicit switch. When absent QoS is on as soon as a timeout or a
    /// breaker threshold is configured.
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub timeout: Option<String>,
    #[serde(default)]
    pub exceptions_allowed_before_breaking: u32,
    #[serde(default = "default_duration_of_break")]
    pub duration_of_break: String,
    #[serde(default)]
    pub break_on_server_errors: bool,
}

impl QosDefinition {
    pub fn is_enabled(&self) -> bool {
        self.enabled
            .unwrap_or(self.exceptions_allowed_before_breaking > 0 || self.timeout.is_some())
    }
}

impl Default for QosDefinition {
    fn default() -> Self {
        Self {
            enabled: None,
            timeout: None,
            exceptions_allowed_before_breaking: 0,
            duration_of_break: default_duration_of_break(),
            break_on_server_errors: false,
        }
    }
}

/// Runtime global settings, read once when a transport is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub default_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_DISPATCH_TIMEOUT,
        }
    }
}
