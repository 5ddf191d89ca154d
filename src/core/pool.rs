//! Per-route transport cache.
//!
//! A [`Transport`] bundles a route's pooled sender with its interceptor
//! chain. Building one opens connection pools and resolves interceptors, so
//! the pool builds at most one per live `Arc<Route>` and hands out shared
//! references afterwards.
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use axum::body::Body as AxumBody;
use http::{Request, Response};
use scc::hash_map::Entry;
use tokio_util::sync::CancellationToken;

use crate::{
    adapters::interceptors::TimeoutInterceptor,
    config::models::DispatchSettings,
    core::{
        chain::{HandlerChain, HandlerChainBuilder},
        error::{TransportBuildError, TransportResult},
        route::{Route, RouteKey},
    },
    metrics::increment_transports_created,
    ports::{
        interceptor::{CallContext, InterceptorRegistry, Next},
        sender::{HttpSender, SenderFactory},
    },
};

/// A route's sender plus its composed chain. Immutable once built.
pub struct Transport {
    id: u64,
    route: Arc<Route>,
    sender: Arc<dyn HttpSender>,
    chain: HandlerChain,
    timeout: Duration,
}

impl Transport {
    /// Construction sequence number, unique within a pool.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    pub fn chain(&self) -> &HandlerChain {
        &self.chain
    }

    /// Whole-call timeout applied by the outermost layer.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `req` through the chain and the sender.
    pub async fn send(
        &self,
        req: Request<AxumBody>,
        cancel: &CancellationToken,
    ) -> TransportResult<Response<AxumBody>> {
        let ctx = CallContext::new(Arc::clone(&self.route), cancel.clone());
        Next::new(self.chain.interceptors(), self.sender.as_ref())
            .run(req, &ctx)
            .await
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("id", &self.id)
            .field("route", &self.route.name)
            .field("chain", &self.chain)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Whole-call timeout for `route`.
///
/// With QoS on, the outer deadline must not fire before the resilience
/// deadline; when it would, it is raised to twice the QoS timeout.
pub fn route_timeout(route: &Route, default_timeout: Duration) -> Duration {
    let timeout = route.timeout.unwrap_or(default_timeout);
    match route.qos.timeout {
        Some(qos_timeout) if route.qos.use_qos && !qos_timeout.is_zero() && timeout <= qos_timeout => {
            let doubled = qos_timeout.saturating_mul(2);
            tracing::warn!(
                route = %route.name,
                route_timeout_ms = timeout.as_millis() as u64,
                qos_timeout_ms = qos_timeout.as_millis() as u64,
                applied_ms = doubled.as_millis() as u64,
                explicit = route.timeout.is_some(),
                "Route timeout does not exceed the QoS timeout, using twice the QoS timeout instead"
            );
            doubled
        }
        _ => timeout,
    }
}

pub struct TransportPool {
    transports: scc::HashMap<RouteKey, Arc<Transport>>,
    chain_builder: HandlerChainBuilder,
    senders: Arc<dyn SenderFactory>,
    settings: DispatchSettings,
    next_id: AtomicU64,
}

impl TransportPool {
    pub fn new(
        registry: InterceptorRegistry,
        senders: Arc<dyn SenderFactory>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            transports: scc::HashMap::new(),
            chain_builder: HandlerChainBuilder::new(registry),
            senders,
            settings,
            next_id: AtomicU64::new(1),
        }
    }

    /// Cached transport for `route`, built on first use.
    ///
    /// Concurrent callers for the same route wait on the map entry while the
    /// first one builds, so construction happens once.
    ///
    /// # Errors
    /// Construction failures are returned and nothing is cached.
    pub async fn get_or_create(
        &self,
        route: &Arc<Route>,
    ) -> Result<Arc<Transport>, TransportBuildError> {
        match self.transports.entry_async(RouteKey::new(route)).await {
            Entry::Occupied(existing) => Ok(Arc::clone(existing.get())),
            Entry::Vacant(vacant) => {
                let transport = Arc::new(self.build(route)?);
                vacant.insert_entry(Arc::clone(&transport));
                Ok(transport)
            }
        }
    }

    /// Drop every cached transport. Requests already holding one finish
    /// normally; the next request per route builds a fresh transport.
    pub async fn clear(&self) {
        let cached = self.transports.len();
        self.transports.clear_async().await;
        tracing::info!(transports = cached, "Cleared transport pool");
    }

    /// Swap the interceptor registry and drop every cached transport.
    pub async fn reload(&self, registry: InterceptorRegistry) {
        self.chain_builder.replace_registry(registry);
        self.clear().await;
    }

    pub fn len(&self) -> usize {
        self.transports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    fn build(&self, route: &Arc<Route>) -> Result<Transport, TransportBuildError> {
        let sender = self.senders.create(route)?;
        let timeout = route_timeout(route, self.settings.default_timeout);
        let chain = self
            .chain_builder
            .build(route)
            .wrapped_in(Arc::new(TimeoutInterceptor::new(timeout)));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            route = %route.name,
            transport_id = id,
            timeout_ms = timeout.as_millis() as u64,
            chain = ?chain,
            "Created transport"
        );
        increment_transports_created(&route.name);

        Ok(Transport {
            id,
            route: Arc::clone(route),
            sender,
            chain,
            timeout,
        })
    }
}

impl fmt::Debug for TransportPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportPool")
            .field("transports", &self.transports.len())
            .field("settings", &self.settings)
            .finish()
    }
}
