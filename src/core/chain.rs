//! Composition of a route's interceptor chain.
//!
//! Order, outermost first:
//! 1. global interceptors the route does not name, in registration order
//! 2. interceptors named in `interceptor_order`, in that order
//! 3. tracing, when the route enables it
//! 4. the resilience slot: deadline + breaker, or a no-op marker
use std::{collections::HashSet, fmt, sync::Arc};

use arc_swap::ArcSwap;

use crate::{
    adapters::interceptors::{NoResilience, ResilienceInterceptor, TracingInterceptor},
    core::route::Route,
    ports::interceptor::{Interceptor, InterceptorRegistry},
};

/// An ordered, immutable interceptor list.
#[derive(Clone, Default)]
pub struct HandlerChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl HandlerChain {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self { interceptors }
    }

    /// Same chain with `outer` placed in front of every other layer.
    pub fn wrapped_in(mut self, outer: Arc<dyn Interceptor>) -> Self {
        self.interceptors.insert(0, outer);
        self
    }

    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.interceptors
    }

    pub fn names(&self) -> Vec<&str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

impl fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Resolves interceptor names against the current registry snapshot.
pub struct HandlerChainBuilder {
    registry: ArcSwap<InterceptorRegistry>,
}

impl HandlerChainBuilder {
    pub fn new(registry: InterceptorRegistry) -> Self {
        Self {
            registry: ArcSwap::from_pointee(registry),
        }
    }

    pub fn registry(&self) -> Arc<InterceptorRegistry> {
        self.registry.load_full()
    }

    /// Swap the registry. Chains built earlier keep their interceptors.
    pub fn replace_registry(&self, registry: InterceptorRegistry) {
        self.registry.store(Arc::new(registry));
    }

    /// Build the chain for `route`. Names missing from the registry are
    /// logged and skipped.
    pub fn build(&self, route: &Route) -> HandlerChain {
        let registry = self.registry.load();
        let listed: HashSet<&str> = route.interceptor_order.iter().map(String::as_str).collect();
        let mut interceptors: Vec<Arc<dyn Interceptor>> = registry
            .globals()
            .filter(|global| !listed.contains(global.name()))
            .map(|global| global.create(route))
            .collect();

        let mut seen = HashSet::new();
        for name in &route.interceptor_order {
            if !seen.insert(name.as_str()) {
                continue;
            }
            match registry.get(name) {
                Some(entry) => interceptors.push(entry.create(route)),
                None => tracing::warn!(
                    route = %route.name,
                    interceptor = %name,
                    "Interceptor is not registered, skipping it"
                ),
            }
        }

        if route.handler_options.use_tracing {
            interceptors.push(match registry.tracing_factory() {
                Some(factory) => factory(route),
                None => Arc::new(TracingInterceptor),
            });
        }

        interceptors.push(if route.qos.use_qos {
            match registry.resilience_factory() {
                Some(factory) => factory(route),
                None => Arc::new(ResilienceInterceptor::new(route)),
            }
        } else {
            Arc::new(NoResilience)
        });

        let chain = HandlerChain::new(interceptors);
        tracing::debug!(route = %route.name, chain = ?chain, "Built interceptor chain");
        chain
    }
}

impl fmt::Debug for HandlerChainBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerChainBuilder")
            .field("registry", &self.registry.load())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body as AxumBody;
    use http::{Request, Response};

    use super::*;
    use crate::{
        core::{error::TransportResult, route::QosOptions},
        ports::interceptor::{CallContext, Next},
    };

    struct Named(String);

    #[async_trait]
    impl Interceptor for Named {
        fn name(&self) -> &str {
            &self.0
        }

        async fn handle(
            &self,
            req: Request<AxumBody>,
            ctx: &CallContext,
            next: Next<'_>,
        ) -> TransportResult<Response<AxumBody>> {
            next.run(req, ctx).await
        }
    }

    fn named(name: &'static str) -> impl Fn(&Route) -> Arc<dyn Interceptor> + Send + Sync {
        move |_: &Route| -> Arc<dyn Interceptor> { Arc::new(Named(name.to_string())) }
    }

    fn qos_on() -> QosOptions {
        QosOptions {
            use_qos: true,
            timeout: Some(Duration::from_millis(200)),
            exceptions_allowed_before_breaking: 3,
            duration_of_break: Duration::from_secs(1),
            break_on_server_errors: false,
        }
    }

    #[test]
    fn test_route_order_wins_over_registration_order() {
        let registry = InterceptorRegistry::builder()
            .route_scoped("B", named("B"))
            .route_scoped("A", named("A"))
            .build()
            .unwrap();
        let builder = HandlerChainBuilder::new(registry);
        let route = Route::builder("/orders")
            .interceptor("A")
            .interceptor("B")
            .use_tracing(true)
            .qos(qos_on())
            .build();

        let chain = builder.build(&route);
        assert_eq!(chain.names(), vec!["A", "B", "tracing", "resilience"]);
    }

    #[test]
    fn test_unlisted_globals_come_first() {
        let registry = InterceptorRegistry::builder()
            .global("audit", named("audit"))
            .route_scoped("auth", named("auth"))
            .global("metrics", named("metrics"))
            .global("headers", named("headers"))
            .build()
            .unwrap();
        let builder = HandlerChainBuilder::new(registry);
        // "headers" is global but listed, so the route places it.
        let route = Route::builder("/orders")
            .interceptor("auth")
            .interceptor("headers")
            .build();

        let chain = builder.build(&route);
        assert_eq!(
            chain.names(),
            vec!["audit", "metrics", "auth", "headers", "no_resilience"]
        );
    }

    #[test]
    fn test_unknown_and_duplicate_names_are_skipped() {
        let registry = InterceptorRegistry::builder()
            .route_scoped("auth", named("auth"))
            .route_scoped("unused", named("unused"))
            .build()
            .unwrap();
        let builder = HandlerChainBuilder::new(registry);
        let route = Route::builder("/orders")
            .interceptor("auth")
            .interceptor("ghost")
            .interceptor("auth")
            .build();

        let chain = builder.build(&route);
        assert_eq!(chain.names(), vec!["auth", "no_resilience"]);
    }

    #[test]
    fn test_registry_overrides_and_replacement() {
        let registry = InterceptorRegistry::builder()
            .tracing(named("otel"))
            .resilience(named("bulkhead"))
            .build()
            .unwrap();
        let builder = HandlerChainBuilder::new(registry);
        let route = Route::builder("/orders")
            .use_tracing(true)
            .qos(qos_on())
            .build();
        assert_eq!(builder.build(&route).names(), vec!["otel", "bulkhead"]);

        builder.replace_registry(InterceptorRegistry::empty());
        assert_eq!(
            builder.build(&route).names(),
            vec!["tracing", "resilience"]
        );
    }
}
