//! Interceptor contract and the registry of named interceptor factories.
//!
//! An interceptor receives the outgoing request, a [`CallContext`] and the
//! [`Next`] continuation. It may rewrite the request, short-circuit with an
//! error, or await `next.run(..)` and inspect the response.
//!
//! Interceptors are resolved by name from an immutable
//! [`InterceptorRegistry`] snapshot. Two roles are registered by the host:
//! * **global** interceptors apply to every route;
//! * **route-scoped** interceptors apply only when a route names them in its
//!   `interceptor_order`.
use std::{fmt, sync::Arc};

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use http::{Request, Response};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    core::{error::TransportResult, route::Route},
    ports::sender::HttpSender,
};

/// Per-call state handed to every interceptor.
#[derive(Debug, Clone)]
pub struct CallContext {
    route: Arc<Route>,
    cancel: CancellationToken,
    call_id: Uuid,
}

impl CallContext {
    pub fn new(route: Arc<Route>, cancel: CancellationToken) -> Self {
        Self {
            route,
            cancel,
            call_id: Uuid::new_v4(),
        }
    }

    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Identifier of this dispatch, shared by every layer of the chain.
    pub fn call_id(&self) -> Uuid {
        self.call_id
    }

    /// Same call, observed through a different (usually child) token.
    pub fn with_cancellation(&self, cancel: CancellationToken) -> Self {
        Self {
            route: Arc::clone(&self.route),
            cancel,
            call_id: self.call_id,
        }
    }
}

/// One layer of the outbound pipeline.
#[async_trait]
pub trait Interceptor: Send + Sync + 'static {
    /// Stable name, used for ordering and diagnostics.
    fn name(&self) -> &str;

    async fn handle(
        &self,
        req: Request<AxumBody>,
        ctx: &CallContext,
        next: Next<'_>,
    ) -> TransportResult<Response<AxumBody>>;
}

/// The rest of the chain, ending in the sender.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Interceptor>],
    sender: &'a dyn HttpSender,
}

impl<'a> Next<'a> {
    pub fn new(chain: &'a [Arc<dyn Interceptor>], sender: &'a dyn HttpSender) -> Self {
        Self { chain, sender }
    }

    pub async fn run(
        self,
        req: Request<AxumBody>,
        ctx: &CallContext,
    ) -> TransportResult<Response<AxumBody>> {
        match self.chain.split_first() {
            Some((head, rest)) => head.handle(req, ctx, Next::new(rest, self.sender)).await,
            None => self.sender.send(req, ctx.cancellation()).await,
        }
    }
}

/// Creates an interceptor instance for a route.
pub type InterceptorFactory = Arc<dyn Fn(&Route) -> Arc<dyn Interceptor> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptorScope {
    Global,
    RouteScoped,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    #[error("Interceptor name must not be empty")]
    EmptyName,

    #[error("Interceptor '{0}' is registered more than once")]
    DuplicateName(String),
}

#[derive(Clone)]
pub struct RegisteredInterceptor {
    name: String,
    scope: InterceptorScope,
    factory: InterceptorFactory,
}

impl RegisteredInterceptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> InterceptorScope {
        self.scope
    }

    pub fn create(&self, route: &Route) -> Arc<dyn Interceptor> {
        (self.factory)(route)
    }
}

impl fmt::Debug for RegisteredInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredInterceptor")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Immutable snapshot of the interceptors known to the gateway.
#[derive(Clone, Default)]
pub struct InterceptorRegistry {
    entries: Vec<RegisteredInterceptor>,
    tracing: Option<InterceptorFactory>,
    resilience: Option<InterceptorFactory>,
}

impl InterceptorRegistry {
    pub fn builder() -> InterceptorRegistryBuilder {
        InterceptorRegistryBuilder::default()
    }

    /// An empty registry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Globals in registration order.
    pub fn globals(&self) -> impl Iterator<Item = &RegisteredInterceptor> {
        self.entries
            .iter()
            .filter(|entry| entry.scope == InterceptorScope::Global)
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredInterceptor> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Overrides the built-in tracing interceptor when set.
    pub fn tracing_factory(&self) -> Option<&InterceptorFactory> {
        self.tracing.as_ref()
    }

    /// Overrides the built-in resilience interceptor when set.
    pub fn resilience_factory(&self) -> Option<&InterceptorFactory> {
        self.resilience.as_ref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for InterceptorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorRegistry")
            .field("entries", &self.entries)
            .field("custom_tracing", &self.tracing.is_some())
            .field("custom_resilience", &self.resilience.is_some())
            .finish()
    }
}

#[derive(Default)]
pub struct InterceptorRegistryBuilder {
    entries: Vec<RegisteredInterceptor>,
    tracing: Option<InterceptorFactory>,
    resilience: Option<InterceptorFactory>,
}

impl InterceptorRegistryBuilder {
    pub fn global<F>(self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Route) -> Arc<dyn Interceptor> + Send + Sync + 'static,
    {
        self.register(name.into(), InterceptorScope::Global, Arc::new(factory))
    }

    pub fn route_scoped<F>(self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Route) -> Arc<dyn Interceptor> + Send + Sync + 'static,
    {
        self.register(name.into(), InterceptorScope::RouteScoped, Arc::new(factory))
    }

    pub fn tracing<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Route) -> Arc<dyn Interceptor> + Send + Sync + 'static,
    {
        self.tracing = Some(Arc::new(factory));
        self
    }

    pub fn resilience<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Route) -> Arc<dyn Interceptor> + Send + Sync + 'static,
    {
        self.resilience = Some(Arc::new(factory));
        self
    }

    fn register(
        mut self,
        name: String,
        scope: InterceptorScope,
        factory: InterceptorFactory,
    ) -> Self {
        self.entries.push(RegisteredInterceptor {
            name,
            scope,
            factory,
        });
        self
    }

    /// # Errors
    /// Fails on an empty or duplicated interceptor name.
    pub fn build(self) -> Result<InterceptorRegistry, RegistryError> {
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.name.trim().is_empty() {
                return Err(RegistryError::EmptyName);
            }
            if self.entries[..index].iter().any(|e| e.name == entry.name) {
                return Err(RegistryError::DuplicateName(entry.name.clone()));
            }
        }
        Ok(InterceptorRegistry {
            entries: self.entries,
            tracing: self.tracing,
            resilience: self.resilience,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl Interceptor for Named {
        fn name(&self) -> &str {
            self.0
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

    #[test]
    fn test_registry_rejects_duplicates() {
        let result = InterceptorRegistry::builder()
            .global("auth", |_| Arc::new(Named("auth")))
            .route_scoped("auth", |_| Arc::new(Named("auth")))
            .build();
        assert_eq!(
            result.err(),
            Some(RegistryError::DuplicateName("auth".to_string()))
        );

        let result = InterceptorRegistry::builder()
            .global(" ", |_| Arc::new(Named("blank")))
            .build();
        assert_eq!(result.err(), Some(RegistryError::EmptyName));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = InterceptorRegistry::builder()
            .route_scoped("headers", |_| Arc::new(Named("headers")))
            .global("audit", |_| Arc::new(Named("audit")))
            .global("metrics", |_| Arc::new(Named("metrics")))
            .build()
            .unwrap();

        let globals: Vec<_> = registry.globals().map(|g| g.name()).collect();
        assert_eq!(globals, vec!["audit", "metrics"]);
        assert_eq!(
            registry.get("headers").map(|e| e.scope()),
            Some(InterceptorScope::RouteScoped)
        );
        assert!(registry.get("missing").is_none());
        assert!(registry.tracing_factory().is_none());
        assert_eq!(registry.len(), 3);
    }
}
