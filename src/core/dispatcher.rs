//! Entry point of the dispatch core.
//!
//! [`Dispatcher::send`] takes a request already matched to a route, runs it
//! through the route's cached transport and turns every failure into a
//! classified [`DispatchError`]. Only transport construction errors, which
//! point at a configuration defect, escape as `Err`.
use std::{sync::Arc, time::Instant};

use axum::body::Body as AxumBody;
use http::{Request, Response};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    adapters::http_client::ReqwestSenderFactory,
    config::models::DispatchSettings,
    core::{
        error::{DispatchError, TransportBuildError},
        error_mapper::ErrorMapper,
        pool::TransportPool,
        route::Route,
    },
    metrics::{OUTCOME_SUCCESS, increment_dispatch_total, record_dispatch_duration},
    ports::interceptor::InterceptorRegistry,
    tracing_setup::create_dispatch_span,
};

/// Outcome of one dispatch.
#[derive(Debug)]
pub enum DispatchResult {
    Success(Response<AxumBody>),
    Failure(DispatchError),
}

impl DispatchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchResult::Success(_))
    }

    pub fn error(&self) -> Option<&DispatchError> {
        match self {
            DispatchResult::Success(_) => None,
            DispatchResult::Failure(error) => Some(error),
        }
    }

    pub fn into_result(self) -> Result<Response<AxumBody>, DispatchError> {
        match self {
            DispatchResult::Success(response) => Ok(response),
            DispatchResult::Failure(error) => Err(error),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    pool: Arc<TransportPool>,
    mapper: ErrorMapper,
}

impl Dispatcher {
    pub fn new(pool: Arc<TransportPool>, mapper: ErrorMapper) -> Self {
        Self { pool, mapper }
    }

    /// A dispatcher backed by the reqwest sender and the built-in error rules.
    pub fn with_registry(registry: InterceptorRegistry, settings: DispatchSettings) -> Self {
        let pool = TransportPool::new(registry, Arc::new(ReqwestSenderFactory), settings);
        Self::new(Arc::new(pool), ErrorMapper::new())
    }

    pub fn pool(&self) -> &Arc<TransportPool> {
        &self.pool
    }

    pub fn error_mapper(&self) -> &ErrorMapper {
        &self.mapper
    }

    /// Send `request` to the route's downstream.
    ///
    /// # Errors
    /// Returns [`TransportBuildError`] when the route's transport cannot be
    /// constructed. Every other failure is a [`DispatchResult::Failure`].
    pub async fn send(
        &self,
        route: &Arc<Route>,
        request: Request<AxumBody>,
        cancel: &CancellationToken,
    ) -> Result<DispatchResult, TransportBuildError> {
        let span = create_dispatch_span(
            &route.name,
            request.method().as_str(),
            &request.uri().to_string(),
        );
        self.dispatch(route, request, cancel)
            .instrument(span)
            .await
    }

    async fn dispatch(
        &self,
        route: &Arc<Route>,
        request: Request<AxumBody>,
        cancel: &CancellationToken,
    ) -> Result<DispatchResult, TransportBuildError> {
        let transport = self.pool.get_or_create(route).await.inspect_err(|e| {
            tracing::error!(route = %route.name, error = %e, "Failed to build transport");
        })?;

        let started = Instant::now();
        let outcome = transport.send(request, cancel).await;
        let elapsed = started.elapsed();
        record_dispatch_duration(&route.name, elapsed);

        let span = tracing::Span::current();
        span.record("duration_ms", elapsed.as_millis() as u64);

        Ok(match outcome {
            Ok(response) => {
                increment_dispatch_total(&route.name, OUTCOME_SUCCESS);
                span.record("outcome", OUTCOME_SUCCESS);
                DispatchResult::Success(response)
            }
            Err(fault) => {
                let kind = self.mapper.map(&fault);
                let error = DispatchError::new(kind, fault);
                increment_dispatch_total(&route.name, kind.as_str());
                span.record("outcome", kind.as_str());
                tracing::warn!(
                    route = %route.name,
                    kind = %kind,
                    error = %error.detail(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Downstream dispatch failed"
                );
                DispatchResult::Failure(error)
            }
        })
    }
}
