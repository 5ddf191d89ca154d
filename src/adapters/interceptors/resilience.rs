//! Quality-of-service layer: the per-route circuit breaker wrapping the
//! per-attempt deadline.
//!
//! The deadline runs inside breaker admission, so a call that times out is
//! recorded as a breaker failure. Caller cancellation is neutral.
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use http::{Request, Response};

use super::timeout::with_deadline;
use crate::{
    core::{
        circuit_breaker::CircuitBreaker,
        error::{TransportError, TransportResult},
        route::Route,
    },
    ports::interceptor::{CallContext, Interceptor, Next},
};

pub const RESILIENCE_INTERCEPTOR: &str = "resilience";
pub const NO_RESILIENCE_INTERCEPTOR: &str = "no_resilience";

/// Break durations must lie strictly between these bounds.
pub const MIN_BREAK_DURATION: Duration = Duration::from_millis(500);
pub const MAX_BREAK_DURATION: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_BREAK_DURATION: Duration = Duration::from_secs(5);

/// Break duration actually applied for a configured value.
pub fn effective_break_duration(configured: Duration) -> Duration {
    if configured > MIN_BREAK_DURATION && configured < MAX_BREAK_DURATION {
        configured
    } else {
        DEFAULT_BREAK_DURATION
    }
}

pub struct ResilienceInterceptor {
    breaker: Option<CircuitBreaker>,
    timeout: Option<Duration>,
    break_on_server_errors: bool,
}

impl ResilienceInterceptor {
    /// Build the layer from the route's QoS options, normalizing invalid
    /// values the way the gateway always has.
    pub fn new(route: &Route) -> Self {
        let qos = &route.qos;

        let breaker = if qos.exceptions_allowed_before_breaking == 0 {
            tracing::error!(
                route = %route.name,
                "Circuit breaker disabled: exceptions_allowed_before_breaking must be greater than zero"
            );
            None
        } else {
            let break_duration = effective_break_duration(qos.duration_of_break);
            if break_duration != qos.duration_of_break {
                tracing::warn!(
                    route = %route.name,
                    configured_ms = qos.duration_of_break.as_millis() as u64,
                    applied_ms = break_duration.as_millis() as u64,
                    "duration_of_break outside ({:?}, {:?}), using default",
                    MIN_BREAK_DURATION,
                    MAX_BREAK_DURATION
                );
            }
            Some(CircuitBreaker::new(
                route.name.clone(),
                qos.exceptions_allowed_before_breaking,
                break_duration,
            ))
        };

        let timeout = match qos.timeout {
            Some(timeout) if timeout.is_zero() => {
                tracing::error!(route = %route.name, "QoS timeout disabled: value must be greater than zero");
                None
            }
            other => other,
        };

        Self {
            breaker,
            timeout,
            break_on_server_errors: qos.break_on_server_errors,
        }
    }

    pub fn breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn attempt(
        &self,
        req: Request<AxumBody>,
        ctx: &CallContext,
        next: Next<'_>,
    ) -> TransportResult<Response<AxumBody>> {
        match self.timeout {
            Some(deadline) => {
                with_deadline(deadline, ctx.cancellation(), |token| async move {
                    let ctx = ctx.with_cancellation(token);
                    next.run(req, &ctx).await
                })
                .await
            }
            None => next.run(req, ctx).await,
        }
    }
}

#[async_trait]
impl Interceptor for ResilienceInterceptor {
    fn name(&self) -> &str {
        RESILIENCE_INTERCEPTOR
    }

    async fn handle(
        &self,
        req: Request<AxumBody>,
        ctx: &CallContext,
        next: Next<'_>,
    ) -> TransportResult<Response<AxumBody>> {
        let Some(breaker) = &self.breaker else {
            return self.attempt(req, ctx, next).await;
        };

        let permit = breaker.try_acquire()?;
        let result = self.attempt(req, ctx, next).await;
        match &result {
            Ok(response) if self.break_on_server_errors && response.status().is_server_error() => {
                tracing::debug!(
                    route = %ctx.route().name,
                    status = response.status().as_u16(),
                    "Server error counted as circuit failure"
                );
                permit.fail();
            }
            Ok(_) => permit.succeed(),
            // The caller went away; this says nothing about the downstream.
            Err(TransportError::Canceled) => drop(permit),
            Err(_) => permit.fail(),
        }
        result
    }
}

/// Placeholder occupying the resilience slot when QoS is off.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResilience;

#[async_trait]
impl Interceptor for NoResilience {
    fn name(&self) -> &str {
        NO_RESILIENCE_INTERCEPTOR
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
