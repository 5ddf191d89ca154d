use std::time::Instant;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use http::{HeaderValue, Request, Response};
use tracing::Instrument;

use crate::{
    core::error::TransportResult,
    ports::interceptor::{CallContext, Interceptor, Next},
    tracing_setup::create_downstream_span,
};

pub const TRACING_INTERCEPTOR: &str = "tracing";

/// Correlation header forwarded downstream.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Opens a `downstream_request` span around the rest of the chain and makes
/// sure the downstream sees a request id.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInterceptor;

#[async_trait]
impl Interceptor for TracingInterceptor {
    fn name(&self) -> &str {
        TRACING_INTERCEPTOR
    }

    async fn handle(
        &self,
        mut req: Request<AxumBody>,
        ctx: &CallContext,
        next: Next<'_>,
    ) -> TransportResult<Response<AxumBody>> {
        let request_id = match req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            Some(existing) => existing.to_string(),
            None => {
                let generated = ctx.call_id().to_string();
                if let Ok(value) = HeaderValue::from_str(&generated) {
                    req.headers_mut().insert(REQUEST_ID_HEADER, value);
                }
                generated
            }
        };

        let span = create_downstream_span(
            &ctx.route().name,
            req.method().as_str(),
            &req.uri().to_string(),
            &request_id,
        );
        let started = Instant::now();
        let result = next.run(req, ctx).instrument(span.clone()).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        span.record("duration_ms", elapsed_ms);
        match &result {
            Ok(response) => {
                span.record("http.status_code", response.status().as_u16());
                span.in_scope(|| tracing::debug!(status = response.status().as_u16(), elapsed_ms, "Downstream responded"));
            }
            Err(error) => {
                span.in_scope(|| tracing::debug!(error = %error, elapsed_ms, "Downstream call failed"));
            }
        }
        result
    }
}
