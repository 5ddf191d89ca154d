//! Deadline enforcement.
//!
//! A deadline runs the inner call with a child of the caller's cancellation
//! token. When the deadline expires the child is cancelled, which stops the
//! socket send, and the call fails with [`TransportError::TimedOut`]. If the
//! caller's own token fires first the call fails with
//! [`TransportError::Canceled`] instead, so the two stay distinguishable.
use std::{future::Future, time::Duration};

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use http::{Request, Response};
use tokio_util::sync::CancellationToken;

use crate::{
    core::error::{TransportError, TransportResult},
    ports::interceptor::{CallContext, Interceptor, Next},
};

pub const TIMEOUT_INTERCEPTOR: &str = "timeout";

/// Run `call` under `deadline`.
///
/// `call` receives the child token it must observe.
pub async fn with_deadline<F, Fut, T>(
    deadline: Duration,
    cancel: &CancellationToken,
    call: F,
) -> TransportResult<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = TransportResult<T>>,
{
    let child = cancel.child_token();
    let inner = call(child.clone());

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransportError::Canceled),
        outcome = tokio::time::timeout(deadline, inner) => match outcome {
            Ok(result) => result,
            Err(_) => {
                child.cancel();
                Err(TransportError::TimedOut { after: deadline })
            }
        },
    }
}

/// Outermost layer of every transport: the whole-call route timeout.
#[derive(Debug, Clone)]
pub struct TimeoutInterceptor {
    timeout: Duration,
}

impl TimeoutInterceptor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Interceptor for TimeoutInterceptor {
    fn name(&self) -> &str {
        TIMEOUT_INTERCEPTOR
    }

    async fn handle(
        &self,
        req: Request<AxumBody>,
        ctx: &CallContext,
        next: Next<'_>,
    ) -> TransportResult<Response<AxumBody>> {
        let result = with_deadline(self.timeout, ctx.cancellation(), |token| async move {
            let ctx = ctx.with_cancellation(token);
            next.run(req, &ctx).await
        })
        .await;

        if let Err(TransportError::TimedOut { after }) = &result {
            tracing::warn!(
                route = %ctx.route().name,
                call_id = %ctx.call_id(),
                timeout_ms = after.as_millis() as u64,
                "Downstream call exceeded route timeout"
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expiry_cancels_child() {
        let cancel = CancellationToken::new();
        let seen: Arc<Mutex<Option<CancellationToken>>> = Arc::default();
        let slot = seen.clone();

        let result: TransportResult<()> =
            with_deadline(Duration::from_millis(100), &cancel, |token| async move {
                *slot.lock().unwrap() = Some(token);
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(TransportError::TimedOut { after }) if after == Duration::from_millis(100)));
        let child = seen.lock().unwrap().take().unwrap();
        assert!(child.is_cancelled());
        // The caller's token is untouched by the deadline.
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_cancellation_wins_over_deadline() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result: TransportResult<()> =
            with_deadline(Duration::from_secs(1), &cancel, |token| async move {
                token.cancelled().await;
                Err(TransportError::Canceled)
            })
            .await;

        assert!(matches!(result, Err(TransportError::Canceled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_call_passes_through() {
        let cancel = CancellationToken::new();
        let result = with_deadline(Duration::from_secs(1), &cancel, |_| async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
