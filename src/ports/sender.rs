use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use http::{Request, Response};
use tokio_util::sync::CancellationToken;

use crate::core::{
    error::{TransportBuildError, TransportResult},
    route::Route,
};

/// HttpSender defines the port (interface) for the socket-level call to a
/// downstream server. It sits at the bottom of every interceptor chain.
#[async_trait]
pub trait HttpSender: Send + Sync + 'static {
    /// Send a request downstream.
    ///
    /// Implementations must stop waiting and return
    /// [`TransportError::Canceled`](crate::core::error::TransportError::Canceled)
    /// once `cancel` fires.
    async fn send(
        &self,
        req: Request<AxumBody>,
        cancel: &CancellationToken,
    ) -> TransportResult<Response<AxumBody>>;
}

/// Builds the pooled sender for a route. Called once per transport.
pub trait SenderFactory: Send + Sync + 'static {
    /// Create a sender honoring the route's handler options.
    ///
    /// # Errors
    /// Returns [`TransportBuildError`] when the options cannot be satisfied,
    /// e.g. the TLS backend refuses the configuration.
    fn create(&self, route: &Route) -> Result<Arc<dyn HttpSender>, TransportBuildError>;
}
