use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::body::Body as AxumBody;
use futures_util::StreamExt;
use http::{Request, Response, header};
use http_body_util::BodyExt;
use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore},
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        error::{TransportBuildError, TransportError, TransportResult},
        route::Route,
    },
    ports::sender::{HttpSender, SenderFactory},
};

const USER_AGENT: &str = "Axon-Gateway/1.0";
const MAX_REDIRECTS: usize = 10;

/// Pooled downstream sender backed by `reqwest`.
///
/// Responsibilities:
/// * Owns one connection pool per route, configured from the route's handler options
/// * Replaces that pool once it is older than the pooled connection lifetime
/// * Enforces the per-server connection limit with one semaphore per authority
/// * Races every send against the caller's cancellation token
/// * Streams the downstream body back without buffering it
pub struct ReqwestSender {
    route: Route,
    pool: ArcSwap<ClientGeneration>,
    limiter: Option<ConnectionLimiter>,
}

/// A client and the moment it was built. Connections never outlive their client.
struct ClientGeneration {
    client: reqwest::Client,
    built_at: Instant,
    generation: u64,
}

impl ReqwestSender {
    /// Build a sender for `route`.
    pub fn new(route: &Route) -> Result<Self, TransportBuildError> {
        let options = &route.handler_options;

        if options.max_connections_per_server == Some(0) {
            return Err(TransportBuildError::InvalidOptions {
                route: route.name.clone(),
                message: "max_connections_per_server must be greater than zero".to_string(),
            });
        }

        if route.dangerous_accept_any_server_certificate {
            tracing::warn!(
                route = %route.name,
                "You have ignored all SSL warnings by accepting any server certificate for this route"
            );
        }

        let client = build_client(route)?;

        tracing::debug!(
            route = %route.name,
            redirects = options.allow_auto_redirect,
            cookies = options.use_cookie_container,
            proxy = options.use_proxy,
            max_connections = ?options.max_connections_per_server,
            lifetime_ms = options.pooled_connection_lifetime.as_millis() as u64,
            "Created downstream HTTP client"
        );

        Ok(Self {
            route: route.clone(),
            pool: ArcSwap::from_pointee(ClientGeneration {
                client,
                built_at: Instant::now(),
                generation: 0,
            }),
            limiter: options.max_connections_per_server.map(ConnectionLimiter::new),
        })
    }

    /// Current client, rebuilt first when its pool has reached the
    /// configured lifetime. A zero lifetime keeps the first client.
    fn client(&self) -> TransportResult<reqwest::Client> {
        let lifetime = self.route.handler_options.pooled_connection_lifetime;
        let current = self.pool.load();
        if lifetime.is_zero() || current.built_at.elapsed() < lifetime {
            return Ok(current.client.clone());
        }

        let fresh = Arc::new(ClientGeneration {
            client: build_client(&self.route).map_err(TransportError::other)?,
            built_at: Instant::now(),
            generation: current.generation + 1,
        });
        let previous = self.pool.compare_and_swap(&current, Arc::clone(&fresh));
        if Arc::ptr_eq(&previous, &current) {
            tracing::debug!(
                route = %self.route.name,
                generation = fresh.generation,
                "Recycled downstream connection pool"
            );
            return Ok(fresh.client.clone());
        }
        // Another caller recycled first.
        Ok(self.pool.load().client.clone())
    }

    async fn execute(&self, req: Request<AxumBody>) -> TransportResult<Response<AxumBody>> {
        let Some(authority) = req.uri().authority().map(|a| a.to_string()) else {
            tracing::error!(route = %self.route.name, uri = %req.uri(), "Outgoing URI has no host");
            return Err(TransportError::invalid_request(format!(
                "Outgoing URI has no host: {}",
                req.uri()
            )));
        };

        let permit = match &self.limiter {
            Some(limiter) => Some(limiter.acquire(&authority).await?),
            None => None,
        };

        let (mut parts, body) = req.into_parts();
        // The client derives these from the target URL and the buffered body.
        parts.headers.remove(header::HOST);
        parts.headers.remove(header::CONTENT_LENGTH);
        parts.headers.remove(header::TRANSFER_ENCODING);

        let body = body
            .collect()
            .await
            .map_err(TransportError::other)?
            .to_bytes();

        let mut outgoing = self
            .client()?
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers);
        if !body.is_empty() {
            outgoing = outgoing.body(body);
        }

        let response = outgoing.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        let version = response.version();
        let mut headers = response.headers().clone();
        // The body is re-framed by whoever writes it upstream.
        headers.remove(header::TRANSFER_ENCODING);

        // Keep the connection slot until the body has been consumed or dropped.
        let stream = response.bytes_stream().map(move |chunk| {
            let _slot = &permit;
            chunk
        });

        let mut downstream = Response::new(AxumBody::from_stream(stream));
        *downstream.status_mut() = status;
        *downstream.version_mut() = version;
        *downstream.headers_mut() = headers;
        Ok(downstream)
    }
}

#[async_trait]
impl HttpSender for ReqwestSender {
    async fn send(
        &self,
        req: Request<AxumBody>,
        cancel: &CancellationToken,
    ) -> TransportResult<Response<AxumBody>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Canceled),
            result = self.execute(req) => result,
        }
    }
}

fn build_client(route: &Route) -> Result<reqwest::Client, TransportBuildError> {
    let options = &route.handler_options;
    let redirect = if options.allow_auto_redirect {
        reqwest::redirect::Policy::limited(MAX_REDIRECTS)
    } else {
        reqwest::redirect::Policy::none()
    };

    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(redirect)
        .cookie_store(options.use_cookie_container)
        .pool_idle_timeout(options.pooled_connection_lifetime)
        .danger_accept_invalid_certs(route.dangerous_accept_any_server_certificate);
    if !options.use_proxy {
        builder = builder.no_proxy();
    }
    if let Some(max) = options.max_connections_per_server {
        builder = builder.pool_max_idle_per_host(max);
    }

    builder.build().map_err(|e| TransportBuildError::Client {
        route: route.name.clone(),
        message: e.to_string(),
        source: Some(Box::new(e)),
    })
}

fn map_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_connect() {
        TransportError::connect(error)
    } else if error.is_builder() {
        TransportError::InvalidRequest {
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    } else {
        TransportError::other(error)
    }
}

/// Bounds concurrent requests per downstream `host:port`.
struct ConnectionLimiter {
    max: usize,
    servers: scc::HashMap<String, Arc<Semaphore>>,
}

impl ConnectionLimiter {
    fn new(max: usize) -> Self {
        Self {
            max,
            servers: scc::HashMap::new(),
        }
    }

    async fn acquire(&self, authority: &str) -> TransportResult<OwnedSemaphorePermit> {
        let semaphore = self
            .servers
            .entry_async(authority.to_string())
            .await
            .or_insert_with(|| Arc::new(Semaphore::new(self.max)))
            .get()
            .clone();
        semaphore
            .acquire_owned()
            .await
            .map_err(TransportError::other)
    }
}

/// Creates one [`ReqwestSender`] per transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReqwestSenderFactory;

impl SenderFactory for ReqwestSenderFactory {
    fn create(&self, route: &Route) -> Result<Arc<dyn HttpSender>, TransportBuildError> {
        Ok(Arc::new(ReqwestSender::new(route)?))
    }
}
