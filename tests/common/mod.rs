// Shared fixtures for dispatch integration tests
#![allow(dead_code)]

use std::{
    io,
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axon_dispatch::{
    config::DispatchSettings,
    core::{
        Dispatcher, ErrorMapper, Route, TransportPool,
        error::{TransportBuildError, TransportError, TransportResult},
    },
    ports::{
        interceptor::{CallContext, Interceptor, InterceptorRegistry, Next},
        sender::{HttpSender, SenderFactory},
    },
};
use axum::{Router, body::Body};
use http::{Request, Response, StatusCode};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::MakeWriter;

/// What the scripted sender does for the next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Respond(u16),
    Refuse,
    /// Wait for cancellation, or give up after an hour.
    Hang,
}

/// Sender whose behavior can be switched between calls.
pub struct ScriptedSender {
    behavior: Mutex<Behavior>,
    calls: AtomicUsize,
}

impl ScriptedSender {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpSender for ScriptedSender {
    async fn send(
        &self,
        _req: Request<Body>,
        cancel: &CancellationToken,
    ) -> TransportResult<Response<Body>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            Behavior::Respond(status) => {
                let mut response = Response::new(Body::from("scripted"));
                *response.status_mut() = StatusCode::from_u16(status).unwrap();
                Ok(response)
            }
            Behavior::Refuse => Err(TransportError::connect(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
            Behavior::Hang => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(TransportError::Canceled),
                    _ = tokio::time::sleep(Duration::from_secs(3600)) => {
                        Ok(Response::new(Body::empty()))
                    }
                }
            }
        }
    }
}

/// Hands out the same sender for every route and counts constructions.
pub struct SharedSenderFactory {
    sender: Arc<dyn HttpSender>,
    built: AtomicUsize,
    build_delay: Duration,
}

impl SharedSenderFactory {
    pub fn new(sender: Arc<dyn HttpSender>) -> Arc<Self> {
        Self::with_build_delay(sender, Duration::ZERO)
    }

    /// Blocks the building thread for `build_delay` to widen race windows.
    pub fn with_build_delay(sender: Arc<dyn HttpSender>, build_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            sender,
            built: AtomicUsize::new(0),
            build_delay,
        })
    }

    pub fn built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }
}

impl SenderFactory for SharedSenderFactory {
    fn create(&self, _route: &Route) -> Result<Arc<dyn HttpSender>, TransportBuildError> {
        if !self.build_delay.is_zero() {
            std::thread::sleep(self.build_delay);
        }
        self.built.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.sender))
    }
}

/// Interceptor that appends its name to a shared log and passes the call on.
pub struct Recording {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl Recording {
    pub fn factory(
        name: &str,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> impl Fn(&Route) -> Arc<dyn Interceptor> + Send + Sync + 'static {
        let name = name.to_string();
        let log = Arc::clone(log);
        move |_: &Route| -> Arc<dyn Interceptor> {
            Arc::new(Recording {
                name: name.clone(),
                log: Arc::clone(&log),
            })
        }
    }
}

#[async_trait]
impl Interceptor for Recording {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        req: Request<Body>,
        ctx: &CallContext,
        next: Next<'_>,
    ) -> TransportResult<Response<Body>> {
        self.log.lock().unwrap().push(self.name.clone());
        next.run(req, ctx).await
    }
}

pub fn dispatcher_with(
    registry: InterceptorRegistry,
    factory: Arc<dyn SenderFactory>,
    mapper: ErrorMapper,
) -> Dispatcher {
    let pool = TransportPool::new(registry, factory, DispatchSettings::default());
    Dispatcher::new(Arc::new(pool), mapper)
}

pub fn request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Serve `router` on an ephemeral local port.
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Shared buffer that a fmt subscriber writes formatted events into.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` with a WARN-level subscriber installed and return what it logged.
pub fn capture_warnings<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .finish();
    let value = tracing::subscriber::with_default(subscriber, f);
    (value, buffer.contents())
}
