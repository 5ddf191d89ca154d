pub mod chain;
pub mod circuit_breaker;
pub mod dispatcher;
pub mod error;
pub mod error_mapper;
pub mod pool;
pub mod route;

pub use chain::{HandlerChain, HandlerChainBuilder};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use dispatcher::{DispatchResult, Dispatcher};
pub use error::{DispatchError, ErrorKind, TransportBuildError, TransportError};
pub use error_mapper::ErrorMapper;
pub use pool::{Transport, TransportPool};
pub use route::{DownstreamAddress, HttpHandlerOptions, QosOptions, Route, RouteKey};
