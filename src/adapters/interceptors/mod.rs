//! Built-in interceptors: the route timeout, tracing and the resilience slot.
pub mod resilience;
pub mod timeout;
pub mod tracing;

pub use resilience::{NoResilience, ResilienceInterceptor};
pub use timeout::{TimeoutInterceptor, with_deadline};
pub use self::tracing::TracingInterceptor;
