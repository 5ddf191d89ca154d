pub mod http_client;
pub mod interceptors;

/// Re-export commonly used types from adapters
pub use http_client::{ReqwestSender, ReqwestSenderFactory};
