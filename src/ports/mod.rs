pub mod interceptor;
pub mod sender;
