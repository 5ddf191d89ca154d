pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{load_config, load_routes};
pub use models::*;
pub use validation::{RouteValidator, ValidationError, ValidationResult};
