use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Result, WrapErr};

use crate::{
    config::{
        models::{DispatchConfig, DispatchSettings},
        validation::RouteValidator,
    },
    core::route::Route,
};

/// Prefix of environment overrides, e.g. `AXON_DISPATCH__DEFAULT_TIMEOUT=30s`.
pub const ENV_PREFIX: &str = "AXON_DISPATCH";

/// Load configuration from a file using the config crate
/// Supports multiple formats: YAML, JSON, TOML, etc.
pub async fn load_config(config_path: &str) -> Result<DispatchConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously
pub fn load_config_sync(config_path: &str) -> Result<DispatchConfig> {
    let config_path = Path::new(config_path);

    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        _ => FileFormat::Yaml,
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .wrap_err_with(|| format!("Failed to build config from {}", config_path.display()))?;

    let dispatch_config: DispatchConfig = settings.try_deserialize().wrap_err_with(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(dispatch_config)
}

/// Load and validate, producing runtime settings and routes.
pub async fn load_routes(config_path: &str) -> Result<(DispatchSettings, Vec<Route>)> {
    let dispatch_config = load_config(config_path).await?;
    let (settings, routes) = RouteValidator::validate(&dispatch_config)
        .wrap_err_with(|| format!("Invalid dispatch configuration in {config_path}"))?;

    tracing::info!(
        path = config_path,
        routes = routes.len(),
        default_timeout_ms = settings.default_timeout.as_millis() as u64,
        "Loaded dispatch configuration"
    );
    Ok((settings, routes))
}
