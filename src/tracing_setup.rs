//! Subscriber setup for hosts embedding the dispatcher, plus the spans the
//! dispatch path opens. The library itself never installs a subscriber.
use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging with JSON output
pub fn init_tracing() -> Result<()> {
    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(true)
                .with_target(true)
                .with_thread_ids(true),
        )
        .try_init()
        .wrap_err("Failed to install JSON tracing subscriber")?;

    tracing::info!("Dispatch structured logging initialized");
    Ok(())
}

/// Initialize console-friendly logging for development
pub fn init_console_tracing() -> Result<()> {
    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()
        .wrap_err("Failed to install console tracing subscriber")?;

    tracing::info!("Dispatch console logging initialized");
    Ok(())
}

/// Initialize tracing with an explicit filter directive and format.
pub fn init_tracing_with_config(level: &str, json_format: bool, include_spans: bool) -> Result<()> {
    let env_filter =
        EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}"))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true);

    if json_format {
        Registry::default()
            .with(env_filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(include_spans)
                    .with_span_list(include_spans),
            )
            .try_init()
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.with_ansi(true))
            .try_init()
    }
    .wrap_err("Failed to install tracing subscriber")?;

    tracing::info!(level, json_format, include_spans, "Dispatch logging initialized");
    Ok(())
}

/// Span covering one `Dispatcher::send`.
pub fn create_dispatch_span(route: &str, method: &str, uri: &str) -> tracing::Span {
    tracing::info_span!(
        "dispatch",
        route = route,
        http.method = method,
        http.uri = uri,
        outcome = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
}

/// Span covering the downstream leg as seen by the tracing interceptor.
pub fn create_downstream_span(
    route: &str,
    method: &str,
    uri: &str,
    request_id: &str,
) -> tracing::Span {
    tracing::info_span!(
        "downstream_request",
        route = route,
        http.method = method,
        http.uri = uri,
        request.id = request_id,
        http.status_code = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
}
