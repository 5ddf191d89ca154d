//! Lightweight metrics helpers for the dispatch core.
//!
//! Functions here wrap the `metrics` crate macros. No exporter is embedded;
//! the host application installs any compatible recorder.
//!
//! Provided metrics:
//! * `axon_dispatch_requests_total` (counter, labels: route, outcome)
//! * `axon_dispatch_duration_seconds` (histogram, labels: route)
//! * `axon_transports_created_total` (counter, labels: route)
//! * `axon_circuit_state` (gauge per route: 0 closed, 1 open, 2 half-open)
use std::time::Duration;

use metrics::{Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::Lazy;

use crate::core::circuit_breaker::CircuitState;

pub const AXON_DISPATCH_REQUESTS_TOTAL: &str = "axon_dispatch_requests_total";
pub const AXON_DISPATCH_DURATION_SECONDS: &str = "axon_dispatch_duration_seconds";
pub const AXON_TRANSPORTS_CREATED_TOTAL: &str = "axon_transports_created_total";
pub const AXON_CIRCUIT_STATE: &str = "axon_circuit_state";

/// Outcome label for a dispatch that produced a response.
pub const OUTCOME_SUCCESS: &str = "success";

static DESCRIBE: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        AXON_DISPATCH_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of requests dispatched downstream, by outcome."
    );
    describe_histogram!(
        AXON_DISPATCH_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of downstream dispatches including interceptors."
    );
    describe_counter!(
        AXON_TRANSPORTS_CREATED_TOTAL,
        Unit::Count,
        "Number of route transports constructed."
    );
    describe_gauge!(
        AXON_CIRCUIT_STATE,
        "Circuit breaker state per route (0 closed, 1 open, 2 half-open)."
    );
});

/// Register metric descriptions with the installed recorder. Idempotent.
pub fn describe_metrics() {
    Lazy::force(&DESCRIBE);
}

/// Count one dispatch. `outcome` is [`OUTCOME_SUCCESS`] or an error kind label.
pub fn increment_dispatch_total(route: &str, outcome: &'static str) {
    describe_metrics();
    counter!(
        AXON_DISPATCH_REQUESTS_TOTAL,
        "route" => route.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_dispatch_duration(route: &str, duration: Duration) {
    histogram!(AXON_DISPATCH_DURATION_SECONDS, "route" => route.to_string())
        .record(duration.as_secs_f64());
}

pub fn increment_transports_created(route: &str) {
    describe_metrics();
    counter!(AXON_TRANSPORTS_CREATED_TOTAL, "route" => route.to_string()).increment(1);
}

pub fn set_circuit_state(route: &str, state: CircuitState) {
    gauge!(AXON_CIRCUIT_STATE, "route" => route.to_string()).set(state.as_gauge());
}
