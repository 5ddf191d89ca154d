//! Axon Dispatch - the outbound half of the Axon API gateway.
//!
//! Given a request that has already been matched to a route, this crate
//! assembles the route's interceptor chain, keeps one pooled transport per
//! route, and executes the downstream call while classifying every failure
//! (timeout, open circuit, connection fault, cancellation) into a small error
//! taxonomy.
//!
//! # Features
//! - Per-route transports built once and shared, with pool clear and reload
//! - Ordered interceptor chains: globals, route-scoped, tracing, resilience
//! - Circuit breaker with single-trial half-open state and a per-attempt deadline
//! - Whole-call route timeout distinct from caller cancellation
//! - Pluggable error classification keyed by error type
//! - Metrics via the `metrics` facade & structured tracing via `tracing`
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use axon_dispatch::{
//!     Dispatcher, DispatchResult, config::DispatchSettings, core::Route,
//!     ports::interceptor::InterceptorRegistry,
//! };
//! use axum::body::Body;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let dispatcher = Dispatcher::with_registry(InterceptorRegistry::empty(), DispatchSettings::default());
//! let route = Arc::new(Route::builder("/users").build());
//! let request = http::Request::get("http://users.internal:8080/users").body(Body::empty())?;
//!
//! match dispatcher.send(&route, request, &CancellationToken::new()).await? {
//!     DispatchResult::Success(response) => println!("{}", response.status()),
//!     DispatchResult::Failure(error) => println!("{} ({})", error, error.kind().status_hint()),
//! }
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations) while keeping
//! dispatch logic inside `core`. The socket-level sender is a port, so tests and embedders can
//! replace the reqwest-backed one.
//!
//! # Error Handling
//! Per-request faults are `TransportError`s, classified into `DispatchError`s that keep the
//! original fault as their source. Configuration loading returns `eyre::Result<T>` with
//! `WrapErr` context.
//!
//! # Concurrency & Data Structures
//! The transport cache is an `scc::HashMap`; its entry API gives single construction per
//! route under contention. Breaker state is a single atomic word.
pub mod adapters;
pub mod config;
pub mod core;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;

pub use crate::{
    core::{
        DispatchError, DispatchResult, Dispatcher, ErrorKind, ErrorMapper, Route, TransportError,
        TransportPool,
    },
    ports::{interceptor::Interceptor, sender::HttpSender},
};
