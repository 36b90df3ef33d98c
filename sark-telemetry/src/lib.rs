//! Observability for the SARK governance core.
//!
//! Each governance component emits structured `tracing` events with
//! key-value fields (never formatted strings); this crate wires up the
//! subscriber, collects a small set of counters, and aggregates component
//! health for the gateway's `health`/`metrics` accessors (§4.9).

#![warn(missing_docs, clippy::pedantic)]

pub mod health;
pub mod metrics;
pub mod replay;
pub mod tracing_support;

pub use health::{ComponentHealth, HealthStatus};
pub use metrics::Metrics;
pub use replay::ReplayRecorder;
pub use tracing_support::init_subscriber;
