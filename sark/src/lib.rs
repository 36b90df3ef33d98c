//! SARK: a governance layer for AI-tool invocations.
//!
//! Depend on this crate via `cargo add sark`. It bundles the governance
//! core's component crates behind feature flags so downstream users can
//! enable or disable subsystems as needed.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export core data model types (principals, resources, capabilities,
/// invocations) — always available, every other component depends on it.
pub use sark_core as core;

/// Prompt-injection detection, secret scanning, behavioral anomaly
/// detection, and MFA (enabled by the `security` feature).
#[cfg(feature = "security")]
pub use sark_security as security;

/// Policy decision engine: input assembly, evaluation, caching, and
/// change tracking (enabled by the `policy` feature).
#[cfg(feature = "policy")]
pub use sark_policy as policy;

/// Protocol adapter framework: MCP, gRPC, HTTP (enabled by the
/// `adapters` feature).
#[cfg(feature = "adapters")]
pub use sark_adapters as adapters;

/// Audit log, SIEM forwarding, and export (enabled by the `audit`
/// feature).
#[cfg(feature = "audit")]
pub use sark_audit as audit;

/// Gateway client: the governed invocation pipeline tying the other
/// components together (enabled by the `gateway` feature).
#[cfg(feature = "gateway")]
pub use sark_gateway as gateway;

/// Observability: tracing, metrics, replay, health (enabled by the
/// `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use sark_telemetry as telemetry;

/// Environment-driven configuration loading (enabled by the `config`
/// feature).
#[cfg(feature = "config")]
pub use sark_config as config;
