//! Core shared types for SARK: principals, resources, capabilities, and invocations.

#![warn(missing_docs, clippy::pedantic)]

mod capability;
mod circuit;
mod error;
mod ids;
mod invocation;
mod principal;
mod resource;
mod sensitivity;

/// Keyword-tier auto-classification of capability sensitivity.
pub mod sensitivity_keywords;

/// Capability descriptors and supporting builders.
pub use capability::{Capability, CapabilityBuilder};
/// Circuit breaker shared by outbound transports.
pub use circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
/// Error type and result alias shared across the governance data model.
pub use error::{Error, Result};
/// Unique identifiers used throughout the governance surface.
pub use ids::{CapabilityId, PrincipalId, RequestId, ResourceId};
/// Invocation request/result types.
pub use invocation::{InvocationRequest, InvocationRequestBuilder, InvocationResult};
/// The authenticated actor invoking a capability.
pub use principal::{Principal, PrincipalBuilder};
/// Governed resources and their builders.
pub use resource::{Resource, ResourceBuilder};
/// Sensitivity classification.
pub use sensitivity::SensitivityLevel;
