//! Shared error definitions for the core data model.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the governance data model.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing or parsing core domain types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided identifier could not be parsed as a UUID.
    #[error("invalid identifier: {source}")]
    InvalidId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// A resource builder was missing a required field.
    #[error("invalid resource: {reason}")]
    InvalidResource {
        /// Human-readable reason for rejection.
        reason: &'static str,
    },

    /// A capability builder was missing a required field or had invalid shape.
    #[error("invalid capability: {reason}")]
    InvalidCapability {
        /// Human-readable reason for rejection.
        reason: &'static str,
    },

    /// A principal builder was missing a required field.
    #[error("invalid principal: {reason}")]
    InvalidPrincipal {
        /// Human-readable reason for rejection.
        reason: &'static str,
    },

    /// An invocation request was missing a required field or had invalid shape.
    #[error("invalid invocation request: {reason}")]
    InvalidInvocationRequest {
        /// Human-readable reason for rejection.
        reason: &'static str,
    },

    /// A sensitivity level string did not match a known variant.
    #[error("unknown sensitivity level: {0}")]
    UnknownSensitivityLevel(String),
}
