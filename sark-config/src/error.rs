//! Error type for configuration loading and validation.

use thiserror::Error;

/// Result alias used throughout configuration loading.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading or validating process configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable was absent.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable held a value that could not be parsed.
    #[error("invalid value for {name}: {reason}")]
    Invalid {
        /// Name of the offending environment variable.
        name: &'static str,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// A production-mode constraint was violated (§6 of the spec).
    #[error("production mode constraint violated: {0}")]
    ProductionConstraint(String),
}
