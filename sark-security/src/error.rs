//! Error types for the security subsystem.

use thiserror::Error;

/// Errors raised by injection detection, secret scanning, anomaly detection, or MFA.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// A configuration value was out of range or malformed.
    #[error("invalid security configuration: {0}")]
    InvalidConfig(&'static str),

    /// MFA secret material could not be decoded.
    #[error("invalid MFA secret encoding: {0}")]
    InvalidSecret(String),

    /// No MFA challenge exists for the supplied identifier.
    #[error("MFA challenge not found")]
    ChallengeNotFound,

    /// The challenge exists but belongs to a different principal.
    #[error("MFA challenge does not belong to this principal")]
    ChallengePrincipalMismatch,
}

/// Result alias for security subsystem operations.
pub type Result<T> = std::result::Result<T, SecurityError>;
