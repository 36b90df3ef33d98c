//! Error types for the audit subsystem.

use thiserror::Error;

/// Errors emitted by audit storage, export, and SIEM forwarding.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The provided configuration was invalid.
    #[error("invalid audit configuration: {0}")]
    InvalidConfig(&'static str),
    /// Underlying I/O failure while reading or writing journal files.
    #[error("i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },
    /// Serialization or deserialization error.
    #[error("serialization error: {source}")]
    Serialization {
        /// Source [`serde_json::Error`].
        #[from]
        source: serde_json::Error,
    },
    /// CSV export failed.
    #[error("csv export error: {source}")]
    Csv {
        /// Source [`csv::Error`].
        #[from]
        source: csv::Error,
    },
    /// A SIEM forwarder reported an application error.
    #[error("siem forwarder error ({forwarder}): {reason}")]
    SiemForward {
        /// Name of the forwarder that failed (`"splunk_hec"`, `"datadog"`).
        forwarder: &'static str,
        /// Human-readable reason.
        reason: String,
    },
}

/// Result type alias for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
