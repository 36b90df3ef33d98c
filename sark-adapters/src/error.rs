//! The error taxonomy shared by every protocol adapter (§4.1).
//!
//! Adapter errors never leak a foreign error type across the adapter
//! boundary: transport-level failures (hyper, tonic, reqwest, stdio I/O) are
//! always rewrapped into one of the variants below, tagged with the adapter
//! name and, where known, the resource/capability the failure concerns.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

/// Result alias used throughout the adapter framework.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// A single adapter-framework error, carrying enough context to attribute the
/// failure to an adapter and (optionally) a resource/capability without
/// exposing the underlying transport's own error type.
#[derive(Debug)]
pub struct AdapterError {
    kind: AdapterErrorKind,
    adapter: &'static str,
    resource_id: Option<String>,
    capability_id: Option<String>,
    reason: String,
    detail: BTreeMap<String, Value>,
}

impl AdapterError {
    /// Builds a new adapter error.
    #[must_use]
    pub fn new(kind: AdapterErrorKind, adapter: &'static str, reason: impl Into<String>) -> Self {
        Self {
            kind,
            adapter,
            resource_id: None,
            capability_id: None,
            reason: reason.into(),
            detail: BTreeMap::new(),
        }
    }

    /// Attaches the resource the failure concerns.
    #[must_use]
    pub fn with_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Attaches the capability the failure concerns.
    #[must_use]
    pub fn with_capability(mut self, capability_id: impl Into<String>) -> Self {
        self.capability_id = Some(capability_id.into());
        self
    }

    /// Attaches a free-form diagnostic detail.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.detail.insert(key.into(), value.into());
        self
    }

    /// Returns the error's taxonomy kind.
    #[must_use]
    pub const fn kind(&self) -> AdapterErrorKind {
        self.kind
    }

    /// Returns the adapter name that produced this error.
    #[must_use]
    pub const fn adapter(&self) -> &'static str {
        self.adapter
    }

    /// Returns the resource id, if known.
    #[must_use]
    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    /// Returns the capability id, if known.
    #[must_use]
    pub fn capability_id(&self) -> Option<&str> {
        self.capability_id.as_deref()
    }

    /// Returns the free-form detail map for audit logging.
    #[must_use]
    pub fn detail(&self) -> &BTreeMap<String, Value> {
        &self.detail
    }

    /// Returns the human-readable reason, without the adapter/resource preamble.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error in adapter `{}`", self.kind, self.adapter)?;
        if let Some(resource) = &self.resource_id {
            write!(f, " (resource={resource})")?;
        }
        if let Some(capability) = &self.capability_id {
            write!(f, " (capability={capability})")?;
        }
        write!(f, ": {}", self.reason)
    }
}

impl std::error::Error for AdapterError {}

/// The ten error kinds every adapter implementation shares (§4.1).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AdapterErrorKind {
    /// Resource/capability discovery failed.
    Discovery,
    /// The transport connection could not be established or was lost.
    Connection,
    /// Credentials were missing, invalid, or rejected by the remote end.
    Authentication,
    /// The request failed structural or schema validation.
    Validation,
    /// The requested operation is not supported by this adapter/transport.
    Unsupported,
    /// The call exceeded its deadline.
    Timeout,
    /// A streaming invocation failed mid-stream.
    Streaming,
    /// The remote end rejected or failed the invocation itself.
    Invocation,
    /// The adapter was misconfigured.
    Configuration,
    /// The underlying wire protocol was violated.
    Protocol,
}

impl fmt::Display for AdapterErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Discovery => "discovery",
            Self::Connection => "connection",
            Self::Authentication => "authentication",
            Self::Validation => "validation",
            Self::Unsupported => "unsupported",
            Self::Timeout => "timeout",
            Self::Streaming => "streaming",
            Self::Invocation => "invocation",
            Self::Configuration => "configuration",
            Self::Protocol => "protocol",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = AdapterError::new(AdapterErrorKind::Timeout, "mcp", "deadline exceeded")
            .with_resource("res-1")
            .with_capability("res-1#search");
        let rendered = err.to_string();
        assert!(rendered.contains("timeout"));
        assert!(rendered.contains("mcp"));
        assert!(rendered.contains("res-1#search"));
    }
}
