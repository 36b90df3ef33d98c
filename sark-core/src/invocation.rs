//! Requests to invoke a capability, and the results they produce.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::ids::{CapabilityId, PrincipalId, RequestId};

/// A request to invoke a capability on behalf of a principal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InvocationRequest {
    request_id: RequestId,
    capability_id: CapabilityId,
    principal_id: PrincipalId,
    arguments: Value,
    client_ip: Option<String>,
}

impl InvocationRequest {
    /// Starts building an invocation request.
    #[must_use]
    pub fn builder(capability_id: CapabilityId, principal_id: PrincipalId) -> InvocationRequestBuilder {
        InvocationRequestBuilder::new(capability_id, principal_id)
    }

    /// Correlation id used across authorization, security scans, and audit records.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Target capability.
    #[must_use]
    pub fn capability_id(&self) -> &CapabilityId {
        &self.capability_id
    }

    /// Invoking principal.
    #[must_use]
    pub const fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    /// Arguments supplied for the invocation, as parsed JSON.
    #[must_use]
    pub fn arguments(&self) -> &Value {
        &self.arguments
    }

    /// Client IP address, when known, for policy context and audit trails.
    #[must_use]
    pub fn client_ip(&self) -> Option<&str> {
        self.client_ip.as_deref()
    }

    /// Replaces the arguments, used when the policy engine or secret scanner
    /// returns filtered/redacted parameters.
    pub fn set_arguments(&mut self, arguments: Value) {
        self.arguments = arguments;
    }
}

/// Builder for [`InvocationRequest`].
pub struct InvocationRequestBuilder {
    request_id: Option<RequestId>,
    capability_id: CapabilityId,
    principal_id: PrincipalId,
    arguments: Value,
    client_ip: Option<String>,
}

impl InvocationRequestBuilder {
    /// Creates a new builder for the given capability and principal.
    #[must_use]
    pub fn new(capability_id: CapabilityId, principal_id: PrincipalId) -> Self {
        Self {
            request_id: None,
            capability_id,
            principal_id,
            arguments: Value::Object(serde_json::Map::new()),
            client_ip: None,
        }
    }

    /// Overrides the generated request id.
    #[must_use]
    pub const fn request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Sets the invocation arguments.
    #[must_use]
    pub fn arguments(mut self, arguments: Value) -> Self {
        self.arguments = arguments;
        self
    }

    /// Sets the client IP address.
    #[must_use]
    pub fn client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.client_ip = Some(client_ip.into());
        self
    }

    /// Finalises the request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInvocationRequest`] if the arguments are not a
    /// JSON object (SARK requires keyword-style arguments for path-based scanning).
    pub fn build(self) -> Result<InvocationRequest> {
        if !self.arguments.is_object() {
            return Err(Error::InvalidInvocationRequest {
                reason: "arguments must be a JSON object",
            });
        }

        Ok(InvocationRequest {
            request_id: self.request_id.unwrap_or_default(),
            capability_id: self.capability_id,
            principal_id: self.principal_id,
            arguments: self.arguments,
            client_ip: self.client_ip,
        })
    }
}

/// Outcome of invoking a capability.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InvocationResult {
    success: bool,
    result: Option<Value>,
    error: Option<String>,
    metadata: BTreeMap<String, Value>,
    duration_ms: f64,
}

impl InvocationResult {
    /// Builds a successful result.
    #[must_use]
    pub fn success(result: Value, duration_ms: f64) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            metadata: BTreeMap::new(),
            duration_ms,
        }
    }

    /// Builds a failed result.
    #[must_use]
    pub fn failure(error: impl Into<String>, duration_ms: f64) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            metadata: BTreeMap::new(),
            duration_ms,
        }
    }

    /// Whether the invocation succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.success
    }

    /// The result payload, present only on success (and after secret redaction).
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// The error message, present only on failure.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Adapter-specific metadata (transport, streaming flags, and so on).
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// Wall-clock duration of the invocation, in milliseconds.
    #[must_use]
    pub const fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    /// Attaches a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Replaces the result payload, used after secret redaction.
    pub fn set_result(&mut self, result: Value) {
        self.result = Some(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{CapabilityId, PrincipalId};

    #[test]
    fn builder_rejects_non_object_arguments() {
        let err = InvocationRequest::builder(CapabilityId::from("cap"), PrincipalId::random())
            .arguments(Value::String("not an object".into()))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInvocationRequest { .. }));
    }

    #[test]
    fn result_round_trips_success_and_failure() {
        let ok = InvocationResult::success(Value::Bool(true), 12.5);
        assert!(ok.is_success());
        assert_eq!(ok.duration_ms(), 12.5);

        let err = InvocationResult::failure("boom", 1.0);
        assert!(!err.is_success());
        assert_eq!(err.error(), Some("boom"));
    }
}
