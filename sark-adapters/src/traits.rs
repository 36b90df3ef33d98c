//! The uniform discovery/capability/invoke/health contract every protocol
//! adapter conforms to (§4.1), generalized from the teacher's
//! provider-specific `ModelAdapter` trait.

use std::collections::BTreeMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;

use sark_core::{Capability, InvocationRequest, InvocationResult, Resource};

use crate::error::AdapterResult;

/// Configuration handed to [`ProtocolAdapter::discover_resources`]. Adapters
/// interpret `endpoints` and `metadata` according to their own transport
/// (a stdio command line, an SSE/HTTP base URL, a gRPC target).
#[derive(Clone, Debug, Default)]
pub struct DiscoveryConfig {
    /// Candidate endpoints to probe or register.
    pub endpoints: Vec<String>,
    /// Free-form adapter-specific configuration (credentials, timeouts, …).
    pub metadata: BTreeMap<String, Value>,
}

impl DiscoveryConfig {
    /// Builds a config targeting a single endpoint.
    #[must_use]
    pub fn single(endpoint: impl Into<String>) -> Self {
        Self {
            endpoints: vec![endpoint.into()],
            metadata: BTreeMap::new(),
        }
    }
}

/// A single message emitted by a streaming invocation.
#[derive(Clone, Debug)]
pub struct StreamMessage {
    /// Sequence number within the stream, starting at zero.
    pub sequence: u64,
    /// Partial payload for this chunk.
    pub payload: Value,
    /// Whether this is the final message in the stream.
    pub done: bool,
}

/// A boxed stream of invocation messages.
pub type InvocationStream = Pin<Box<dyn Stream<Item = AdapterResult<StreamMessage>> + Send>>;

/// The contract implemented by every protocol adapter (MCP, gRPC, HTTP).
///
/// Adapters never make authorization decisions; they only surface the
/// structural data (resource sensitivity, capability metadata) the policy
/// engine and gateway pipeline consume, and execute invocations once the
/// gateway has already allowed them.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    /// Machine-readable protocol tag (`"mcp"`, `"grpc"`, `"http"`).
    fn protocol_name(&self) -> &'static str;

    /// Protocol/transport version string surfaced for diagnostics.
    fn protocol_version(&self) -> &'static str;

    /// Whether [`invoke_streaming`](Self::invoke_streaming) is implemented.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Discovers the resources reachable through this adapter's configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterErrorKind::Discovery`](crate::error::AdapterErrorKind::Discovery)
    /// on probe failure.
    async fn discover_resources(&self, config: &DiscoveryConfig) -> AdapterResult<Vec<Resource>>;

    /// Lists the capabilities exposed by `resource`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterErrorKind::Discovery`](crate::error::AdapterErrorKind::Discovery)
    /// on probe failure.
    async fn capabilities(&self, resource: &Resource) -> AdapterResult<Vec<Capability>>;

    /// Validates a request's structural shape before it reaches the gateway
    /// pipeline proper (argument presence, basic type checks). Authorization
    /// is never performed here.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterErrorKind::Validation`](crate::error::AdapterErrorKind::Validation)
    /// when the request is structurally unsound.
    fn validate(&self, request: &InvocationRequest) -> AdapterResult<()>;

    /// Executes a unary invocation.
    ///
    /// # Errors
    ///
    /// Returns an [`AdapterError`](crate::error::AdapterError) on any
    /// transport, timeout, or remote-side failure.
    async fn invoke(&self, request: &InvocationRequest) -> AdapterResult<InvocationResult>;

    /// Executes a streaming invocation, if supported.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterErrorKind::Unsupported`](crate::error::AdapterErrorKind::Unsupported)
    /// unless [`supports_streaming`](Self::supports_streaming) returns `true`.
    async fn invoke_streaming(&self, request: &InvocationRequest) -> AdapterResult<InvocationStream> {
        let _ = request;
        Err(crate::error::AdapterError::new(
            crate::error::AdapterErrorKind::Unsupported,
            self.protocol_name(),
            "streaming invocation is not supported by this adapter",
        ))
    }

    /// Reports whether `resource` is currently reachable and healthy.
    async fn health(&self, resource: &Resource) -> bool;

    /// Lifecycle hook invoked when a resource is registered with the gateway.
    async fn on_register(&self, resource: &Resource) -> AdapterResult<()> {
        let _ = resource;
        Ok(())
    }

    /// Lifecycle hook invoked when a resource is deregistered.
    async fn on_unregister(&self, resource: &Resource) -> AdapterResult<()> {
        let _ = resource;
        Ok(())
    }
}
