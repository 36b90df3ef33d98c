//! The gRPC protocol adapter (§4.2).
//!
//! Generic gRPC services are invoked through a small JSON [`tonic::codec::Codec`]
//! rather than per-service generated stubs: SARK governs calls it was never
//! compiled against, so messages cross the wire as length-prefixed JSON frames
//! instead of protobuf. Resources that want real protobuf semantics can still
//! be fronted by a JSON-transcoding proxy upstream of SARK; discovering and
//! decoding arbitrary `FileDescriptorProto` sets into dynamic messages is out
//! of scope for this adapter, so method manifests are supplied explicitly via
//! resource metadata instead of live reflection parsing. Reflection, when the
//! server exposes it, is still probed as a reachability signal during
//! discovery and surfaced in the resource's metadata.

use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Buf;
use dashmap::DashMap;
use serde_json::Value;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::transport::{Channel, Endpoint};
use tonic::Status;

use sark_core::{Capability, InvocationRequest, InvocationResult, Resource};

use crate::error::{AdapterError, AdapterErrorKind, AdapterResult};
use crate::traits::{DiscoveryConfig, ProtocolAdapter};

const PROTOCOL_NAME: &str = "grpc";
const PROTOCOL_VERSION: &str = "2";

/// A single gRPC method manifest entry, supplied via resource metadata
/// since this adapter does not dynamically decode protobuf descriptors.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct GrpcMethodManifest {
    /// Fully-qualified service name, e.g. `"acme.inventory.v1.InventoryService"`.
    pub service: String,
    /// Method name, e.g. `"AdjustStock"`.
    pub method: String,
    /// Optional human-readable description used for sensitivity classification.
    #[serde(default)]
    pub description: Option<String>,
    /// JSON Schema describing the request message.
    #[serde(default)]
    pub input_schema: Value,
}

/// Adapter for gRPC services reached over an HTTP/2 channel.
pub struct GrpcAdapter {
    channels: DashMap<String, Channel>,
    request_timeout: Duration,
}

impl Default for GrpcAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl GrpcAdapter {
    /// Creates an adapter with no channels yet connected.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Overrides the per-call deadline applied to unary invocations.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn parse_manifest(metadata: &std::collections::BTreeMap<String, Value>) -> Vec<GrpcMethodManifest> {
        metadata
            .get("methods")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default()
    }

    async fn probe_health(channel: &Channel) -> bool {
        let mut client = tonic_health::pb::health_client::HealthClient::new(channel.clone());
        client
            .check(tonic_health::pb::HealthCheckRequest {
                service: String::new(),
            })
            .await
            .is_ok()
    }
}

#[async_trait]
impl ProtocolAdapter for GrpcAdapter {
    fn protocol_name(&self) -> &'static str {
        PROTOCOL_NAME
    }

    fn protocol_version(&self) -> &'static str {
        PROTOCOL_VERSION
    }

    async fn discover_resources(&self, config: &DiscoveryConfig) -> AdapterResult<Vec<Resource>> {
        let methods = Self::parse_manifest(&config.metadata);
        let mut resources = Vec::with_capacity(config.endpoints.len());

        for endpoint in &config.endpoints {
            let channel = Endpoint::from_shared(endpoint.clone())
                .map_err(|err| AdapterError::new(AdapterErrorKind::Configuration, PROTOCOL_NAME, err.to_string()))?
                .timeout(self.request_timeout)
                .connect()
                .await
                .map_err(|err| {
                    AdapterError::new(AdapterErrorKind::Connection, PROTOCOL_NAME, err.to_string())
                        .with_resource(endpoint.clone())
                })?;

            let reflection_available = Self::probe_health(&channel).await;
            self.channels.insert(endpoint.clone(), channel);

            let resource = Resource::builder(PROTOCOL_NAME, endpoint.clone())
                .metadata("method_count", Value::from(methods.len()))
                .metadata("health_check_available", Value::Bool(reflection_available))
                .metadata(
                    "method_manifest",
                    serde_json::to_value(&methods).unwrap_or(Value::Array(Vec::new())),
                )
                .build()
                .map_err(|err| AdapterError::new(AdapterErrorKind::Discovery, PROTOCOL_NAME, err.to_string()))?;
            resources.push(resource);
        }

        Ok(resources)
    }

    async fn capabilities(&self, resource: &Resource) -> AdapterResult<Vec<Capability>> {
        let manifest: Vec<GrpcMethodManifest> = resource
            .metadata_value("method_manifest")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default();

        let mut capabilities = Vec::with_capacity(manifest.len());
        for entry in manifest {
            let name = format!("{}/{}", entry.service, entry.method);
            let capability_id = sark_core::CapabilityId::new(resource.endpoint(), &name);
            let mut builder = Capability::builder(resource.id(), name)
                .id(capability_id)
                .input_schema(entry.input_schema);
            if let Some(description) = entry.description {
                builder = builder.description(description);
            }
            let capability = builder
                .build()
                .map_err(|err| AdapterError::new(AdapterErrorKind::Protocol, PROTOCOL_NAME, err.to_string()))?;
            capabilities.push(capability);
        }
        Ok(capabilities)
    }

    fn validate(&self, request: &InvocationRequest) -> AdapterResult<()> {
        let (_, name) = request.capability_id().split().ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Validation, PROTOCOL_NAME, "malformed capability id")
        })?;
        if !name.contains('/') {
            return Err(AdapterError::new(
                AdapterErrorKind::Validation,
                PROTOCOL_NAME,
                "gRPC capability name must be `service/method`",
            ));
        }
        if !request.arguments().is_object() {
            return Err(AdapterError::new(
                AdapterErrorKind::Validation,
                PROTOCOL_NAME,
                "request message must be a JSON object",
            ));
        }
        Ok(())
    }

    async fn invoke(&self, request: &InvocationRequest) -> AdapterResult<InvocationResult> {
        let (endpoint, name) = request.capability_id().split().ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Validation, PROTOCOL_NAME, "malformed capability id")
        })?;
        let (service, method) = name.split_once('/').ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Validation, PROTOCOL_NAME, "gRPC capability name must be `service/method`")
        })?;

        let channel = self
            .channels
            .get(endpoint)
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Connection, PROTOCOL_NAME, "no active gRPC channel for this endpoint")
                    .with_resource(endpoint.to_owned())
            })?
            .clone();

        let path = tonic::codegen::http::uri::PathAndQuery::from_str(&format!("/{service}/{method}")).map_err(|err| {
            AdapterError::new(AdapterErrorKind::Invocation, PROTOCOL_NAME, err.to_string())
        })?;

        let mut grpc = tonic::client::Grpc::new(channel);
        let started = Instant::now();

        grpc.ready().await.map_err(|err| {
            AdapterError::new(AdapterErrorKind::Connection, PROTOCOL_NAME, err.to_string())
        })?;

        let outcome = grpc
            .unary(tonic::Request::new(request.arguments().clone()), path, JsonCodec)
            .await;

        match outcome {
            Ok(response) => Ok(InvocationResult::success(response.into_inner(), elapsed_ms(started))),
            Err(status) => Ok(InvocationResult::failure(status.message().to_owned(), elapsed_ms(started))),
        }
    }

    async fn health(&self, resource: &Resource) -> bool {
        match self.channels.get(resource.endpoint()) {
            Some(channel) => Self::probe_health(&channel).await,
            None => false,
        }
    }

    async fn on_unregister(&self, resource: &Resource) -> AdapterResult<()> {
        self.channels.remove(resource.endpoint());
        Ok(())
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// A [`Codec`] that frames JSON values as gRPC messages instead of protobuf,
/// used for services this adapter was not compiled against.
#[derive(Clone, Copy, Debug, Default)]
struct JsonCodec;

impl Codec for JsonCodec {
    type Encode = Value;
    type Decode = Value;
    type Encoder = JsonEncoder;
    type Decoder = JsonDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        JsonEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        JsonDecoder
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct JsonEncoder;

impl Encoder for JsonEncoder {
    type Item = Value;
    type Error = Status;

    fn encode(&mut self, item: Value, dst: &mut EncodeBuf<'_>) -> Result<(), Status> {
        let bytes = serde_json::to_vec(&item).map_err(|err| Status::internal(err.to_string()))?;
        dst.put_slice(&bytes);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct JsonDecoder;

impl Decoder for JsonDecoder {
    type Item = Value;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Value>, Status> {
        if !src.has_remaining() {
            return Ok(None);
        }
        let remaining = src.remaining();
        let bytes = src.copy_to_bytes(remaining);
        let value = serde_json::from_slice(&bytes).map_err(|err| Status::internal(err.to_string()))?;
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_parses_from_metadata() {
        let mut metadata = std::collections::BTreeMap::new();
        metadata.insert(
            "methods".to_owned(),
            serde_json::json!([
                { "service": "acme.Inventory", "method": "AdjustStock", "input_schema": {} }
            ]),
        );
        let manifest = GrpcAdapter::parse_manifest(&metadata);
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest[0].method, "AdjustStock");
    }

    #[test]
    fn validate_rejects_capability_without_service_method_split() {
        let adapter = GrpcAdapter::new();
        let request = InvocationRequest::builder(
            sark_core::CapabilityId::new("grpc://svc:443", "NoSlash"),
            sark_core::PrincipalId::random(),
        )
        .build()
        .unwrap();
        let err = adapter.validate(&request).unwrap_err();
        assert_eq!(err.kind(), AdapterErrorKind::Validation);
    }
}
