//! The MCP protocol adapter (§4.2), fronting stdio, SSE, and streamable-HTTP
//! MCP servers behind the one [`ProtocolAdapter`] contract.
//!
//! Capability discovery auto-classifies sensitivity from the tool's name and
//! description via [`sark_core::sensitivity_keywords`] unless the resource
//! metadata carries an explicit override.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};

use sark_core::{Capability, InvocationRequest, InvocationResult, Resource};

use crate::error::{AdapterError, AdapterErrorKind, AdapterResult};
use crate::stdio::{StdioConfig, StdioState, StdioTransport};
use crate::traits::{DiscoveryConfig, ProtocolAdapter};

const PROTOCOL_NAME: &str = "mcp";
const PROTOCOL_VERSION: &str = "2024-11-05";

/// How a single MCP resource is reached.
enum McpConnection {
    Stdio(Arc<StdioTransport>),
    Http {
        client: reqwest::Client,
        base_url: String,
        bearer_token: Option<String>,
    },
}

/// Adapter for Model Context Protocol servers.
///
/// Connections are keyed by the resource's `endpoint` string, matching the
/// `"{endpoint}#{capability_name}"` capability id scheme used throughout the
/// gateway: resolving a capability to a live transport is a single map
/// lookup on the part of the id before the last `#`.
pub struct McpAdapter {
    connections: DashMap<String, McpConnection>,
    request_timeout: Duration,
}

impl Default for McpAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl McpAdapter {
    /// Creates an adapter with no connections yet established.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Overrides the per-request timeout used for HTTP-transport MCP calls.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn transport_kind(metadata: &std::collections::BTreeMap<String, Value>) -> &str {
        metadata
            .get("transport")
            .and_then(Value::as_str)
            .unwrap_or("stdio")
    }

    async fn connect_stdio(endpoint: &str, metadata: &serde_json::Map<String, Value>) -> AdapterResult<Arc<StdioTransport>> {
        let command: Vec<String> = shell_words(endpoint);
        if command.is_empty() {
            return Err(AdapterError::new(
                AdapterErrorKind::Configuration,
                PROTOCOL_NAME,
                "stdio endpoint must be a non-empty command line",
            ));
        }

        let mut config = StdioConfig {
            command,
            ..Default::default()
        };
        if let Some(max_memory_mb) = metadata.get("max_memory_mb").and_then(Value::as_u64) {
            config.max_memory_mb = max_memory_mb;
        }
        if let Some(max_fds) = metadata.get("max_file_descriptors").and_then(Value::as_u64) {
            config.max_file_descriptors = max_fds;
        }

        let transport = StdioTransport::new(config);
        transport.start().await?;

        let init_params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": { "name": "sark-gateway", "version": env!("CARGO_PKG_VERSION") },
        });
        transport.send_request("initialize", init_params).await?;
        transport.send_notification("notifications/initialized", json!({})).await?;

        Ok(transport)
    }

    async fn call_tool(&self, endpoint: &str, name: &str, arguments: Value) -> AdapterResult<Value> {
        let connection = self.connections.get(endpoint).ok_or_else(|| {
            AdapterError::new(
                AdapterErrorKind::Connection,
                PROTOCOL_NAME,
                "no active MCP connection for this endpoint",
            )
            .with_resource(endpoint.to_owned())
        })?;

        match &*connection {
            McpConnection::Stdio(transport) => {
                let params = json!({ "name": name, "arguments": arguments });
                transport.send_request("tools/call", params).await
            }
            McpConnection::Http {
                client,
                base_url,
                bearer_token,
            } => {
                let body = json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "method": "tools/call",
                    "params": { "name": name, "arguments": arguments },
                });
                let mut request = client.post(base_url).json(&body);
                if let Some(token) = bearer_token {
                    request = request.bearer_auth(token);
                }
                let response = request.send().await.map_err(|err| {
                    AdapterError::new(AdapterErrorKind::Connection, PROTOCOL_NAME, err.to_string())
                })?;
                let payload: Value = response.json().await.map_err(|err| {
                    AdapterError::new(AdapterErrorKind::Protocol, PROTOCOL_NAME, err.to_string())
                })?;
                if let Some(error) = payload.get("error") {
                    return Err(AdapterError::new(
                        AdapterErrorKind::Invocation,
                        PROTOCOL_NAME,
                        error.to_string(),
                    ));
                }
                Ok(payload.get("result").cloned().unwrap_or(Value::Null))
            }
        }
    }
}

#[async_trait]
impl ProtocolAdapter for McpAdapter {
    fn protocol_name(&self) -> &'static str {
        PROTOCOL_NAME
    }

    fn protocol_version(&self) -> &'static str {
        PROTOCOL_VERSION
    }

    async fn discover_resources(&self, config: &DiscoveryConfig) -> AdapterResult<Vec<Resource>> {
        let metadata_map: serde_json::Map<String, Value> = config.metadata.clone().into_iter().collect();
        let kind = Self::transport_kind(&config.metadata);
        let mut resources = Vec::with_capacity(config.endpoints.len());

        for endpoint in &config.endpoints {
            let connection = match kind {
                "stdio" => McpConnection::Stdio(Self::connect_stdio(endpoint, &metadata_map).await?),
                "http" | "sse" => {
                    let client = reqwest::Client::builder()
                        .timeout(self.request_timeout)
                        .build()
                        .map_err(|err| {
                            AdapterError::new(AdapterErrorKind::Configuration, PROTOCOL_NAME, err.to_string())
                        })?;
                    let bearer_token = metadata_map
                        .get("bearer_token")
                        .and_then(Value::as_str)
                        .map(str::to_owned);
                    McpConnection::Http {
                        client,
                        base_url: endpoint.clone(),
                        bearer_token,
                    }
                }
                other => {
                    return Err(AdapterError::new(
                        AdapterErrorKind::Configuration,
                        PROTOCOL_NAME,
                        format!("unknown MCP transport `{other}`"),
                    ))
                }
            };

            self.connections.insert(endpoint.clone(), connection);

            let resource = Resource::builder(PROTOCOL_NAME, endpoint.clone())
                .metadata("transport", Value::String(kind.to_owned()))
                .build()
                .map_err(|err| AdapterError::new(AdapterErrorKind::Discovery, PROTOCOL_NAME, err.to_string()))?;
            resources.push(resource);
        }

        Ok(resources)
    }

    async fn capabilities(&self, resource: &Resource) -> AdapterResult<Vec<Capability>> {
        let endpoint = resource.endpoint();
        let raw_tools = match self.connections.get(endpoint) {
            Some(connection) => match &*connection {
                McpConnection::Stdio(transport) => {
                    let response = transport.send_request("tools/list", json!({})).await?;
                    response
                        .get("tools")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default()
                }
                McpConnection::Http { client, base_url, bearer_token } => {
                    let body = json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list", "params": {} });
                    let mut request = client.post(base_url).json(&body);
                    if let Some(token) = bearer_token {
                        request = request.bearer_auth(token);
                    }
                    let response = request.send().await.map_err(|err| {
                        AdapterError::new(AdapterErrorKind::Discovery, PROTOCOL_NAME, err.to_string())
                    })?;
                    let payload: Value = response.json().await.map_err(|err| {
                        AdapterError::new(AdapterErrorKind::Discovery, PROTOCOL_NAME, err.to_string())
                    })?;
                    payload
                        .get("result")
                        .and_then(|result| result.get("tools"))
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default()
                }
            },
            None => {
                return Err(AdapterError::new(
                    AdapterErrorKind::Discovery,
                    PROTOCOL_NAME,
                    "no active MCP connection for this resource",
                )
                .with_resource(endpoint.to_owned()))
            }
        };

        let mut capabilities = Vec::with_capacity(raw_tools.len());
        for tool in raw_tools {
            let name = tool
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    AdapterError::new(AdapterErrorKind::Protocol, PROTOCOL_NAME, "tool entry missing `name`")
                })?
                .to_owned();
            let description = tool.get("description").and_then(Value::as_str).map(str::to_owned);
            let input_schema = tool.get("inputSchema").cloned().unwrap_or(Value::Null);

            let capability_id = sark_core::CapabilityId::new(endpoint, &name);
            let mut builder = Capability::builder(resource.id(), name)
                .id(capability_id)
                .input_schema(input_schema);
            if let Some(description) = description {
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
                "tool arguments must be a JSON object",
            ));
        }
        Ok(())
    }

    async fn invoke(&self, request: &InvocationRequest) -> AdapterResult<InvocationResult> {
        let (endpoint, name) = request.capability_id().split().ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Validation, PROTOCOL_NAME, "malformed capability id")
        })?;

        let started = Instant::now();
        match self.call_tool(endpoint, name, request.arguments().clone()).await {
            Ok(result) => Ok(InvocationResult::success(result, elapsed_ms(started))),
            Err(err) => Ok(InvocationResult::failure(err.to_string(), elapsed_ms(started))),
        }
    }

    async fn health(&self, resource: &Resource) -> bool {
        match self.connections.get(resource.endpoint()) {
            Some(connection) => match &*connection {
                McpConnection::Stdio(transport) => transport.state().await == StdioState::Running,
                McpConnection::Http { client, base_url, .. } => client.get(base_url).send().await.is_ok(),
            },
            None => false,
        }
    }

    async fn on_unregister(&self, resource: &Resource) -> AdapterResult<()> {
        if let Some((_, connection)) = self.connections.remove(resource.endpoint()) {
            if let McpConnection::Stdio(transport) = connection {
                transport.stop().await;
            }
        }
        Ok(())
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Splits a stdio endpoint (`"npx -y @modelcontextprotocol/server-filesystem /data"`)
/// into argv, respecting single/double-quoted segments.
fn shell_words(command_line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in command_line.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None if ch == '\'' || ch == '"' => quote = Some(ch),
            None if ch.is_whitespace() => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            None => current.push(ch),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_words_splits_on_whitespace() {
        let words = shell_words("npx -y @modelcontextprotocol/server-filesystem /data");
        assert_eq!(words, vec!["npx", "-y", "@modelcontextprotocol/server-filesystem", "/data"]);
    }

    #[test]
    fn shell_words_respects_quotes() {
        let words = shell_words(r#"python3 server.py --root "/mnt/shared data""#);
        assert_eq!(words.last().unwrap(), "/mnt/shared data");
    }

    #[tokio::test]
    async fn discover_resources_rejects_unknown_transport() {
        let adapter = McpAdapter::new();
        let mut config = DiscoveryConfig::single("https://example.invalid/mcp");
        config
            .metadata
            .insert("transport".to_owned(), Value::String("carrier-pigeon".to_owned()));
        let err = adapter.discover_resources(&config).await.unwrap_err();
        assert_eq!(err.kind(), AdapterErrorKind::Configuration);
    }
}
