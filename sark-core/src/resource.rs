//! Governed resources: the MCP servers, gRPC services, and REST APIs fronted by SARK.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::ids::ResourceId;
use crate::sensitivity::SensitivityLevel;

/// A resource registered with the gateway: an MCP server, gRPC service, or REST API.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Resource {
    id: ResourceId,
    name: String,
    protocol: String,
    endpoint: String,
    sensitivity_level: SensitivityLevel,
    metadata: BTreeMap<String, Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Resource {
    /// Starts building a resource.
    #[must_use]
    pub fn builder(protocol: impl Into<String>, endpoint: impl Into<String>) -> ResourceBuilder {
        ResourceBuilder::new(protocol, endpoint)
    }

    /// Unique identifier of this resource.
    #[must_use]
    pub const fn id(&self) -> ResourceId {
        self.id
    }

    /// Human-friendly resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Protocol adapter that governs this resource (`"mcp"`, `"grpc"`, `"http"`).
    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Transport endpoint: a URL, or a stdio command line for local processes.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Default sensitivity assigned to capabilities on this resource absent an override.
    #[must_use]
    pub const fn sensitivity_level(&self) -> SensitivityLevel {
        self.sensitivity_level
    }

    /// Free-form adapter-specific metadata (transport, auth config, discovery details).
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// Registration timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last-modified timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns a metadata value by key, if present.
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

/// Builder for [`Resource`].
pub struct ResourceBuilder {
    id: Option<ResourceId>,
    name: Option<String>,
    protocol: String,
    endpoint: String,
    sensitivity_level: SensitivityLevel,
    metadata: BTreeMap<String, Value>,
    created_at: Option<DateTime<Utc>>,
}

impl ResourceBuilder {
    /// Creates a new builder with the required protocol and endpoint.
    #[must_use]
    pub fn new(protocol: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: None,
            name: None,
            protocol: protocol.into(),
            endpoint: endpoint.into(),
            sensitivity_level: SensitivityLevel::Medium,
            metadata: BTreeMap::new(),
            created_at: None,
        }
    }

    /// Sets an explicit resource id; a random one is generated otherwise.
    #[must_use]
    pub const fn id(mut self, id: ResourceId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Overrides the default sensitivity level (default: [`SensitivityLevel::Medium`]).
    #[must_use]
    pub const fn sensitivity_level(mut self, level: SensitivityLevel) -> Self {
        self.sensitivity_level = level;
        self
    }

    /// Attaches a metadata entry.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Overrides `created_at`/`updated_at` (defaults to now); used in tests and replays.
    #[must_use]
    pub const fn created_at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.created_at = Some(timestamp);
        self
    }

    /// Finalises the resource.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidResource`] if the protocol or endpoint is empty.
    pub fn build(self) -> Result<Resource> {
        if self.protocol.trim().is_empty() {
            return Err(Error::InvalidResource {
                reason: "protocol cannot be empty",
            });
        }
        if self.endpoint.trim().is_empty() {
            return Err(Error::InvalidResource {
                reason: "endpoint cannot be empty",
            });
        }

        let now = self.created_at.unwrap_or_else(Utc::now);
        let name = self.name.unwrap_or_else(|| self.endpoint.clone());

        Ok(Resource {
            id: self.id.unwrap_or_default(),
            name,
            protocol: self.protocol,
            endpoint: self.endpoint,
            sensitivity_level: self.sensitivity_level,
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_resource_defaults_name_to_endpoint() {
        let resource = Resource::builder("mcp", "stdio://filesystem-server")
            .build()
            .unwrap();

        assert_eq!(resource.name(), "stdio://filesystem-server");
        assert_eq!(resource.sensitivity_level(), SensitivityLevel::Medium);
    }

    #[test]
    fn build_resource_rejects_empty_endpoint() {
        let err = Resource::builder("mcp", "   ").build().unwrap_err();
        assert!(matches!(err, Error::InvalidResource { .. }));
    }
}
