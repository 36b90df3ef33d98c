//! Capability descriptors: the individual tools/methods/endpoints a resource exposes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::ids::{CapabilityId, ResourceId};
use crate::sensitivity::SensitivityLevel;

/// Describes a single capability (tool, RPC method, or REST operation) on a resource.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Capability {
    id: CapabilityId,
    resource_id: ResourceId,
    name: String,
    description: Option<String>,
    input_schema: Value,
    output_schema: Value,
    sensitivity_level: SensitivityLevel,
    metadata: BTreeMap<String, Value>,
}

impl Capability {
    /// Starts building a capability descriptor.
    #[must_use]
    pub fn builder(resource_id: ResourceId, name: impl Into<String>) -> CapabilityBuilder {
        CapabilityBuilder::new(resource_id, name)
    }

    /// Globally addressable identifier (`"{endpoint}#{name}"`).
    #[must_use]
    pub fn id(&self) -> &CapabilityId {
        &self.id
    }

    /// Identifier of the owning resource.
    #[must_use]
    pub const fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    /// Capability name as advertised by the underlying protocol.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Optional human-readable description, used by the injection detector and sensitivity
    /// classifier as additional signal.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// JSON Schema describing accepted arguments.
    #[must_use]
    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    /// JSON Schema describing the result shape, when known.
    #[must_use]
    pub fn output_schema(&self) -> &Value {
        &self.output_schema
    }

    /// Sensitivity classification, either explicit or auto-detected from name/description.
    #[must_use]
    pub const fn sensitivity_level(&self) -> SensitivityLevel {
        self.sensitivity_level
    }

    /// Adapter-specific metadata (streaming flags, required-approval markers, and so on).
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }
}

/// Builder for [`Capability`].
pub struct CapabilityBuilder {
    id: Option<CapabilityId>,
    resource_id: ResourceId,
    name: String,
    description: Option<String>,
    input_schema: Value,
    output_schema: Value,
    sensitivity_level: Option<SensitivityLevel>,
    metadata: BTreeMap<String, Value>,
}

impl CapabilityBuilder {
    /// Creates a new builder for a capability owned by `resource_id`.
    #[must_use]
    pub fn new(resource_id: ResourceId, name: impl Into<String>) -> Self {
        Self {
            id: None,
            resource_id,
            name: name.into(),
            description: None,
            input_schema: Value::Object(serde_json::Map::new()),
            output_schema: Value::Object(serde_json::Map::new()),
            sensitivity_level: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Overrides the generated capability id.
    #[must_use]
    pub fn id(mut self, id: CapabilityId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the input JSON Schema.
    #[must_use]
    pub fn input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Sets the output JSON Schema.
    #[must_use]
    pub fn output_schema(mut self, schema: Value) -> Self {
        self.output_schema = schema;
        self
    }

    /// Sets an explicit sensitivity level, overriding auto-detection.
    #[must_use]
    pub const fn sensitivity_level(mut self, level: SensitivityLevel) -> Self {
        self.sensitivity_level = Some(level);
        self
    }

    /// Attaches a metadata entry.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Finalises the capability.
    ///
    /// When no explicit sensitivity level was set, falls back to
    /// [`crate::sensitivity_keywords::classify`] over the name and description.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapability`] if the name is empty.
    pub fn build(self) -> Result<Capability> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidCapability {
                reason: "name cannot be empty",
            });
        }

        let sensitivity_level = self.sensitivity_level.unwrap_or_else(|| {
            crate::sensitivity_keywords::classify(&self.name, self.description.as_deref())
        });

        let id = self
            .id
            .unwrap_or_else(|| CapabilityId::new(self.resource_id.to_string(), &self.name));

        Ok(Capability {
            id,
            resource_id: self.resource_id,
            name: self.name,
            description: self.description,
            input_schema: self.input_schema,
            output_schema: self.output_schema,
            sensitivity_level,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ResourceId;

    #[test]
    fn build_capability_assigns_id() {
        let resource_id = ResourceId::random();
        let capability = Capability::builder(resource_id, "read_file").build().unwrap();
        let (endpoint, name) = capability.id().split().unwrap();
        assert_eq!(endpoint, resource_id.to_string());
        assert_eq!(name, "read_file");
    }

    #[test]
    fn build_capability_auto_classifies_sensitivity() {
        let resource_id = ResourceId::random();
        let capability = Capability::builder(resource_id, "delete_record").build().unwrap();
        assert_eq!(capability.sensitivity_level(), SensitivityLevel::High);
    }

    #[test]
    fn build_capability_rejects_empty_name() {
        let resource_id = ResourceId::random();
        let err = Capability::builder(resource_id, "  ").build().unwrap_err();
        assert!(matches!(err, Error::InvalidCapability { .. }));
    }
}
