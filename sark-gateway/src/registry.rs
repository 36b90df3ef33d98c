//! Resolves a capability id to a live adapter entry.
//!
//! [`CapabilityId`] carries the owning resource's endpoint as a prefix
//! (`"{endpoint}#{name}"`, see `sark_core::ids`), so the registry keys
//! registered resources by endpoint and resolves a capability back to its
//! transport with a single lookup: split the id, look up the endpoint, then
//! look up the capability name among that resource's discovered
//! capabilities. This is the lookup mechanism the governance surface left
//! unspecified — a registry keyed by resource endpoint, as its own open
//! question anticipated.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use sark_adapters::error::AdapterResult;
use sark_adapters::traits::{DiscoveryConfig, ProtocolAdapter};
use sark_core::{Capability, CapabilityId, Resource, ResourceId};

/// A resource together with the adapter that governs it and its discovered capabilities.
pub struct RegisteredResource {
    resource: Resource,
    adapter: Arc<dyn ProtocolAdapter>,
    capabilities: BTreeMap<String, Capability>,
}

impl RegisteredResource {
    /// The registered resource's descriptor.
    #[must_use]
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// The adapter governing this resource's transport.
    #[must_use]
    pub fn adapter(&self) -> &Arc<dyn ProtocolAdapter> {
        &self.adapter
    }

    /// Capabilities discovered on this resource, keyed by capability name.
    pub fn capabilities(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.values()
    }
}

/// A capability resolved back to its owning resource and live transport.
///
/// Owns cloned snapshots of the resource and capability rather than
/// borrowing from the registry, so callers can hold it across `.await`
/// points without pinning a [`DashMap`] shard guard.
pub struct ResolvedCapability {
    /// Owning resource, as of resolution time.
    pub resource: Resource,
    /// The capability descriptor, as of resolution time.
    pub capability: Capability,
    /// Adapter to invoke the capability through.
    pub adapter: Arc<dyn ProtocolAdapter>,
}

/// Errors produced while registering resources or resolving capabilities.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No resource is registered at the referenced endpoint.
    #[error("no resource registered at endpoint `{endpoint}`")]
    UnknownEndpoint {
        /// Endpoint the capability id referenced.
        endpoint: String,
    },
    /// The capability id could not be split into `(endpoint, name)`.
    #[error("malformed capability id `{capability_id}`")]
    MalformedCapabilityId {
        /// The id that failed to split.
        capability_id: String,
    },
    /// The resource is registered but does not expose a capability by this name.
    #[error("resource `{endpoint}` has no capability named `{name}`")]
    UnknownCapability {
        /// Endpoint of the resource that was checked.
        endpoint: String,
        /// Capability name that was not found.
        name: String,
    },
    /// Adapter discovery or lifecycle hook failed while registering a resource.
    #[error(transparent)]
    Adapter(#[from] sark_adapters::error::AdapterError),
}

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Process-wide table of governed resources, keyed by endpoint.
///
/// A singleton shared by the gateway pipeline with explicit
/// registration/deregistration hooks; no hidden module-load-time state.
#[derive(Default)]
pub struct ResourceRegistry {
    by_endpoint: DashMap<String, RegisteredResource>,
    endpoint_by_id: DashMap<ResourceId, String>,
}

impl ResourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs discovery through `adapter` and registers every resource it
    /// surfaces, along with their capabilities.
    ///
    /// # Errors
    ///
    /// Propagates discovery/capability-listing failures from the adapter.
    pub async fn discover(
        &self,
        adapter: Arc<dyn ProtocolAdapter>,
        config: &DiscoveryConfig,
    ) -> RegistryResult<Vec<ResourceId>> {
        let resources = adapter.discover_resources(config).await?;
        let mut ids = Vec::with_capacity(resources.len());
        for resource in resources {
            ids.push(self.register(Arc::clone(&adapter), resource).await?);
        }
        Ok(ids)
    }

    /// Registers a single, already-discovered resource and lists its capabilities.
    ///
    /// # Errors
    ///
    /// Propagates capability-listing failures and the adapter's `on_register` hook.
    pub async fn register(
        &self,
        adapter: Arc<dyn ProtocolAdapter>,
        resource: Resource,
    ) -> RegistryResult<ResourceId> {
        adapter.on_register(&resource).await?;
        let capabilities = adapter.capabilities(&resource).await?;
        let id = resource.id();
        let endpoint = resource.endpoint().to_owned();

        let capability_map = capabilities
            .into_iter()
            .map(|c| (c.name().to_owned(), c))
            .collect();

        self.endpoint_by_id.insert(id, endpoint.clone());
        self.by_endpoint.insert(
            endpoint,
            RegisteredResource {
                resource,
                adapter,
                capabilities: capability_map,
            },
        );
        Ok(id)
    }

    /// Deregisters a resource, running the adapter's `on_unregister` hook.
    ///
    /// # Errors
    ///
    /// Propagates the adapter's `on_unregister` hook failure. The resource
    /// is removed from the registry regardless of the hook's outcome.
    pub async fn deregister(&self, resource_id: ResourceId) -> AdapterResult<()> {
        let Some((_, endpoint)) = self.endpoint_by_id.remove(&resource_id) else {
            return Ok(());
        };
        if let Some((_, entry)) = self.by_endpoint.remove(&endpoint) {
            entry.adapter.on_unregister(&entry.resource).await?;
        }
        Ok(())
    }

    /// Resolves a capability id back to its owning resource, descriptor, and adapter.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::MalformedCapabilityId`], [`RegistryError::UnknownEndpoint`],
    /// or [`RegistryError::UnknownCapability`] as appropriate.
    pub fn resolve(&self, capability_id: &CapabilityId) -> RegistryResult<ResolvedCapability> {
        let (endpoint, name) = capability_id
            .split()
            .ok_or_else(|| RegistryError::MalformedCapabilityId {
                capability_id: capability_id.as_str().to_owned(),
            })?;

        let entry = self
            .by_endpoint
            .get(endpoint)
            .ok_or_else(|| RegistryError::UnknownEndpoint {
                endpoint: endpoint.to_owned(),
            })?;

        let capability = entry
            .capabilities
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownCapability {
                endpoint: endpoint.to_owned(),
                name: name.to_owned(),
            })?;

        Ok(ResolvedCapability {
            resource: entry.resource.clone(),
            capability,
            adapter: Arc::clone(&entry.adapter),
        })
    }

    /// Number of resources currently registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_endpoint.len()
    }

    /// Whether the registry has no resources registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_endpoint.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sark_adapters::error::AdapterResult as Result_;
    use sark_core::{InvocationRequest, InvocationResult, SensitivityLevel};

    struct StubAdapter;

    #[async_trait]
    impl ProtocolAdapter for StubAdapter {
        fn protocol_name(&self) -> &'static str {
            "stub"
        }
        fn protocol_version(&self) -> &'static str {
            "1.0"
        }
        async fn discover_resources(&self, config: &DiscoveryConfig) -> Result_<Vec<Resource>> {
            Ok(config
                .endpoints
                .iter()
                .map(|e| {
                    Resource::builder("stub", e.clone())
                        .sensitivity_level(SensitivityLevel::Medium)
                        .build()
                        .unwrap()
                })
                .collect())
        }
        async fn capabilities(&self, resource: &Resource) -> Result_<Vec<Capability>> {
            Ok(vec![Capability::builder(resource.id(), "read_file").build().unwrap()])
        }
        fn validate(&self, _request: &InvocationRequest) -> Result_<()> {
            Ok(())
        }
        async fn invoke(&self, _request: &InvocationRequest) -> Result_<InvocationResult> {
            Ok(InvocationResult::success(serde_json::json!({"ok": true}), 1.0))
        }
        async fn health(&self, _resource: &Resource) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn discover_then_resolve_round_trips() {
        let registry = ResourceRegistry::new();
        let adapter: Arc<dyn ProtocolAdapter> = Arc::new(StubAdapter);
        let config = DiscoveryConfig::single("stdio://files");
        let ids = registry.discover(Arc::clone(&adapter), &config).await.unwrap();
        assert_eq!(ids.len(), 1);

        let capability_id = CapabilityId::new("stdio://files", "read_file");
        let resolved = registry.resolve(&capability_id).unwrap();
        assert_eq!(resolved.capability.name(), "read_file");
        assert_eq!(resolved.resource.endpoint(), "stdio://files");
    }

    #[tokio::test]
    async fn resolve_unknown_endpoint_errors() {
        let registry = ResourceRegistry::new();
        let capability_id = CapabilityId::new("stdio://nowhere", "read_file");
        let err = registry.resolve(&capability_id).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownEndpoint { .. }));
    }

    #[tokio::test]
    async fn deregister_removes_endpoint() {
        let registry = ResourceRegistry::new();
        let adapter: Arc<dyn ProtocolAdapter> = Arc::new(StubAdapter);
        let config = DiscoveryConfig::single("stdio://files");
        let ids = registry.discover(Arc::clone(&adapter), &config).await.unwrap();
        registry.deregister(ids[0]).await.unwrap();
        assert!(registry.is_empty());
    }
}
