//! The authorization input assembled for every governed invocation.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sark_core::{CapabilityId, PrincipalId, RequestId, ResourceId};

/// Snapshot of the acting principal carried into policy evaluation.
///
/// Distinct from [`sark_core::Principal`]: this is the flattened,
/// serializable view an external evaluator actually receives, not the
/// owning type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserContext {
    /// Principal identifier.
    pub id: PrincipalId,
    /// Principal role.
    pub role: String,
    /// Team memberships.
    pub teams: Vec<String>,
    /// Whether the principal has completed MFA for this session.
    pub mfa_verified: bool,
    /// MFA methods available to the principal.
    pub mfa_methods: Vec<String>,
}

/// Network/request metadata attached to the evaluation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestContext {
    /// Client IP address, when known.
    pub client_ip: Option<String>,
    /// Correlates this evaluation with the originating invocation.
    pub request_id: RequestId,
    /// Wall-clock time the evaluation was requested.
    pub timestamp: DateTime<Utc>,
}

/// The action a principal is attempting to perform.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Invoking a capability on a governed resource.
    InvokeCapability,
    /// Listing or discovering resources/capabilities.
    DiscoverResources,
    /// Administrative edits to policy content itself.
    ManagePolicy,
}

impl Action {
    /// Stable label used in rule matching and audit logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Action::InvokeCapability => "invoke_capability",
            Action::DiscoverResources => "discover_resources",
            Action::ManagePolicy => "manage_policy",
        }
    }
}

/// The full authorization input assembled for a single evaluation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthorizationInput {
    /// Acting principal.
    pub user: UserContext,
    /// Action being attempted.
    pub action: Action,
    /// Capability being invoked, when the action targets one.
    pub tool: Option<CapabilityId>,
    /// Resource (server) being targeted, when applicable.
    pub server: Option<ResourceId>,
    /// Request/network context.
    pub context: RequestContext,
}

impl AuthorizationInput {
    /// Builds a new authorization input.
    #[must_use]
    pub fn new(
        user: UserContext,
        action: Action,
        request_id: RequestId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user,
            action,
            tool: None,
            server: None,
            context: RequestContext {
                client_ip: None,
                request_id,
                timestamp,
            },
        }
    }

    /// Attaches the capability under invocation.
    #[must_use]
    pub fn with_tool(mut self, tool: CapabilityId) -> Self {
        self.tool = Some(tool);
        self
    }

    /// Attaches the resource under invocation.
    #[must_use]
    pub fn with_server(mut self, server: ResourceId) -> Self {
        self.server = Some(server);
        self
    }

    /// Attaches the client IP address.
    #[must_use]
    pub fn with_client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.context.client_ip = Some(client_ip.into());
        self
    }

    /// Deterministic cache key over the input, excluding `timestamp` and
    /// `request_id` (both vary on every request for the same logical
    /// decision and would otherwise defeat caching entirely).
    #[must_use]
    pub fn cache_key(&self) -> u64 {
        let mut teams = self.user.teams.clone();
        teams.sort_unstable();
        let mut methods = self.user.mfa_methods.clone();
        methods.sort_unstable();

        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.user.id.hash(&mut hasher);
        self.user.role.hash(&mut hasher);
        teams.hash(&mut hasher);
        self.user.mfa_verified.hash(&mut hasher);
        methods.hash(&mut hasher);
        self.action.label().hash(&mut hasher);
        self.tool.as_ref().map(CapabilityId::as_str).hash(&mut hasher);
        self.server.hash(&mut hasher);
        self.context.client_ip.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(request_id: RequestId, ts: DateTime<Utc>) -> AuthorizationInput {
        AuthorizationInput::new(
            UserContext {
                id: PrincipalId::default(),
                role: "analyst".into(),
                teams: vec!["secops".into(), "oncall".into()],
                mfa_verified: true,
                mfa_methods: vec!["totp".into()],
            },
            Action::InvokeCapability,
            request_id,
            ts,
        )
    }

    #[test]
    fn cache_key_ignores_request_id_and_timestamp() {
        let a = input(RequestId::default(), Utc::now());
        let b = input(RequestId::default(), Utc::now());
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn cache_key_ignores_team_order() {
        let ts = Utc::now();
        let mut a = input(RequestId::default(), ts);
        let mut b = a.clone();
        a.user.teams = vec!["secops".into(), "oncall".into()];
        b.user.teams = vec!["oncall".into(), "secops".into()];
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn cache_key_differs_on_tool() {
        let ts = Utc::now();
        let base = input(RequestId::default(), ts);
        let with_tool = base
            .clone()
            .with_tool(CapabilityId::new(ResourceId::default().to_string(), "delete_record"));
        assert_ne!(base.cache_key(), with_tool.cache_key());
    }
}
