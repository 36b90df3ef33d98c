//! The general-purpose audit event: every governance side effect other than
//! a full policy decision (§4.3's richer [`crate::policy_log::PolicyDecisionLog`])
//! lands here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use sark_core::{CapabilityId, PrincipalId, RequestId, ResourceId};

/// Severity tier of an audit event, independent of [`sark_core::SensitivityLevel`]
/// (a resource's sensitivity does not change; an event's severity is a
/// judgment about this specific occurrence).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    /// Routine, informational.
    Low,
    /// Worth reviewing but not urgent.
    Medium,
    /// Forwarded to SIEM; should be triaged promptly.
    High,
    /// Forwarded to SIEM; should page on-call.
    Critical,
}

impl AuditSeverity {
    /// Whether this severity triggers SIEM forwarding (`high` or `critical`).
    #[must_use]
    pub const fn forwards_to_siem(self) -> bool {
        matches!(self, AuditSeverity::High | AuditSeverity::Critical)
    }

    /// Default retention horizon, in days, for events at this severity.
    #[must_use]
    pub const fn default_retention_days(self) -> u32 {
        match self {
            AuditSeverity::Low => 30,
            AuditSeverity::Medium => 90,
            AuditSeverity::High => 365,
            AuditSeverity::Critical => 730,
        }
    }
}

/// A single append-only audit record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique identifier for this event.
    pub id: Uuid,
    /// Partition key: when the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Free-form event kind label (e.g. `"injection_block"`, `"mfa_denied"`).
    pub event_kind: String,
    /// Severity of the event.
    pub severity: AuditSeverity,
    /// Principal the event concerns, if any.
    pub principal_id: Option<PrincipalId>,
    /// Resource the event concerns, if any.
    pub resource_id: Option<ResourceId>,
    /// Capability the event concerns, if any.
    pub capability_id: Option<CapabilityId>,
    /// Correlates this event with the originating invocation.
    pub request_id: Option<RequestId>,
    /// Stable outcome label (e.g. `"blocked"`, `"allowed"`, `"redacted"`).
    pub decision: Option<String>,
    /// Client IP address, when known.
    pub client_ip: Option<String>,
    /// Free-form structured detail payload.
    #[serde(default)]
    pub details: Map<String, Value>,
    /// When this event was successfully forwarded to a SIEM, if ever.
    #[serde(default)]
    pub siem_forwarded_at: Option<DateTime<Utc>>,
    /// How many days this event should be retained.
    pub retention_days: u32,
}

impl AuditEvent {
    /// Starts building an event of the given kind and severity, timestamped `now`.
    #[must_use]
    pub fn new(event_kind: impl Into<String>, severity: AuditSeverity, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: now,
            event_kind: event_kind.into(),
            retention_days: severity.default_retention_days(),
            severity,
            principal_id: None,
            resource_id: None,
            capability_id: None,
            request_id: None,
            decision: None,
            client_ip: None,
            details: Map::new(),
            siem_forwarded_at: None,
        }
    }

    /// Attaches the principal this event concerns.
    #[must_use]
    pub fn with_principal(mut self, principal_id: PrincipalId) -> Self {
        self.principal_id = Some(principal_id);
        self
    }

    /// Attaches the capability this event concerns.
    #[must_use]
    pub fn with_capability(mut self, capability_id: CapabilityId) -> Self {
        self.capability_id = Some(capability_id);
        self
    }

    /// Attaches the request this event correlates with.
    #[must_use]
    pub fn with_request(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Attaches a stable decision/outcome label.
    #[must_use]
    pub fn with_decision(mut self, decision: impl Into<String>) -> Self {
        self.decision = Some(decision.into());
        self
    }

    /// Attaches the client IP address.
    #[must_use]
    pub fn with_client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.client_ip = Some(client_ip.into());
        self
    }

    /// Inserts a detail field.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Marks the event as forwarded to SIEM at the given time.
    pub fn mark_siem_forwarded(&mut self, at: DateTime<Utc>) {
        self.siem_forwarded_at = Some(at);
    }

    /// Whether this event should be enqueued for SIEM forwarding.
    #[must_use]
    pub fn needs_siem_forwarding(&self) -> bool {
        self.severity.forwards_to_siem() && self.siem_forwarded_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_and_critical_severities_forward_to_siem() {
        assert!(AuditSeverity::High.forwards_to_siem());
        assert!(AuditSeverity::Critical.forwards_to_siem());
        assert!(!AuditSeverity::Low.forwards_to_siem());
        assert!(!AuditSeverity::Medium.forwards_to_siem());
    }

    #[test]
    fn needs_forwarding_until_marked() {
        let mut event = AuditEvent::new("injection_block", AuditSeverity::Critical, Utc::now());
        assert!(event.needs_siem_forwarding());
        event.mark_siem_forwarded(Utc::now());
        assert!(!event.needs_siem_forwarding());
    }

    #[test]
    fn low_severity_never_needs_forwarding() {
        let event = AuditEvent::new("mfa_pending", AuditSeverity::Low, Utc::now());
        assert!(!event.needs_siem_forwarding());
    }
}
