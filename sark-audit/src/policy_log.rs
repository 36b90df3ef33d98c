//! The policy decision log: one entry per policy evaluation, matching the
//! relational on-disk schema named in the governance surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// One row of the policy decision log.
///
/// Field order mirrors the canonical column list: `id, timestamp, result,
/// allow, user_id, user_role, user_teams, action, resource_type,
/// resource_id, capability_id, capability_name, sensitivity_level,
/// server_id, server_name, policies_evaluated, policy_results, violations,
/// reason, denial_reason, evaluation_duration_ms, cache_hit, client_ip,
/// request_id, session_id, mfa_verified, mfa_method, time_based_allowed,
/// ip_filtering_allowed, mfa_required_satisfied`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyDecisionLog {
    /// Unique row identifier.
    pub id: Uuid,
    /// When the decision was produced.
    pub timestamp: DateTime<Utc>,
    /// Stable outcome label (`"allow"` or `"deny"`).
    pub result: String,
    /// Whether the action was permitted.
    pub allow: bool,
    /// Acting principal id.
    pub user_id: String,
    /// Acting principal role.
    pub user_role: String,
    /// Acting principal team memberships.
    pub user_teams: Vec<String>,
    /// Action label (e.g. `"invoke_capability"`).
    pub action: String,
    /// Resource protocol tag, when known.
    pub resource_type: Option<String>,
    /// Targeted resource id.
    pub resource_id: Option<String>,
    /// Targeted capability id.
    pub capability_id: Option<String>,
    /// Targeted capability name.
    pub capability_name: Option<String>,
    /// Sensitivity level of the targeted capability/resource.
    pub sensitivity_level: Option<String>,
    /// Targeted resource (server) id, duplicated for query convenience.
    pub server_id: Option<String>,
    /// Targeted resource (server) name.
    pub server_name: Option<String>,
    /// Names/ids of policies consulted.
    pub policies_evaluated: Vec<String>,
    /// Free-form per-policy result map.
    pub policy_results: Map<String, Value>,
    /// Violations that contributed to the verdict.
    pub violations: Vec<String>,
    /// Reason attached to the decision.
    pub reason: Option<String>,
    /// Reason specifically for a denial (mirrors `reason` when `allow=false`).
    pub denial_reason: Option<String>,
    /// How long evaluation took.
    pub evaluation_duration_ms: f64,
    /// Whether the decision was served from the decision cache.
    pub cache_hit: bool,
    /// Client IP address.
    pub client_ip: Option<String>,
    /// Correlates with the originating invocation.
    pub request_id: String,
    /// Session identifier, when the caller has one.
    pub session_id: Option<String>,
    /// Whether the principal had completed MFA at evaluation time.
    pub mfa_verified: bool,
    /// MFA method used, if any.
    pub mfa_method: Option<String>,
    /// Whether a time-of-day/day-of-week rule allowed the request.
    pub time_based_allowed: bool,
    /// Whether an IP allow/deny list rule allowed the request.
    pub ip_filtering_allowed: bool,
    /// Whether the MFA-required sub-check was satisfied.
    pub mfa_required_satisfied: bool,
}

impl PolicyDecisionLog {
    /// CSV column headers, in on-disk schema order.
    #[must_use]
    pub fn csv_headers() -> Vec<&'static str> {
        vec![
            "id",
            "timestamp",
            "result",
            "allow",
            "user_id",
            "user_role",
            "user_teams",
            "action",
            "resource_type",
            "resource_id",
            "capability_id",
            "capability_name",
            "sensitivity_level",
            "server_id",
            "server_name",
            "policies_evaluated",
            "policy_results",
            "violations",
            "reason",
            "denial_reason",
            "evaluation_duration_ms",
            "cache_hit",
            "client_ip",
            "request_id",
            "session_id",
            "mfa_verified",
            "mfa_method",
            "time_based_allowed",
            "ip_filtering_allowed",
            "mfa_required_satisfied",
        ]
    }

    /// Flat CSV row matching [`PolicyDecisionLog::csv_headers`].
    #[must_use]
    pub fn csv_row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.timestamp.to_rfc3339(),
            self.result.clone(),
            self.allow.to_string(),
            self.user_id.clone(),
            self.user_role.clone(),
            self.user_teams.join(";"),
            self.action.clone(),
            self.resource_type.clone().unwrap_or_default(),
            self.resource_id.clone().unwrap_or_default(),
            self.capability_id.clone().unwrap_or_default(),
            self.capability_name.clone().unwrap_or_default(),
            self.sensitivity_level.clone().unwrap_or_default(),
            self.server_id.clone().unwrap_or_default(),
            self.server_name.clone().unwrap_or_default(),
            self.policies_evaluated.join(";"),
            Value::Object(self.policy_results.clone()).to_string(),
            self.violations.join(";"),
            self.reason.clone().unwrap_or_default(),
            self.denial_reason.clone().unwrap_or_default(),
            self.evaluation_duration_ms.to_string(),
            self.cache_hit.to_string(),
            self.client_ip.clone().unwrap_or_default(),
            self.request_id.clone(),
            self.session_id.clone().unwrap_or_default(),
            self.mfa_verified.to_string(),
            self.mfa_method.clone().unwrap_or_default(),
            self.time_based_allowed.to_string(),
            self.ip_filtering_allowed.to_string(),
            self.mfa_required_satisfied.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PolicyDecisionLog {
        PolicyDecisionLog {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            result: "deny".into(),
            allow: false,
            user_id: "user-1".into(),
            user_role: "analyst".into(),
            user_teams: vec!["secops".into()],
            action: "invoke_capability".into(),
            resource_type: Some("mcp".into()),
            resource_id: Some("res-1".into()),
            capability_id: Some("stdio://db#delete_record".into()),
            capability_name: Some("delete_record".into()),
            sensitivity_level: Some("critical".into()),
            server_id: Some("res-1".into()),
            server_name: Some("db".into()),
            policies_evaluated: vec!["deny-delete".into()],
            policy_results: Map::new(),
            violations: vec!["destructive tool blocked".into()],
            reason: Some("destructive tool blocked".into()),
            denial_reason: Some("destructive tool blocked".into()),
            evaluation_duration_ms: 3.2,
            cache_hit: false,
            client_ip: Some("10.0.0.1".into()),
            request_id: "req-1".into(),
            session_id: None,
            mfa_verified: true,
            mfa_method: Some("totp".into()),
            time_based_allowed: true,
            ip_filtering_allowed: true,
            mfa_required_satisfied: true,
        }
    }

    #[test]
    fn csv_row_matches_header_length() {
        let row = sample();
        assert_eq!(row.csv_row().len(), PolicyDecisionLog::csv_headers().len());
    }

    #[test]
    fn csv_row_joins_list_fields_with_semicolons() {
        let row = sample();
        let values = row.csv_row();
        let teams_index = PolicyDecisionLog::csv_headers()
            .iter()
            .position(|h| *h == "user_teams")
            .unwrap();
        assert_eq!(values[teams_index], "secops");
    }
}
