//! Time-bounded export of audit data, in CSV (policy decisions) and JSON
//! (full event structure) forms.

use chrono::{DateTime, Utc};
use csv::WriterBuilder;

use crate::error::AuditResult;
use crate::event::AuditEvent;
use crate::policy_log::PolicyDecisionLog;

/// Bounds applied to an export request.
#[derive(Clone, Copy, Debug)]
pub struct ExportRange {
    /// Earliest timestamp to include (inclusive).
    pub since: DateTime<Utc>,
    /// Latest timestamp to include (inclusive).
    pub until: DateTime<Utc>,
}

impl ExportRange {
    fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.since && timestamp <= self.until
    }
}

/// Renders policy decision rows falling within `range` as CSV text.
///
/// # Errors
///
/// Returns an error if the underlying CSV writer fails.
pub fn export_policy_decisions_csv(rows: &[PolicyDecisionLog], range: ExportRange) -> AuditResult<String> {
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(Vec::new());
    writer.write_record(PolicyDecisionLog::csv_headers())?;
    for row in rows.iter().filter(|row| range.contains(row.timestamp)) {
        writer.write_record(row.csv_row())?;
    }
    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Renders audit events falling within `range` as a JSON array, preserving
/// full event structure (unlike the flattened CSV form).
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn export_events_json(events: &[AuditEvent], range: ExportRange) -> AuditResult<String> {
    let filtered: Vec<&AuditEvent> = events.iter().filter(|event| range.contains(event.timestamp)).collect();
    Ok(serde_json::to_string_pretty(&filtered)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AuditSeverity;
    use chrono::Duration;
    use serde_json::Map;
    use uuid::Uuid;

    fn sample_row(timestamp: DateTime<Utc>) -> PolicyDecisionLog {
        PolicyDecisionLog {
            id: Uuid::new_v4(),
            timestamp,
            result: "allow".into(),
            allow: true,
            user_id: "user-1".into(),
            user_role: "engineer".into(),
            user_teams: vec!["platform".into()],
            action: "invoke_capability".into(),
            resource_type: Some("mcp".into()),
            resource_id: Some("res-1".into()),
            capability_id: Some("stdio://fs#read_file".into()),
            capability_name: Some("read_file".into()),
            sensitivity_level: Some("low".into()),
            server_id: Some("res-1".into()),
            server_name: Some("fs".into()),
            policies_evaluated: vec!["default-allow".into()],
            policy_results: Map::new(),
            violations: vec![],
            reason: None,
            denial_reason: None,
            evaluation_duration_ms: 1.1,
            cache_hit: false,
            client_ip: None,
            request_id: "req-1".into(),
            session_id: None,
            mfa_verified: false,
            mfa_method: None,
            time_based_allowed: true,
            ip_filtering_allowed: true,
            mfa_required_satisfied: true,
        }
    }

    #[test]
    fn csv_export_excludes_rows_outside_range() {
        let now = Utc::now();
        let rows = vec![sample_row(now), sample_row(now - Duration::days(10))];
        let range = ExportRange {
            since: now - Duration::days(1),
            until: now + Duration::days(1),
        };
        let csv = export_policy_decisions_csv(&rows, range).unwrap();
        assert_eq!(csv.lines().count(), 2); // header + 1 matching row
    }

    #[test]
    fn json_export_preserves_structure() {
        let now = Utc::now();
        let events = vec![AuditEvent::new("injection_block", AuditSeverity::Critical, now)];
        let range = ExportRange {
            since: now - Duration::minutes(1),
            until: now + Duration::minutes(1),
        };
        let json = export_events_json(&events, range).unwrap();
        assert!(json.contains("\"event_kind\""));
        assert!(json.contains("injection_block"));
    }
}
