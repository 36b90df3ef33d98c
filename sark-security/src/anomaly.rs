//! Anomaly detection against a behavioral baseline, and alert-level escalation.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use sark_core::PrincipalId;

use crate::behavioral::{BehavioralBaseline, BehavioralEvent};

/// Window over which invocations are counted for the `rapid_requests` rule.
const RAPID_REQUEST_WINDOW_SECS: i64 = 60;
/// Minimum count of events inside [`RAPID_REQUEST_WINDOW_SECS`] to trigger `rapid_requests`.
const RAPID_REQUEST_THRESHOLD: usize = 10;
/// A result is "excessive" once it exceeds this multiple of the baseline's max.
const EXCESSIVE_DATA_MULTIPLIER: u64 = 3;

/// Severity assigned to a detected anomaly.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    /// Minor deviation, worth recording.
    Low,
    /// Noteworthy deviation.
    Medium,
    /// Strong deviation from established behavior.
    High,
    /// Deviation severe enough to warrant immediate attention regardless of count.
    Critical,
}

/// The rule that produced an [`Anomaly`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Capability not among the principal's common capabilities.
    UnusualTool,
    /// Invocation occurred outside the principal's typical hours.
    UnusualTime,
    /// Invocation occurred on a weekday outside the principal's typical days.
    UnusualDay,
    /// Result size far exceeds what the principal has historically retrieved.
    ExcessiveData,
    /// Invocation sensitivity exceeds anything previously observed for the principal.
    SensitivityEscalation,
    /// Unusually high request rate in a short window.
    RapidRequests,
    /// Invocation from a location not previously associated with the principal.
    GeographicAnomaly,
}

impl AnomalyKind {
    /// Fixed severity associated with this rule.
    #[must_use]
    pub const fn severity(self) -> AnomalySeverity {
        match self {
            Self::UnusualTool | Self::UnusualDay => AnomalySeverity::Low,
            Self::UnusualTime | Self::RapidRequests | Self::GeographicAnomaly => AnomalySeverity::Medium,
            Self::ExcessiveData | Self::SensitivityEscalation => AnomalySeverity::High,
        }
    }

    /// Fixed confidence associated with this rule.
    #[must_use]
    pub const fn confidence(self) -> f64 {
        match self {
            Self::UnusualDay => 0.6,
            Self::UnusualTool => 0.7,
            Self::GeographicAnomaly => 0.75,
            Self::RapidRequests => 0.85,
            Self::UnusualTime => 0.8,
            Self::ExcessiveData => 0.9,
            Self::SensitivityEscalation => 0.95,
        }
    }
}

/// A single behavioral anomaly detected for a principal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Anomaly {
    /// Principal the anomaly was observed for.
    pub principal_id: PrincipalId,
    /// Rule that fired.
    pub kind: AnomalyKind,
    /// Human-readable explanation.
    pub description: String,
    /// Assigned severity (fixed per [`AnomalyKind`]).
    pub severity: AnomalySeverity,
    /// Assigned confidence in `[0.0, 1.0]` (fixed per [`AnomalyKind`]).
    pub confidence: f64,
    /// When the anomaly was detected.
    pub detected_at: DateTime<Utc>,
}

/// Compares new events against a learned baseline to surface behavioral anomalies.
///
/// Runs off the request's critical path: the caller schedules detection as a
/// background task so authorization is never blocked on baseline comparison.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnomalyDetector;

impl AnomalyDetector {
    /// Creates a new detector. Stateless; baselines are supplied per call.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Evaluates every rule in the spec's anomaly table against `event`.
    ///
    /// `recent_events` should contain the principal's invocations from
    /// shortly before `event.timestamp` (at least the last
    /// [`RAPID_REQUEST_WINDOW_SECS`] seconds) so `rapid_requests` can count
    /// them; it does not need to include `event` itself.
    ///
    /// A baseline built from zero history (`baseline.is_empty()`) never
    /// triggers anything: there is nothing yet to deviate from.
    #[must_use]
    pub fn detect(
        &self,
        baseline: &BehavioralBaseline,
        event: &BehavioralEvent,
        recent_events: &[BehavioralEvent],
    ) -> Vec<Anomaly> {
        if baseline.is_empty() {
            return Vec::new();
        }

        let mut anomalies = Vec::new();
        let push = |anomalies: &mut Vec<Anomaly>, kind: AnomalyKind, description: String| {
            anomalies.push(Anomaly {
                principal_id: event.principal_id,
                kind,
                description,
                severity: kind.severity(),
                confidence: kind.confidence(),
                detected_at: event.timestamp,
            });
        };

        if !baseline.common_capabilities().is_empty() && !baseline.is_common_capability(&event.action) {
            push(
                &mut anomalies,
                AnomalyKind::UnusualTool,
                format!("`{}` is not among this principal's common capabilities", event.action),
            );
        }

        if !baseline.typical_hours().is_empty() {
            let hour = event.timestamp.hour();
            if !baseline.typical_hours().contains(&hour) {
                push(
                    &mut anomalies,
                    AnomalyKind::UnusualTime,
                    format!("invocation at hour {hour} falls outside typical activity hours"),
                );
            }
        }

        if !baseline.typical_days().is_empty() {
            let weekday = event.timestamp.weekday().num_days_from_monday();
            if !baseline.typical_days().contains(&weekday) {
                push(
                    &mut anomalies,
                    AnomalyKind::UnusualDay,
                    "invocation occurred on an atypical day of the week".to_owned(),
                );
            }
        }

        if baseline.max_records_per_query() > 0
            && event.result_size > baseline.max_records_per_query() * EXCESSIVE_DATA_MULTIPLIER
        {
            push(
                &mut anomalies,
                AnomalyKind::ExcessiveData,
                format!(
                    "result size {} exceeds {}x the principal's historical maximum of {}",
                    event.result_size,
                    EXCESSIVE_DATA_MULTIPLIER,
                    baseline.max_records_per_query()
                ),
            );
        }

        if event.sensitivity_level > baseline.max_sensitivity_level() {
            push(
                &mut anomalies,
                AnomalyKind::SensitivityEscalation,
                format!(
                    "sensitivity {} exceeds the principal's historical maximum of {}",
                    event.sensitivity_level,
                    baseline.max_sensitivity_level()
                ),
            );
        }

        let window_start = event.timestamp - Duration::seconds(RAPID_REQUEST_WINDOW_SECS);
        let recent_count = recent_events
            .iter()
            .filter(|e| e.principal_id == event.principal_id && e.timestamp > window_start && e.timestamp <= event.timestamp)
            .count()
            + 1;
        if recent_count >= RAPID_REQUEST_THRESHOLD {
            push(
                &mut anomalies,
                AnomalyKind::RapidRequests,
                format!("{recent_count} invocations within the last {RAPID_REQUEST_WINDOW_SECS}s"),
            );
        }

        if !baseline.typical_locations().is_empty() {
            if let Some(location) = &event.location {
                if !baseline.typical_locations().contains(location) {
                    push(
                        &mut anomalies,
                        AnomalyKind::GeographicAnomaly,
                        format!("invocation from `{location}`, not previously associated with this principal"),
                    );
                }
            }
        }

        anomalies
    }
}

/// Overall alert level derived from a batch of anomalies.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// No escalation warranted.
    None,
    /// Notable pattern, worth a dashboard entry.
    Warning,
    /// Immediate operator attention warranted.
    Critical,
}

/// Thresholds controlling how anomaly counts escalate to an [`AlertLevel`].
#[derive(Clone, Copy, Debug)]
pub struct AlertConfig {
    /// High-severity anomaly count that alone triggers a critical alert.
    pub critical_high_count: usize,
    /// High-severity anomaly count that triggers a warning alert.
    pub warning_high_count: usize,
    /// Medium-severity anomaly count that triggers a warning alert.
    pub warning_medium_count: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            critical_high_count: 2,
            warning_high_count: 1,
            warning_medium_count: 3,
        }
    }
}

/// Determines the alert level for a batch of anomalies under `config`.
#[must_use]
pub fn determine_alert_level(anomalies: &[Anomaly], config: &AlertConfig) -> AlertLevel {
    let critical_count = anomalies.iter().filter(|a| a.severity == AnomalySeverity::Critical).count();
    let high_count = anomalies.iter().filter(|a| a.severity == AnomalySeverity::High).count();
    let medium_count = anomalies.iter().filter(|a| a.severity == AnomalySeverity::Medium).count();

    if critical_count > 0 || high_count >= config.critical_high_count {
        AlertLevel::Critical
    } else if high_count >= config.warning_high_count || medium_count >= config.warning_medium_count {
        AlertLevel::Warning
    } else {
        AlertLevel::None
    }
}

/// Sink notified when an anomaly batch resolves to an [`AlertLevel`] above `None`.
///
/// Implementations must never propagate errors: anomaly alerting is explicitly
/// fail-open so a broken sink cannot block invocation traffic.
pub trait AnomalyAlertSink: Send + Sync {
    /// Called with the anomalies and the computed alert level.
    fn on_alert(&self, anomalies: &[Anomaly], level: AlertLevel);
}

/// Sink that logs via `tracing`, matching the teacher's observer-over-tracing idiom.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAlertSink;

impl AnomalyAlertSink for TracingAlertSink {
    fn on_alert(&self, anomalies: &[Anomaly], level: AlertLevel) {
        match level {
            AlertLevel::Critical => warn!(count = anomalies.len(), "critical behavioral anomaly alert"),
            AlertLevel::Warning => info!(count = anomalies.len(), "behavioral anomaly warning"),
            AlertLevel::None => {}
        }
    }
}

/// Dispatches anomaly batches to a set of sinks, catching and logging any panic-free
/// failure from each sink so one broken sink cannot suppress the others.
#[derive(Clone, Default)]
pub struct AnomalyAlertDispatcher {
    sinks: Vec<Arc<dyn AnomalyAlertSink>>,
    config: AlertConfigHandle,
}

#[derive(Clone, Copy, Debug, Default)]
struct AlertConfigHandle(Option<AlertConfigInner>);

#[derive(Clone, Copy, Debug)]
struct AlertConfigInner(AlertConfig);

impl AnomalyAlertDispatcher {
    /// Creates a dispatcher with the supplied alert thresholds.
    #[must_use]
    pub fn new(config: AlertConfig) -> Self {
        Self {
            sinks: Vec::new(),
            config: AlertConfigHandle(Some(AlertConfigInner(config))),
        }
    }

    /// Registers a sink.
    pub fn add_sink(&mut self, sink: Arc<dyn AnomalyAlertSink>) {
        self.sinks.push(sink);
    }

    /// Evaluates `anomalies` and notifies every sink if the alert level is above `None`.
    pub fn dispatch(&self, anomalies: &[Anomaly]) {
        if anomalies.is_empty() {
            return;
        }

        let config = self.config.0.map_or_else(AlertConfig::default, |inner| inner.0);
        let level = determine_alert_level(anomalies, &config);
        if level == AlertLevel::None {
            return;
        }

        for sink in &self.sinks {
            sink.on_alert(anomalies, level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavioral::BehavioralEvent;
    use sark_core::SensitivityLevel;

    fn baseline_for(principal: PrincipalId) -> BehavioralBaseline {
        let events = vec![BehavioralEvent {
            principal_id: principal,
            action: "read".to_owned(),
            sensitivity_level: SensitivityLevel::Low,
            result_size: 10,
            location: Some("us-east".to_owned()),
            timestamp: Utc::now(),
        }];
        BehavioralBaseline::from_events(principal, &events, 30)
    }

    fn base_event(principal: PrincipalId) -> BehavioralEvent {
        BehavioralEvent {
            principal_id: principal,
            action: "read".to_owned(),
            sensitivity_level: SensitivityLevel::Low,
            result_size: 10,
            location: Some("us-east".to_owned()),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn detects_sensitivity_escalation_as_high() {
        let principal = PrincipalId::random();
        let baseline = baseline_for(principal);
        let mut event = base_event(principal);
        event.sensitivity_level = SensitivityLevel::Critical;

        let anomalies = AnomalyDetector::new().detect(&baseline, &event, &[]);
        assert!(anomalies.iter().any(|a| a.kind == AnomalyKind::SensitivityEscalation));
        assert!(anomalies.iter().any(|a| a.severity == AnomalySeverity::High));
    }

    #[test]
    fn no_anomaly_for_typical_behavior() {
        let principal = PrincipalId::random();
        let baseline = baseline_for(principal);
        let event = base_event(principal);

        assert!(AnomalyDetector::new().detect(&baseline, &event, &[]).is_empty());
    }

    #[test]
    fn detects_excessive_data() {
        let principal = PrincipalId::random();
        let baseline = baseline_for(principal);
        let mut event = base_event(principal);
        event.result_size = 1000;

        let anomalies = AnomalyDetector::new().detect(&baseline, &event, &[]);
        assert!(anomalies.iter().any(|a| a.kind == AnomalyKind::ExcessiveData));
    }

    #[test]
    fn detects_rapid_requests() {
        let principal = PrincipalId::random();
        let baseline = baseline_for(principal);
        let event = base_event(principal);
        let recent: Vec<BehavioralEvent> = (0..9)
            .map(|_| {
                let mut e = base_event(principal);
                e.timestamp = event.timestamp - Duration::seconds(10);
                e
            })
            .collect();

        let anomalies = AnomalyDetector::new().detect(&baseline, &event, &recent);
        assert!(anomalies.iter().any(|a| a.kind == AnomalyKind::RapidRequests));
    }

    #[test]
    fn detects_geographic_anomaly() {
        let principal = PrincipalId::random();
        let baseline = baseline_for(principal);
        let mut event = base_event(principal);
        event.location = Some("unknown-region".to_owned());

        let anomalies = AnomalyDetector::new().detect(&baseline, &event, &[]);
        assert!(anomalies.iter().any(|a| a.kind == AnomalyKind::GeographicAnomaly));
    }

    #[test]
    fn empty_baseline_never_triggers() {
        let principal = PrincipalId::random();
        let baseline = BehavioralBaseline::from_events(principal, &[], 30);
        let mut event = base_event(principal);
        event.sensitivity_level = SensitivityLevel::Critical;

        assert!(AnomalyDetector::new().detect(&baseline, &event, &[]).is_empty());
    }

    #[test]
    fn alert_level_escalates_to_critical_on_high_count() {
        let config = AlertConfig::default();
        let principal = PrincipalId::random();
        let anomalies = vec![
            Anomaly {
                principal_id: principal,
                kind: AnomalyKind::ExcessiveData,
                description: "a".into(),
                severity: AnomalySeverity::High,
                confidence: 0.9,
                detected_at: Utc::now(),
            },
            Anomaly {
                principal_id: principal,
                kind: AnomalyKind::SensitivityEscalation,
                description: "b".into(),
                severity: AnomalySeverity::High,
                confidence: 0.95,
                detected_at: Utc::now(),
            },
        ];

        assert_eq!(determine_alert_level(&anomalies, &config), AlertLevel::Critical);
    }

    #[test]
    fn alert_level_warns_on_medium_cluster() {
        let config = AlertConfig::default();
        let principal = PrincipalId::random();
        let anomalies = vec![AnomalyKind::UnusualTime, AnomalyKind::RapidRequests, AnomalyKind::GeographicAnomaly]
            .into_iter()
            .map(|kind| Anomaly {
                principal_id: principal,
                kind,
                description: "x".into(),
                severity: kind.severity(),
                confidence: kind.confidence(),
                detected_at: Utc::now(),
            })
            .collect::<Vec<_>>();

        assert_eq!(determine_alert_level(&anomalies, &config), AlertLevel::Warning);
    }
}
