//! Metrics exporter configuration.
//!
//! A minimal in-process counter set. The gateway's `metrics` accessor
//! (§4.9) surfaces these alongside circuit-breaker state and stdio PIDs;
//! nothing here assumes a particular metrics backend, matching the
//! teacher's scaffolding intent of keeping exporters out of the hot path.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide governance counters.
///
/// Every field is an independent [`AtomicU64`]; snapshotting via
/// [`Metrics::snapshot`] is not atomic across fields, which is acceptable
/// for a dashboard-style view.
#[derive(Debug, Default)]
pub struct Metrics {
    decisions_allowed: AtomicU64,
    decisions_denied: AtomicU64,
    cache_hits: AtomicU64,
    injection_blocked: AtomicU64,
    injection_alerted: AtomicU64,
    secrets_redacted: AtomicU64,
    anomalies_detected: AtomicU64,
    mfa_challenges_issued: AtomicU64,
    mfa_challenges_approved: AtomicU64,
    siem_events_forwarded: AtomicU64,
    siem_forward_failures: AtomicU64,
}

/// Point-in-time snapshot of [`Metrics`], suitable for serialization.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Count of `allow=true` policy decisions.
    pub decisions_allowed: u64,
    /// Count of `allow=false` policy decisions.
    pub decisions_denied: u64,
    /// Count of decisions served from the decision cache.
    pub cache_hits: u64,
    /// Count of requests blocked by the injection response handler.
    pub injection_blocked: u64,
    /// Count of requests allowed but flagged at the "alert" tier.
    pub injection_alerted: u64,
    /// Count of secret findings redacted from emitted results.
    pub secrets_redacted: u64,
    /// Count of behavioral anomalies detected.
    pub anomalies_detected: u64,
    /// Count of MFA challenges created.
    pub mfa_challenges_issued: u64,
    /// Count of MFA challenges that reached `Approved`.
    pub mfa_challenges_approved: u64,
    /// Count of audit events successfully forwarded to a SIEM sink.
    pub siem_events_forwarded: u64,
    /// Count of SIEM forwarding batches that failed after retries.
    pub siem_forward_failures: u64,
}

macro_rules! counter_methods {
    ($($incr:ident, $get:ident, $field:ident);+ $(;)?) => {
        $(
            #[doc = concat!("Increment the `", stringify!($field), "` counter by one.")]
            pub fn $incr(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }

            #[doc = concat!("Read the current `", stringify!($field), "` counter value.")]
            #[must_use]
            pub fn $get(&self) -> u64 {
                self.$field.load(Ordering::Relaxed)
            }
        )+
    };
}

impl Metrics {
    /// Construct a fresh, zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    counter_methods! {
        record_decision_allowed, decisions_allowed, decisions_allowed;
        record_decision_denied, decisions_denied, decisions_denied;
        record_cache_hit, cache_hits, cache_hits;
        record_injection_blocked, injection_blocked, injection_blocked;
        record_injection_alerted, injection_alerted, injection_alerted;
        record_secret_redacted, secrets_redacted, secrets_redacted;
        record_anomaly_detected, anomalies_detected, anomalies_detected;
        record_mfa_challenge_issued, mfa_challenges_issued, mfa_challenges_issued;
        record_mfa_challenge_approved, mfa_challenges_approved, mfa_challenges_approved;
        record_siem_forwarded, siem_events_forwarded, siem_events_forwarded;
        record_siem_forward_failure, siem_forward_failures, siem_forward_failures;
    }

    /// Take a serializable snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            decisions_allowed: self.decisions_allowed(),
            decisions_denied: self.decisions_denied(),
            cache_hits: self.cache_hits(),
            injection_blocked: self.injection_blocked(),
            injection_alerted: self.injection_alerted(),
            secrets_redacted: self.secrets_redacted(),
            anomalies_detected: self.anomalies_detected(),
            mfa_challenges_issued: self.mfa_challenges_issued(),
            mfa_challenges_approved: self.mfa_challenges_approved(),
            siem_events_forwarded: self.siem_events_forwarded(),
            siem_forward_failures: self.siem_forward_failures(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_increment() {
        let metrics = Metrics::new();
        assert_eq!(metrics.decisions_allowed(), 0);
        metrics.record_decision_allowed();
        metrics.record_decision_allowed();
        metrics.record_decision_denied();
        let snap = metrics.snapshot();
        assert_eq!(snap.decisions_allowed, 2);
        assert_eq!(snap.decisions_denied, 1);
    }
}
