//! Policy decision types returned by engines.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Advanced sub-results a policy evaluator may report alongside the primary
/// allow/deny verdict. Surfaced separately in the audit log rather than
/// folded into `allow`, since a request can be allowed overall while still
/// requiring, e.g., a fresh MFA challenge before the adapter call proceeds.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct AdvancedChecks {
    /// Whether the decision was gated by a time-of-day/day-of-week rule.
    pub time_based: bool,
    /// Whether the decision was gated by an IP allow/deny list.
    pub ip_filtering: bool,
    /// Whether step-up MFA is required before the invocation proceeds.
    pub mfa_required: bool,
}

/// Raw result returned by the narrow external-evaluator interface
/// (`evaluate(path, input) -> {allow, reason, filtered_parameters?,
/// violations?, policies_evaluated?}`). The engine is indifferent to the
/// policy language producing this.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EvaluatorOutcome {
    /// Whether the action is permitted.
    pub allow: bool,
    /// Reason for the verdict; required when `allow` is `false`.
    pub reason: Option<String>,
    /// Parameters the evaluator wants stripped/replaced before invocation.
    pub filtered_parameters: Option<Value>,
    /// Policy violations that contributed to the verdict.
    pub violations: Vec<String>,
    /// Names/ids of the policies consulted during evaluation.
    pub policies_evaluated: Vec<String>,
    /// Advanced sub-result booleans.
    pub advanced: AdvancedChecks,
    /// How long the decision cache should retain this verdict, in seconds.
    /// Evaluator-supplied; falls back to the engine's default (60s) when absent.
    pub ttl_seconds: Option<u64>,
}

impl EvaluatorOutcome {
    /// Shorthand for an unconditional allow with no side data.
    #[must_use]
    pub fn allow() -> Self {
        Self {
            allow: true,
            ..Self::default()
        }
    }

    /// Shorthand for a deny with a reason.
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allow: false,
            reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// Structured decision produced by a full `evaluate()` call: the
/// evaluator's raw outcome plus the engine's own bookkeeping (timing,
/// cache participation).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyDecision {
    allow: bool,
    reason: Option<String>,
    filtered_parameters: Option<Value>,
    evaluation_duration_ms: f64,
    cache_hit: bool,
    violations: Vec<String>,
    policies_evaluated: Vec<String>,
    advanced: AdvancedChecks,
    ttl_seconds: Option<u64>,
}

impl PolicyDecision {
    /// Builds a decision from an evaluator outcome and measured timing.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `allow` is `false` and `reason` is `None` or
    /// empty — every deny must carry a reason per the invariant that a
    /// principal is never refused without an explanation.
    #[must_use]
    pub fn from_outcome(outcome: EvaluatorOutcome, evaluation_duration_ms: f64, cache_hit: bool) -> Self {
        debug_assert!(
            outcome.allow || outcome.reason.as_deref().is_some_and(|r| !r.trim().is_empty()),
            "deny decisions must carry a non-empty reason"
        );
        Self {
            allow: outcome.allow,
            reason: outcome.reason,
            filtered_parameters: outcome.filtered_parameters,
            evaluation_duration_ms,
            cache_hit,
            violations: outcome.violations,
            policies_evaluated: outcome.policies_evaluated,
            advanced: outcome.advanced,
            ttl_seconds: outcome.ttl_seconds,
        }
    }

    /// The canonical fail-closed decision returned when the evaluator itself
    /// errors out: never `allow=true`, always this exact reason.
    #[must_use]
    pub fn engine_error(evaluation_duration_ms: f64) -> Self {
        Self {
            allow: false,
            reason: Some("policy engine error".to_owned()),
            filtered_parameters: None,
            evaluation_duration_ms,
            cache_hit: false,
            violations: Vec::new(),
            policies_evaluated: Vec::new(),
            advanced: AdvancedChecks::default(),
            ttl_seconds: None,
        }
    }

    /// Whether the action is permitted.
    #[must_use]
    pub const fn allow(&self) -> bool {
        self.allow
    }

    /// Reason attached to the decision, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Parameters the invocation must use in place of the caller's originals.
    #[must_use]
    pub fn filtered_parameters(&self) -> Option<&Value> {
        self.filtered_parameters.as_ref()
    }

    /// How long the evaluation took, in milliseconds.
    #[must_use]
    pub const fn evaluation_duration_ms(&self) -> f64 {
        self.evaluation_duration_ms
    }

    /// Whether this decision was served from the decision cache.
    #[must_use]
    pub const fn cache_hit(&self) -> bool {
        self.cache_hit
    }

    /// Marks the decision as served from cache (used by the caching wrapper,
    /// which otherwise reuses the originally-measured duration verbatim).
    #[must_use]
    pub fn with_cache_hit(mut self, cache_hit: bool) -> Self {
        self.cache_hit = cache_hit;
        self
    }

    /// Violations that contributed to the verdict.
    #[must_use]
    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    /// Policies consulted while producing this verdict.
    #[must_use]
    pub fn policies_evaluated(&self) -> &[String] {
        &self.policies_evaluated
    }

    /// Advanced sub-result booleans (time-based, IP filtering, MFA required).
    #[must_use]
    pub const fn advanced(&self) -> AdvancedChecks {
        self.advanced
    }

    /// How long the decision cache should retain this verdict, in seconds,
    /// as supplied by the evaluator. `None` defers to the cache's own default.
    #[must_use]
    pub const fn ttl_seconds(&self) -> Option<u64> {
        self.ttl_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_outcome_builds_allow_decision() {
        let decision = PolicyDecision::from_outcome(EvaluatorOutcome::allow(), 1.5, false);
        assert!(decision.allow());
        assert!(decision.reason().is_none());
        assert!(!decision.cache_hit());
    }

    #[test]
    fn deny_outcome_carries_reason() {
        let decision = PolicyDecision::from_outcome(EvaluatorOutcome::deny("tool disabled"), 2.0, false);
        assert!(!decision.allow());
        assert_eq!(decision.reason(), Some("tool disabled"));
    }

    #[test]
    fn ttl_seconds_is_carried_from_the_outcome() {
        let outcome = EvaluatorOutcome {
            ttl_seconds: Some(300),
            ..EvaluatorOutcome::allow()
        };
        let decision = PolicyDecision::from_outcome(outcome, 1.0, false);
        assert_eq!(decision.ttl_seconds(), Some(300));
    }

    #[test]
    fn engine_error_decision_is_fail_closed() {
        let decision = PolicyDecision::engine_error(0.1);
        assert!(!decision.allow());
        assert_eq!(decision.reason(), Some("policy engine error"));
    }

    #[test]
    fn cache_hit_flag_is_settable_independently() {
        let decision = PolicyDecision::from_outcome(EvaluatorOutcome::allow(), 0.0, false).with_cache_hit(true);
        assert!(decision.cache_hit());
    }
}
