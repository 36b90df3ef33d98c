//! The error taxonomy surfaced by the gateway client and governance
//! pipeline (§7), beyond the per-adapter taxonomy in `sark_adapters::error`.

use thiserror::Error;

use sark_adapters::error::AdapterError;
use sark_audit::AuditError;
use sark_policy::PolicyError;
use sark_security::SecurityError;

/// Result alias used throughout the gateway crate.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Every error a principal-facing invocation can terminate in.
///
/// Each variant carries a stable kind string via [`GatewayError::kind`];
/// detailed diagnostics belong in the audit event for the same
/// `request_id`, never in the error returned to the caller.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The external policy evaluator could not be reached at all.
    #[error("policy engine unavailable")]
    PolicyEngineUnavailable,

    /// The policy evaluator ran but returned a malformed or backend-level error.
    #[error("policy evaluation error: {0}")]
    PolicyEvaluationError(#[from] PolicyError),

    /// A policy decision denied the request.
    #[error("authorization denied: {reason}")]
    AuthorizationDenied {
        /// Reason attached to the denying decision.
        reason: String,
    },

    /// The principal exceeded the configured request rate.
    #[error("rate limited: {reason}")]
    RateLimited {
        /// Human-readable explanation (e.g. the window and threshold).
        reason: String,
    },

    /// The principal exceeded a longer-horizon call budget.
    #[error("budget exceeded: {reason}")]
    BudgetExceeded {
        /// Human-readable explanation (e.g. the budget and period).
        reason: String,
    },

    /// The policy decision requires MFA step-up the principal has not completed.
    #[error("mfa required")]
    MfaRequired {
        /// Challenge id the caller should resolve before retrying.
        challenge_id: String,
    },

    /// An MFA verification attempt failed.
    #[error("mfa failed")]
    MfaFailed,

    /// The prompt-injection detector blocked the request.
    #[error("injection blocked: risk score {risk_score}")]
    InjectionBlocked {
        /// Cumulative risk score that crossed the block threshold.
        risk_score: u32,
    },

    /// A stdio transport is no longer usable.
    #[error("transport stopped: {reason}")]
    TransportStopped {
        /// Reason the transport reported for stopping.
        reason: String,
    },

    /// A supervised child process crashed beyond its restart budget.
    #[error("process crashed: {reason}")]
    ProcessCrashed {
        /// Reason recorded for the final crash.
        reason: String,
    },

    /// The circuit breaker guarding a target is open; the call failed fast.
    #[error("circuit open for target `{target}`")]
    CircuitOpen {
        /// The target (resource endpoint, SIEM sink) whose breaker is open.
        target: String,
    },

    /// The call exceeded its deadline.
    #[error("call to `{target}` timed out after {timeout_ms}ms")]
    Timeout {
        /// Target the call was made against.
        target: String,
        /// Configured timeout, in milliseconds.
        timeout_ms: u64,
    },

    /// The request referenced a capability id the registry has no adapter for.
    #[error("no adapter registered for capability `{capability_id}`")]
    UnknownCapability {
        /// The unresolved capability id.
        capability_id: String,
    },

    /// Writing an audit event failed outright (distinct from SIEM forwarding,
    /// which is fail-open and never surfaced here).
    #[error("audit write failed: {0}")]
    AuditWriteFailed(#[from] AuditError),

    /// A security subsystem (secret scanner, MFA, anomaly detector) failed structurally.
    #[error("security subsystem error: {0}")]
    Security(#[from] SecurityError),

    /// The protocol adapter itself failed (transport, validation, or remote-side error).
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),
}

impl GatewayError {
    /// Stable kind string surfaced to the principal; matches §7's taxonomy
    /// verbatim so callers can match on it without parsing `Display` text.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PolicyEngineUnavailable => "policy_engine_unavailable",
            Self::PolicyEvaluationError(_) => "policy_evaluation_error",
            Self::AuthorizationDenied { .. } => "authorization_denied",
            Self::RateLimited { .. } => "rate_limited",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::MfaRequired { .. } => "mfa_required",
            Self::MfaFailed => "mfa_failed",
            Self::InjectionBlocked { .. } => "injection_blocked",
            Self::TransportStopped { .. } => "transport_stopped",
            Self::ProcessCrashed { .. } => "process_crashed",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::Timeout { .. } => "timeout",
            Self::UnknownCapability { .. } => "unknown_capability",
            Self::AuditWriteFailed(_) => "audit_write_failed",
            Self::Security(_) => "security_error",
            Self::Adapter(_) => "adapter_error",
        }
    }

    /// Whether this failure should fail the *request* closed (deny) rather
    /// than merely failing to serve it. Authorization and injection paths
    /// fail closed by construction (§7); everything else is a service error.
    #[must_use]
    pub fn is_fail_closed(&self) -> bool {
        matches!(
            self,
            Self::PolicyEngineUnavailable
                | Self::PolicyEvaluationError(_)
                | Self::AuthorizationDenied { .. }
                | Self::InjectionBlocked { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_denied_is_fail_closed() {
        let err = GatewayError::AuthorizationDenied {
            reason: "Insufficient permissions".into(),
        };
        assert!(err.is_fail_closed());
        assert_eq!(err.kind(), "authorization_denied");
    }

    #[test]
    fn rate_limited_is_not_fail_closed() {
        let err = GatewayError::RateLimited {
            reason: "too many requests".into(),
        };
        assert!(!err.is_fail_closed());
    }
}
