//! Policy engine traits and the in-process rule-based reference implementation.

use std::sync::RwLock;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::contracts::{Action, AuthorizationInput};
use crate::decision::{EvaluatorOutcome, PolicyDecision};

/// Errors surfaced while assembling or validating a policy evaluation.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Request failed validation before evaluation.
    #[error("invalid policy request: {0}")]
    InvalidRequest(&'static str),
    /// Rule configuration error.
    #[error("invalid policy rule: {0}")]
    InvalidRule(&'static str),
    /// The external evaluator could not be reached or returned malformed data.
    #[error("policy backend failure: {reason}")]
    Backend {
        /// Human-readable explanation for logging and operators.
        reason: String,
    },
}

/// Result alias for fallible evaluator operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// The narrow interface to an external policy evaluator (Rego/OPA, a remote
/// governance service, or — in this crate — an in-process rule set). The
/// engine is indifferent to the policy language behind this trait.
#[async_trait]
pub trait GovernanceClient: Send + Sync {
    /// Evaluates `input` against the policy identified by `path` and returns
    /// the evaluator's raw verdict. `path` lets one client multiplex several
    /// named policies (e.g. `"sark/tool_invocation"`).
    async fn evaluate(&self, path: &str, input: &AuthorizationInput) -> PolicyResult<EvaluatorOutcome>;
}

/// The top-level policy evaluation contract used by the gateway.
///
/// Unlike [`GovernanceClient`], this never fails: any error from the
/// underlying evaluator is absorbed into a fail-closed [`PolicyDecision`]
/// with reason `"policy engine error"`, per the engine's "does not fail
/// open" guarantee.
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    /// Evaluates the supplied authorization input.
    async fn evaluate(&self, input: &AuthorizationInput) -> PolicyDecision;
}

/// Matches an authorization input on its action and, optionally, the
/// targeted capability.
#[derive(Debug, Clone)]
pub struct RuleMatcher {
    action: Option<Action>,
    tool_suffix: Option<String>,
}

impl RuleMatcher {
    /// Matches every action.
    #[must_use]
    pub fn any() -> Self {
        Self {
            action: None,
            tool_suffix: None,
        }
    }

    /// Matches only the supplied action.
    #[must_use]
    pub fn for_action(action: Action) -> Self {
        Self {
            action: Some(action),
            tool_suffix: None,
        }
    }

    /// Narrows the matcher to capabilities whose name (the part of the
    /// capability id after the last `#`) equals `name`.
    #[must_use]
    pub fn with_tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_suffix = Some(name.into());
        self
    }

    fn matches(&self, input: &AuthorizationInput) -> bool {
        if let Some(action) = &self.action {
            if action != &input.action {
                return false;
            }
        }
        if let Some(name) = &self.tool_suffix {
            let tool_name = input.tool.as_ref().and_then(|t| t.split()).map(|(_, n)| n);
            if tool_name != Some(name.as_str()) {
                return false;
            }
        }
        true
    }
}

/// A single named rule consisting of a matcher and the outcome it produces.
#[derive(Debug, Clone)]
pub struct PolicyRule {
    name: String,
    matcher: RuleMatcher,
    outcome: EvaluatorOutcome,
}

impl PolicyRule {
    /// Creates a new rule.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidRule`] when the rule name is empty.
    pub fn new(name: impl Into<String>, matcher: RuleMatcher, outcome: EvaluatorOutcome) -> PolicyResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PolicyError::InvalidRule("rule name cannot be empty"));
        }
        Ok(Self { name, matcher, outcome })
    }

    /// The rule's name, surfaced in `policies_evaluated`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// In-process, rule-based policy engine.
///
/// Stands in for a configured Rego/OPA backend in tests and local
/// deployments: rules are checked in insertion order and the first match
/// wins, falling back to a configured default when nothing matches.
#[derive(Debug)]
pub struct RuleBasedEngine {
    rules: RwLock<Vec<PolicyRule>>,
    default_outcome: EvaluatorOutcome,
}

impl RuleBasedEngine {
    /// Constructs an engine that falls back to `default_outcome` when no
    /// rule matches.
    #[must_use]
    pub fn new(default_outcome: EvaluatorOutcome) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            default_outcome,
        }
    }

    /// Appends a rule, evaluated after all previously added rules.
    ///
    /// # Panics
    ///
    /// Panics if the internal rule store lock has been poisoned.
    pub fn add_rule(&self, rule: PolicyRule) {
        self.rules.write().expect("policy rules poisoned").push(rule);
    }
}

#[async_trait]
impl PolicyEngine for RuleBasedEngine {
    async fn evaluate(&self, input: &AuthorizationInput) -> PolicyDecision {
        let started = Instant::now();
        let guard = self.rules.read().expect("policy rules poisoned");

        let mut outcome = self.default_outcome.clone();
        for rule in guard.iter() {
            if rule.matcher.matches(input) {
                debug!(rule = rule.name(), action = input.action.label(), "policy rule matched");
                outcome = rule.outcome.clone();
                if outcome.policies_evaluated.is_empty() {
                    outcome.policies_evaluated = vec![rule.name.clone()];
                }
                break;
            }
        }
        drop(guard);

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        PolicyDecision::from_outcome(outcome, elapsed_ms, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sark_core::{PrincipalId, RequestId};

    use crate::contracts::UserContext;

    fn input_for(action: Action) -> AuthorizationInput {
        AuthorizationInput::new(
            UserContext {
                id: PrincipalId::default(),
                role: "analyst".into(),
                teams: vec![],
                mfa_verified: false,
                mfa_methods: vec![],
            },
            action,
            RequestId::default(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn rule_matching_prefers_first_match() {
        let engine = RuleBasedEngine::new(EvaluatorOutcome::allow());
        engine.add_rule(
            PolicyRule::new(
                "deny-discovery",
                RuleMatcher::for_action(Action::DiscoverResources),
                EvaluatorOutcome::deny("discovery disabled"),
            )
            .unwrap(),
        );

        let decision = engine.evaluate(&input_for(Action::DiscoverResources)).await;
        assert!(!decision.allow());
        assert_eq!(decision.reason(), Some("discovery disabled"));
        assert_eq!(decision.policies_evaluated(), ["deny-discovery"]);

        let decision = engine.evaluate(&input_for(Action::InvokeCapability)).await;
        assert!(decision.allow());
    }

    #[tokio::test]
    async fn default_outcome_applies_when_no_rules_match() {
        let engine = RuleBasedEngine::new(EvaluatorOutcome::deny("no rules configured"));
        let decision = engine.evaluate(&input_for(Action::InvokeCapability)).await;
        assert!(!decision.allow());
        assert_eq!(decision.reason(), Some("no rules configured"));
    }

    #[tokio::test]
    async fn tool_name_narrows_the_match() {
        let engine = RuleBasedEngine::new(EvaluatorOutcome::allow());
        engine.add_rule(
            PolicyRule::new(
                "deny-delete",
                RuleMatcher::for_action(Action::InvokeCapability).with_tool_name("delete_record"),
                EvaluatorOutcome::deny("destructive tool blocked"),
            )
            .unwrap(),
        );

        let mut blocked = input_for(Action::InvokeCapability);
        blocked.tool = Some(sark_core::CapabilityId::new("stdio://db", "delete_record"));
        let decision = engine.evaluate(&blocked).await;
        assert!(!decision.allow());

        let mut allowed = input_for(Action::InvokeCapability);
        allowed.tool = Some(sark_core::CapabilityId::new("stdio://db", "list_records"));
        let decision = engine.evaluate(&allowed).await;
        assert!(decision.allow());
    }
}
