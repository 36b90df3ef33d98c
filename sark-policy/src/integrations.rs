//! Adapts an external [`GovernanceClient`] into the top-level [`PolicyEngine`]
//! contract, absorbing backend failures into fail-closed decisions.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::warn;

use crate::contracts::AuthorizationInput;
use crate::decision::PolicyDecision;
use crate::engine::{GovernanceClient, PolicyEngine};

/// Default policy path consulted for tool invocations when the caller does
/// not need to multiplex several named policies.
pub const DEFAULT_POLICY_PATH: &str = "sark/authorize";

/// Policy engine that delegates to a remote governance backend (e.g. an OPA
/// sidecar, a SaaS governance API) reached through a narrow
/// [`GovernanceClient`] trait. Never fails open: a backend error or timeout
/// becomes a deny decision with reason `"policy engine error"`.
#[derive(Clone)]
pub struct RemotePolicyEngine<C>
where
    C: GovernanceClient + 'static,
{
    client: Arc<C>,
    path: String,
}

impl<C> RemotePolicyEngine<C>
where
    C: GovernanceClient + 'static,
{
    /// Creates a new remote policy engine evaluating against
    /// [`DEFAULT_POLICY_PATH`].
    #[must_use]
    pub fn new(client: Arc<C>) -> Self {
        Self::with_path(client, DEFAULT_POLICY_PATH)
    }

    /// Creates a remote policy engine targeting a specific policy path.
    #[must_use]
    pub fn with_path(client: Arc<C>, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }
}

#[async_trait]
impl<C> PolicyEngine for RemotePolicyEngine<C>
where
    C: GovernanceClient + 'static,
{
    async fn evaluate(&self, input: &AuthorizationInput) -> PolicyDecision {
        let started = Instant::now();
        match self.client.evaluate(&self.path, input).await {
            Ok(outcome) => {
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                PolicyDecision::from_outcome(outcome, elapsed_ms, false)
            }
            Err(err) => {
                warn!(error = %err, path = %self.path, "policy evaluator failed, failing closed");
                PolicyDecision::engine_error(started.elapsed().as_secs_f64() * 1000.0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use sark_core::{PrincipalId, RequestId};

    use crate::contracts::{Action, UserContext};
    use crate::decision::EvaluatorOutcome;
    use crate::engine::PolicyResult;

    struct StaticClient {
        outcome: Result<EvaluatorOutcome, &'static str>,
    }

    #[async_trait]
    impl GovernanceClient for StaticClient {
        async fn evaluate(&self, _path: &str, _input: &AuthorizationInput) -> PolicyResult<EvaluatorOutcome> {
            self.outcome
                .clone()
                .map_err(|reason| crate::engine::PolicyError::Backend { reason: reason.into() })
        }
    }

    fn input() -> AuthorizationInput {
        AuthorizationInput::new(
            UserContext {
                id: PrincipalId::default(),
                role: "analyst".into(),
                teams: vec![],
                mfa_verified: false,
                mfa_methods: vec![],
            },
            Action::InvokeCapability,
            RequestId::default(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn remote_engine_passes_through_allow() {
        let engine = RemotePolicyEngine::new(Arc::new(StaticClient {
            outcome: Ok(EvaluatorOutcome::allow()),
        }));
        let decision = engine.evaluate(&input()).await;
        assert!(decision.allow());
    }

    #[tokio::test]
    async fn remote_engine_fails_closed_on_backend_error() {
        let engine = RemotePolicyEngine::new(Arc::new(StaticClient {
            outcome: Err("connection refused"),
        }));
        let decision = engine.evaluate(&input()).await;
        assert!(!decision.allow());
        assert_eq!(decision.reason(), Some("policy engine error"));
    }
}
