//! The gateway client: the resource registry, rate/budget gate, lifecycle
//! state machine, and the governed invocation pipeline that ties the
//! policy, security, and audit crates into a single `invoke` call (§2).

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod lifecycle;
mod pipeline;
mod rate_limit;
mod registry;
mod scheduler;

use std::sync::Arc;

use sark_audit::AuditStore;
use sark_core::{InvocationRequest, InvocationResult, Principal, PrincipalId};
use sark_policy::PolicyEngine;
use sark_security::{AnomalyAlertDispatcher, MfaChallengeSystem};

pub use error::{GatewayError, GatewayResult};
pub use lifecycle::{GatewayState, Lifecycle, LifecycleError, LifecycleEvent, LifecycleResult};
pub use pipeline::{GatewayPipeline, PipelineConfig};
pub use rate_limit::{RateLimitConfig, RateLimitVerdict, RateLimiter};
pub use registry::{RegisteredResource, RegistryError, RegistryResult, ResolvedCapability, ResourceRegistry};
pub use scheduler::{SchedulerConfig, SchedulerError, SchedulerResult, TaskScheduler};

/// The assembled gateway client: every process-wide singleton plus the
/// lifecycle that gates whether it accepts calls.
///
/// Construct once at startup with [`Gateway::new`], drive `lifecycle`
/// through `Start`/`Activate` before calling [`Gateway::invoke`], and
/// through `Drain`/`Stop` to shut down cleanly.
pub struct Gateway {
    lifecycle: Lifecycle,
    pipeline: GatewayPipeline,
    registry: Arc<ResourceRegistry>,
}

impl Gateway {
    /// Assembles a gateway from its constituent singletons.
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        registry: Arc<ResourceRegistry>,
        policy_engine: Arc<dyn PolicyEngine>,
        audit_store: Arc<dyn AuditStore>,
        rate_limiter: Arc<RateLimiter>,
        mfa: Arc<MfaChallengeSystem>,
        scheduler: Arc<TaskScheduler>,
        alert_dispatcher: Arc<AnomalyAlertDispatcher>,
    ) -> Self {
        let pipeline = GatewayPipeline::new(
            config,
            Arc::clone(&registry),
            policy_engine,
            audit_store,
            rate_limiter,
            mfa,
            scheduler,
            alert_dispatcher,
        );
        Self {
            lifecycle: Lifecycle::new(),
            pipeline,
            registry,
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> GatewayState {
        self.lifecycle.state()
    }

    /// Applies a lifecycle event, returning the new state on success.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] when the transition is not permitted from
    /// the current state.
    pub fn transition(&mut self, event: LifecycleEvent) -> LifecycleResult<GatewayState> {
        self.lifecycle.transition(event)
    }

    /// Returns the resource registry backing this gateway.
    #[must_use]
    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    /// Runs a single invocation through the governed pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::TransportStopped`] if the gateway is not in
    /// [`GatewayState::Running`]; otherwise propagates whichever pipeline
    /// stage denied, rate-limited, blocked, or failed the request.
    pub async fn invoke(&self, request: InvocationRequest, principal: &Principal) -> GatewayResult<InvocationResult> {
        if !self.lifecycle.state().accepts_calls() {
            return Err(GatewayError::TransportStopped {
                reason: "gateway is not accepting calls in its current lifecycle state".into(),
            });
        }
        self.pipeline.invoke(request, principal).await
    }

    /// Verifies a response to an outstanding MFA challenge.
    ///
    /// # Errors
    ///
    /// Propagates [`GatewayError::MfaFailed`] or a security subsystem error.
    pub fn verify_mfa(
        &self,
        challenge_id: &str,
        principal_id: PrincipalId,
        code: &str,
        totp_secret: Option<&str>,
    ) -> GatewayResult<()> {
        self.pipeline.verify_mfa(challenge_id, principal_id, code, totp_secret)
    }
}
