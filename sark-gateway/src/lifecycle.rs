//! Lifecycle state machine for the gateway process itself.
//!
//! The decision cache, circuit breakers, and stdio process table are
//! process-wide singletons with explicit `init`/`shutdown` hooks driven by
//! this lifecycle rather than hidden module-load-time state.

use thiserror::Error;
use tracing::debug;

/// Discrete states the gateway process occupies during its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    /// Constructed but not yet initialized.
    Stopped,
    /// Singletons (decision cache, circuit breakers, SIEM queue) are being brought up.
    Starting,
    /// Serving invocations.
    Running,
    /// Draining in-flight invocations prior to shutdown.
    Stopping,
}

impl GatewayState {
    /// Returns `true` when the gateway may accept new invocations.
    #[must_use]
    pub const fn accepts_calls(self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Events that trigger lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Begin bringing up process-wide singletons.
    Start,
    /// Singletons are ready; begin serving invocations.
    Activate,
    /// Begin a graceful shutdown (stop accepting new invocations).
    Drain,
    /// Singletons have been torn down.
    Stop,
}

/// Lifecycle state manager for the gateway process.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lifecycle {
    state: GatewayStateOrInit,
}

/// Wrapper so `Lifecycle::default()` starts `Stopped` without requiring
/// `GatewayState` itself to implement `Default` (it has no natural zero state).
#[derive(Debug, Clone, Copy)]
struct GatewayStateOrInit(GatewayState);

impl Default for GatewayStateOrInit {
    fn default() -> Self {
        Self(GatewayState::Stopped)
    }
}

impl Lifecycle {
    /// Constructs a lifecycle controller starting in [`GatewayState::Stopped`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> GatewayState {
        self.state.0
    }

    /// Applies a lifecycle event, returning the resulting state.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] when the supplied event is not
    /// allowed from the current state.
    pub fn transition(&mut self, event: LifecycleEvent) -> LifecycleResult<GatewayState> {
        let current = self.state.0;
        let next = match (current, event) {
            (GatewayState::Stopped, LifecycleEvent::Start) => Some(GatewayState::Starting),
            (GatewayState::Starting, LifecycleEvent::Activate) => Some(GatewayState::Running),
            (GatewayState::Running, LifecycleEvent::Drain) => Some(GatewayState::Stopping),
            (GatewayState::Stopping, LifecycleEvent::Stop) => Some(GatewayState::Stopped),
            _ => None,
        };

        let Some(next_state) = next else {
            return Err(LifecycleError::InvalidTransition { from: current, event });
        };

        debug!(?current, ?next_state, ?event, "gateway lifecycle transition");
        self.state.0 = next_state;
        Ok(next_state)
    }
}

/// Errors emitted by the lifecycle controller.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Transition was not permitted from the current state.
    #[error("invalid gateway lifecycle transition from {from:?} via {event:?}")]
    InvalidTransition {
        /// State prior to the attempted transition.
        from: GatewayState,
        /// Event that triggered the failure.
        event: LifecycleEvent,
    },
}

/// Result alias used for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_to_running_flow() {
        let mut lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), GatewayState::Stopped);
        lifecycle.transition(LifecycleEvent::Start).unwrap();
        assert_eq!(lifecycle.state(), GatewayState::Starting);
        lifecycle.transition(LifecycleEvent::Activate).unwrap();
        assert!(lifecycle.state().accepts_calls());
    }

    #[test]
    fn drain_then_stop() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.transition(LifecycleEvent::Start).unwrap();
        lifecycle.transition(LifecycleEvent::Activate).unwrap();
        lifecycle.transition(LifecycleEvent::Drain).unwrap();
        assert_eq!(lifecycle.state(), GatewayState::Stopping);
        lifecycle.transition(LifecycleEvent::Stop).unwrap();
        assert_eq!(lifecycle.state(), GatewayState::Stopped);
    }

    #[test]
    fn invalid_transition_errors() {
        let mut lifecycle = Lifecycle::new();
        let err = lifecycle
            .transition(LifecycleEvent::Activate)
            .expect_err("activate should fail from stopped");
        matches!(err, LifecycleError::InvalidTransition { .. });
    }

    #[test]
    fn cannot_skip_draining() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.transition(LifecycleEvent::Start).unwrap();
        lifecycle.transition(LifecycleEvent::Activate).unwrap();
        let err = lifecycle.transition(LifecycleEvent::Stop).expect_err("must drain first");
        matches!(err, LifecycleError::InvalidTransition { .. });
    }
}
