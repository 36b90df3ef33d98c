//! Authorization input assembly, policy evaluation, decision caching, and
//! policy change tracking for SARK.

#![warn(missing_docs, clippy::pedantic)]

mod cache;
mod change;
mod contracts;
mod decision;
mod engine;
mod integrations;

pub use cache::{CachingPolicyEngine, DEFAULT_TTL};
pub use change::{ChangeKind, PolicyChangeEntry, PolicyChangeLog};
pub use contracts::{Action, AuthorizationInput, RequestContext, UserContext};
pub use decision::{AdvancedChecks, EvaluatorOutcome, PolicyDecision};
pub use engine::{GovernanceClient, PolicyEngine, PolicyError, PolicyResult, PolicyRule, RuleBasedEngine, RuleMatcher};
pub use integrations::{RemotePolicyEngine, DEFAULT_POLICY_PATH};
