//! Decision cache with LRU eviction and in-flight evaluation coalescing.
//!
//! Generalizes the bounded ring-buffer-under-lock pattern used for the
//! volatile memory store into a keyed cache, and borrows the
//! `tokio::sync`-based coordination used throughout the gateway crate to
//! coalesce concurrent evaluations of the same authorization input.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::{Mutex, Notify};

use crate::contracts::AuthorizationInput;
use crate::decision::PolicyDecision;
use crate::engine::PolicyEngine;

/// Default TTL applied when the evaluator did not supply one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

struct CacheEntry {
    decision: PolicyDecision,
    expires_at: Instant,
}

/// A policy engine decorator adding a bounded, TTL'd decision cache with
/// in-flight coalescing in front of any [`PolicyEngine`].
///
/// Cache hits skip the inner engine entirely but are still surfaced with
/// `cache_hit=true` so the audit trail can tell the two apart.
pub struct CachingPolicyEngine<E> {
    inner: Arc<E>,
    cache: Mutex<LruCache<u64, CacheEntry>>,
    in_flight: Mutex<HashMap<u64, Arc<Notify>>>,
}

impl<E> CachingPolicyEngine<E>
where
    E: PolicyEngine,
{
    /// Wraps `inner`, bounding the cache to `capacity` entries.
    #[must_use]
    pub fn new(inner: Arc<E>, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    async fn cached(&self, key: u64) -> Option<PolicyDecision> {
        let mut cache = self.cache.lock().await;
        match cache.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.decision.clone()),
            Some(_) => {
                cache.pop(&key);
                None
            }
            None => None,
        }
    }

    async fn store(&self, key: u64, decision: PolicyDecision, ttl: Duration) {
        let mut cache = self.cache.lock().await;
        cache.put(
            key,
            CacheEntry {
                decision,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

#[async_trait]
impl<E> PolicyEngine for CachingPolicyEngine<E>
where
    E: PolicyEngine,
{
    async fn evaluate(&self, input: &AuthorizationInput) -> PolicyDecision {
        let key = input.cache_key();

        if let Some(decision) = self.cached(key).await {
            return decision.with_cache_hit(true);
        }

        // Coalesce concurrent evaluations of the same key: the first caller
        // claims the slot and evaluates; later callers wait on its Notify and
        // then re-check the cache instead of re-running the evaluator.
        let notify = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(existing) = in_flight.get(&key) {
                Some(Arc::clone(existing))
            } else {
                in_flight.insert(key, Arc::new(Notify::new()));
                None
            }
        };

        if let Some(notify) = notify {
            notify.notified().await;
            if let Some(decision) = self.cached(key).await {
                return decision.with_cache_hit(true);
            }
            // The leader's evaluation failed to populate the cache (TTL of
            // zero, or it evaluated and expired before we woke up); fall
            // through and evaluate ourselves rather than deadlock.
        }

        let decision = self.inner.evaluate(input).await;
        let ttl = decision.ttl_seconds().map_or(DEFAULT_TTL, Duration::from_secs);
        self.store(key, decision.clone(), ttl).await;

        let notify = self.in_flight.lock().await.remove(&key);
        if let Some(notify) = notify {
            notify.notify_waiters();
        }

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sark_core::{PrincipalId, RequestId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::contracts::{Action, UserContext};
    use crate::decision::EvaluatorOutcome;

    struct CountingEngine {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PolicyEngine for CountingEngine {
        async fn evaluate(&self, _input: &AuthorizationInput) -> PolicyDecision {
            self.calls.fetch_add(1, Ordering::SeqCst);
            PolicyDecision::from_outcome(EvaluatorOutcome::allow(), 1.0, false)
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
    async fn second_call_with_same_key_hits_cache() {
        let inner = Arc::new(CountingEngine { calls: AtomicUsize::new(0) });
        let cache = CachingPolicyEngine::new(Arc::clone(&inner), NonZeroUsize::new(16).unwrap());

        let first = cache.evaluate(&input()).await;
        assert!(!first.cache_hit());
        let second = cache.evaluate(&input()).await;
        assert!(second.cache_hit());

        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_evaluations_of_the_same_key_coalesce() {
        let inner = Arc::new(CountingEngine { calls: AtomicUsize::new(0) });
        let cache = Arc::new(CachingPolicyEngine::new(Arc::clone(&inner), NonZeroUsize::new(16).unwrap()));

        let a = Arc::clone(&cache);
        let b = Arc::clone(&cache);
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { a.evaluate(&input()).await }),
            tokio::spawn(async move { b.evaluate(&input()).await }),
        );
        assert!(r1.unwrap().allow());
        assert!(r2.unwrap().allow());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    struct ZeroTtlEngine {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PolicyEngine for ZeroTtlEngine {
        async fn evaluate(&self, _input: &AuthorizationInput) -> PolicyDecision {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = EvaluatorOutcome {
                ttl_seconds: Some(0),
                ..EvaluatorOutcome::allow()
            };
            PolicyDecision::from_outcome(outcome, 1.0, false)
        }
    }

    #[tokio::test]
    async fn evaluator_supplied_ttl_overrides_the_cache_default() {
        let inner = Arc::new(ZeroTtlEngine { calls: AtomicUsize::new(0) });
        let cache = CachingPolicyEngine::new(Arc::clone(&inner), NonZeroUsize::new(16).unwrap());

        let first = cache.evaluate(&input()).await;
        assert!(!first.cache_hit());
        let second = cache.evaluate(&input()).await;
        assert!(!second.cache_hit(), "a zero-second TTL must not survive to the next call");

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
