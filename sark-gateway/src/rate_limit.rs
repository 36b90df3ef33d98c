//! Per-principal request-rate and call-budget gate.
//!
//! Sits in the pipeline between the injection detector and authorization
//! (see the request-flow diagram in the governance surface): a sliding
//! window of recent call timestamps per principal, the same counting shape
//! `sark_security::anomaly`'s `rapid_requests` rule uses for its own
//! after-the-fact detection, but applied here as a hard gate before the
//! adapter is ever reached.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use sark_core::PrincipalId;

/// Configuration for the rate/budget gate.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    /// Maximum calls a single principal may make within `window`.
    pub max_calls: u32,
    /// Sliding window over which `max_calls` is enforced.
    pub window: Duration,
    /// Longer-horizon call budget per principal (e.g. a daily cap); `None` disables it.
    pub budget: Option<u32>,
    /// Window over which `budget` is enforced.
    pub budget_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: 60,
            window: Duration::from_secs(60),
            budget: None,
            budget_window: Duration::from_secs(86_400),
        }
    }
}

/// The gate's verdict for a single call attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RateLimitVerdict {
    /// The call may proceed.
    Allowed,
    /// The short window's call cap was exceeded.
    RateLimited,
    /// The longer-horizon budget was exhausted.
    BudgetExceeded,
}

struct PrincipalWindow {
    window_calls: VecDeque<Instant>,
    budget_calls: VecDeque<Instant>,
}

impl PrincipalWindow {
    fn new() -> Self {
        Self {
            window_calls: VecDeque::new(),
            budget_calls: VecDeque::new(),
        }
    }
}

/// Sliding-window rate limiter and call-budget tracker, keyed by principal.
///
/// A process-wide singleton the gateway checks before authorization. State
/// is held only in memory; it resets on restart, matching the throwaway
/// nature of a short rate window.
#[derive(Default)]
pub struct RateLimiter {
    config: RateLimitConfig,
    principals: DashMap<PrincipalId, PrincipalWindow>,
}

impl RateLimiter {
    /// Builds a limiter with the supplied configuration.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            principals: DashMap::new(),
        }
    }

    /// Records a call attempt for `principal_id` and returns the gate's verdict.
    ///
    /// Denied attempts are not recorded against the window so a principal
    /// already at the cap does not get stuck there forever once the window
    /// rolls forward.
    pub fn check(&self, principal_id: PrincipalId) -> RateLimitVerdict {
        let now = Instant::now();
        let mut entry = self
            .principals
            .entry(principal_id)
            .or_insert_with(PrincipalWindow::new);

        while let Some(&front) = entry.window_calls.front() {
            if now.duration_since(front) > self.config.window {
                entry.window_calls.pop_front();
            } else {
                break;
            }
        }
        if entry.window_calls.len() as u32 >= self.config.max_calls {
            return RateLimitVerdict::RateLimited;
        }

        if let Some(budget) = self.config.budget {
            while let Some(&front) = entry.budget_calls.front() {
                if now.duration_since(front) > self.config.budget_window {
                    entry.budget_calls.pop_front();
                } else {
                    break;
                }
            }
            if entry.budget_calls.len() as u32 >= budget {
                return RateLimitVerdict::BudgetExceeded;
            }
            entry.budget_calls.push_back(now);
        }

        entry.window_calls.push_back(now);
        RateLimitVerdict::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_calls_under_the_cap() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_calls: 3,
            window: Duration::from_secs(60),
            budget: None,
            budget_window: Duration::from_secs(86_400),
        });
        let principal = PrincipalId::random();
        for _ in 0..3 {
            assert_eq!(limiter.check(principal), RateLimitVerdict::Allowed);
        }
        assert_eq!(limiter.check(principal), RateLimitVerdict::RateLimited);
    }

    #[test]
    fn distinct_principals_have_independent_windows() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_calls: 1,
            window: Duration::from_secs(60),
            budget: None,
            budget_window: Duration::from_secs(86_400),
        });
        let a = PrincipalId::random();
        let b = PrincipalId::random();
        assert_eq!(limiter.check(a), RateLimitVerdict::Allowed);
        assert_eq!(limiter.check(b), RateLimitVerdict::Allowed);
        assert_eq!(limiter.check(a), RateLimitVerdict::RateLimited);
    }

    #[test]
    fn budget_caps_independently_of_the_short_window() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_calls: 100,
            window: Duration::from_secs(60),
            budget: Some(2),
            budget_window: Duration::from_secs(86_400),
        });
        let principal = PrincipalId::random();
        assert_eq!(limiter.check(principal), RateLimitVerdict::Allowed);
        assert_eq!(limiter.check(principal), RateLimitVerdict::Allowed);
        assert_eq!(limiter.check(principal), RateLimitVerdict::BudgetExceeded);
    }
}
