//! Health reporting utilities.

use serde::Serialize;

/// Overall health of a single component or the gateway as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Fully operational.
    Healthy,
    /// Operational with reduced capability (e.g. a circuit breaker open).
    Degraded,
    /// Not operational.
    Unhealthy,
}

/// Health of a single named component, as surfaced by the gateway's
/// `health` accessor (§4.9).
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    /// Component name (e.g. `"policy_engine"`, `"stdio:my-server"`).
    pub name: String,
    /// Current status.
    pub status: HealthStatus,
    /// Free-form detail, e.g. a circuit breaker's open-since timestamp.
    pub detail: Option<String>,
}

impl ComponentHealth {
    /// Construct a healthy component report.
    #[must_use]
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            detail: None,
        }
    }

    /// Construct a degraded component report with an explanatory detail.
    #[must_use]
    pub fn degraded(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Degraded,
            detail: Some(detail.into()),
        }
    }

    /// Construct an unhealthy component report with an explanatory detail.
    #[must_use]
    pub fn unhealthy(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            detail: Some(detail.into()),
        }
    }
}

/// Roll up a set of component reports into a single overall status: the
/// worst status present wins (`Unhealthy` > `Degraded` > `Healthy`).
#[must_use]
pub fn aggregate(components: &[ComponentHealth]) -> HealthStatus {
    if components.iter().any(|c| c.status == HealthStatus::Unhealthy) {
        HealthStatus::Unhealthy
    } else if components.iter().any(|c| c.status == HealthStatus::Degraded) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_status_wins() {
        let components = vec![
            ComponentHealth::healthy("policy_engine"),
            ComponentHealth::degraded("stdio:foo", "restart count 2"),
        ];
        assert_eq!(aggregate(&components), HealthStatus::Degraded);
    }

    #[test]
    fn all_healthy_is_healthy() {
        let components = vec![ComponentHealth::healthy("a"), ComponentHealth::healthy("b")];
        assert_eq!(aggregate(&components), HealthStatus::Healthy);
    }
}
