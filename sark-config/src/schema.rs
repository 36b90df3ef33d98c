//! Strongly typed configuration schemas.
//!
//! [`SarkConfig`] is the root; it is assembled by [`crate::loader::load`]
//! and handed piecemeal to each component's constructor so that no
//! component crate reads `std::env` on its own.

use std::fmt;

use crate::error::{ConfigError, Result};

/// Deployment mode, gating production-only constraints (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// Local development: relaxed constraints.
    Development,
    /// Pre-production staging.
    Staging,
    /// Production: secret-key strength, no debug flags, no wildcard CORS.
    Production,
}

impl AppMode {
    /// True when this mode is [`AppMode::Production`].
    #[must_use]
    pub fn is_production(self) -> bool {
        matches!(self, AppMode::Production)
    }
}

impl fmt::Display for AppMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppMode::Development => "development",
            AppMode::Staging => "staging",
            AppMode::Production => "production",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for AppMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "development" => Ok(AppMode::Development),
            "staging" => Ok(AppMode::Staging),
            "production" => Ok(AppMode::Production),
            other => Err(ConfigError::Invalid {
                name: "SARK_APP_MODE",
                reason: format!("unknown app mode {other:?}"),
            }),
        }
    }
}

/// Resource-enforcement overrides for stdio transport children (§4.2).
#[derive(Debug, Clone, PartialEq)]
pub struct StdioLimits {
    /// Hard-kill threshold, resident set size in MiB.
    pub max_memory_mb: u64,
    /// Hard-kill threshold, open file descriptor count.
    pub max_file_descriptors: u64,
    /// Warn-only threshold, percent of one core.
    pub max_cpu_percent: f64,
}

impl Default for StdioLimits {
    fn default() -> Self {
        Self {
            max_memory_mb: 1024,
            max_file_descriptors: 1024,
            max_cpu_percent: 80.0,
        }
    }
}

/// Injection-detector response thresholds (§4.4).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InjectionThresholds {
    /// Risk score at/above which the response handler blocks the request.
    pub block: u32,
    /// Risk score at/above which the response handler alerts (but allows).
    pub alert: u32,
}

impl Default for InjectionThresholds {
    fn default() -> Self {
        Self {
            block: 70,
            alert: 40,
        }
    }
}

/// Behavioral anomaly pipeline tunables (§4.5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyConfig {
    /// Lookback window, in days, used to build a principal's baseline.
    pub lookback_days: u32,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self { lookback_days: 30 }
    }
}

/// MFA challenge subsystem tunables (§4.7).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MfaConfig {
    /// Number of 30-second TOTP steps tried on either side of "now".
    pub totp_window: u32,
    /// Challenge time-to-live, in seconds.
    pub timeout_seconds: u64,
    /// Maximum verification attempts before a challenge is denied.
    pub max_attempts: u32,
}

impl Default for MfaConfig {
    fn default() -> Self {
        Self {
            totp_window: 1,
            timeout_seconds: 120,
            max_attempts: 3,
        }
    }
}

/// Root configuration for the SARK governance core, assembled from
/// environment variables by [`crate::loader::load`].
#[derive(Debug, Clone, PartialEq)]
pub struct SarkConfig {
    /// Deployment mode.
    pub app_mode: AppMode,
    /// Shared application secret key (signing, session protection).
    pub secret_key: String,
    /// Base URL of the external policy evaluator.
    pub policy_endpoint: Option<String>,
    /// Splunk HTTP Event Collector URL, if SIEM forwarding to Splunk is enabled.
    pub siem_splunk_hec_url: Option<String>,
    /// Datadog logs API URL, if SIEM forwarding to Datadog is enabled.
    pub siem_datadog_url: Option<String>,
    /// Base URL of the external identity provider.
    pub identity_endpoint: Option<String>,
    /// Filesystem path backing the audit store, if file-backed.
    pub audit_db_path: Option<String>,
    /// Stdio transport resource limits.
    pub stdio_limits: StdioLimits,
    /// Injection detector thresholds.
    pub injection_thresholds: InjectionThresholds,
    /// Anomaly pipeline configuration.
    pub anomaly: AnomalyConfig,
    /// MFA subsystem configuration.
    pub mfa: MfaConfig,
}

/// Secret keys known to be weak placeholders; rejected in production (§6).
pub const WEAK_SECRET_KEYS: &[&str] = &["changeme", "secret", "password", ""];

/// Minimum accepted length, in bytes, for a secret key in production.
pub const MIN_SECRET_KEY_LEN: usize = 32;

impl SarkConfig {
    /// Validate production-mode constraints (§6, §8).
    ///
    /// Non-production modes accept any non-empty secret key; production
    /// additionally rejects short keys and known-weak placeholders.
    pub fn validate(&self) -> Result<()> {
        if self.app_mode.is_production() {
            if self.secret_key.len() < MIN_SECRET_KEY_LEN {
                return Err(ConfigError::ProductionConstraint(format!(
                    "secret key must be at least {MIN_SECRET_KEY_LEN} characters in production"
                )));
            }
            if crate::sops::is_weak_secret(&self.secret_key) {
                return Err(ConfigError::ProductionConstraint(
                    "secret key is a known weak placeholder".to_string(),
                ));
            }
        }
        Ok(())
    }
}
