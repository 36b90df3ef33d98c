//! Environment variable loading.

use std::env;
use std::str::FromStr;

use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::schema::{AnomalyConfig, AppMode, InjectionThresholds, MfaConfig, SarkConfig, StdioLimits};

const APP_MODE: &str = "SARK_APP_MODE";
const SECRET_KEY: &str = "SARK_SECRET_KEY";
const POLICY_ENDPOINT: &str = "SARK_POLICY_ENDPOINT";
const SIEM_SPLUNK_HEC_URL: &str = "SARK_SIEM_SPLUNK_HEC_URL";
const SIEM_DATADOG_URL: &str = "SARK_SIEM_DATADOG_URL";
const IDENTITY_ENDPOINT: &str = "SARK_IDENTITY_ENDPOINT";
const AUDIT_DB_PATH: &str = "SARK_AUDIT_DB_PATH";
const STDIO_MAX_MEMORY_MB: &str = "SARK_STDIO_MAX_MEMORY_MB";
const STDIO_MAX_FDS: &str = "SARK_STDIO_MAX_FDS";
const STDIO_MAX_CPU_PERCENT: &str = "SARK_STDIO_MAX_CPU_PERCENT";
const INJECTION_BLOCK_THRESHOLD: &str = "SARK_INJECTION_BLOCK_THRESHOLD";
const INJECTION_ALERT_THRESHOLD: &str = "SARK_INJECTION_ALERT_THRESHOLD";
const ANOMALY_LOOKBACK_DAYS: &str = "SARK_ANOMALY_LOOKBACK_DAYS";
const MFA_TOTP_WINDOW: &str = "SARK_MFA_TOTP_WINDOW";
const MFA_TIMEOUT_SECONDS: &str = "SARK_MFA_TIMEOUT_SECONDS";
const MFA_MAX_ATTEMPTS: &str = "SARK_MFA_MAX_ATTEMPTS";

fn parse_env<T: FromStr>(name: &'static str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            name,
            reason: format!("could not parse {raw:?}"),
        }),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::Invalid {
            name,
            reason: "value is not valid unicode".to_string(),
        }),
    }
}

/// Load and validate [`SarkConfig`] from the process environment.
///
/// Defaults mirror §4's stated defaults. Production-mode constraints
/// (§6, §8) are enforced by [`SarkConfig::validate`] before this function
/// returns.
pub fn load() -> Result<SarkConfig> {
    let app_mode = match env::var(APP_MODE) {
        Ok(raw) => raw.parse()?,
        Err(_) => AppMode::Development,
    };

    let secret_key = env::var(SECRET_KEY).unwrap_or_default();

    let stdio_limits = StdioLimits {
        max_memory_mb: parse_env(STDIO_MAX_MEMORY_MB, StdioLimits::default().max_memory_mb)?,
        max_file_descriptors: parse_env(
            STDIO_MAX_FDS,
            StdioLimits::default().max_file_descriptors,
        )?,
        max_cpu_percent: parse_env(
            STDIO_MAX_CPU_PERCENT,
            StdioLimits::default().max_cpu_percent,
        )?,
    };

    let injection_thresholds = InjectionThresholds {
        block: parse_env(INJECTION_BLOCK_THRESHOLD, InjectionThresholds::default().block)?,
        alert: parse_env(INJECTION_ALERT_THRESHOLD, InjectionThresholds::default().alert)?,
    };

    let anomaly = AnomalyConfig {
        lookback_days: parse_env(ANOMALY_LOOKBACK_DAYS, AnomalyConfig::default().lookback_days)?,
    };

    let mfa = MfaConfig {
        totp_window: parse_env(MFA_TOTP_WINDOW, MfaConfig::default().totp_window)?,
        timeout_seconds: parse_env(MFA_TIMEOUT_SECONDS, MfaConfig::default().timeout_seconds)?,
        max_attempts: parse_env(MFA_MAX_ATTEMPTS, MfaConfig::default().max_attempts)?,
    };

    let config = SarkConfig {
        app_mode,
        secret_key,
        policy_endpoint: env::var(POLICY_ENDPOINT).ok(),
        siem_splunk_hec_url: env::var(SIEM_SPLUNK_HEC_URL).ok(),
        siem_datadog_url: env::var(SIEM_DATADOG_URL).ok(),
        identity_endpoint: env::var(IDENTITY_ENDPOINT).ok(),
        audit_db_path: env::var(AUDIT_DB_PATH).ok(),
        stdio_limits,
        injection_thresholds,
        anomaly,
        mfa,
    };

    debug!(app_mode = %config.app_mode, "loaded SARK configuration");
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variable tests must not run concurrently with each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all() {
        for name in [
            APP_MODE,
            SECRET_KEY,
            POLICY_ENDPOINT,
            SIEM_SPLUNK_HEC_URL,
            SIEM_DATADOG_URL,
            IDENTITY_ENDPOINT,
            AUDIT_DB_PATH,
            STDIO_MAX_MEMORY_MB,
            STDIO_MAX_FDS,
            STDIO_MAX_CPU_PERCENT,
            INJECTION_BLOCK_THRESHOLD,
            INJECTION_ALERT_THRESHOLD,
            ANOMALY_LOOKBACK_DAYS,
            MFA_TOTP_WINDOW,
            MFA_TIMEOUT_SECONDS,
            MFA_MAX_ATTEMPTS,
        ] {
            unsafe { env::remove_var(name) };
        }
    }

    #[test]
    fn development_defaults_without_secret_key() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        let config = load().expect("development mode tolerates an empty secret key");
        assert_eq!(config.app_mode, AppMode::Development);
        assert_eq!(config.injection_thresholds.block, 70);
        assert_eq!(config.mfa.max_attempts, 3);
    }

    #[test]
    fn production_rejects_weak_secret() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        unsafe {
            env::set_var(APP_MODE, "production");
            env::set_var(SECRET_KEY, "changeme");
        }
        let err = load().unwrap_err();
        assert!(matches!(err, ConfigError::ProductionConstraint(_)));
        clear_all();
    }

    #[test]
    fn production_rejects_short_secret() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        unsafe {
            env::set_var(APP_MODE, "production");
            env::set_var(SECRET_KEY, "short");
        }
        let err = load().unwrap_err();
        assert!(matches!(err, ConfigError::ProductionConstraint(_)));
        clear_all();
    }

    #[test]
    fn production_accepts_strong_secret() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        unsafe {
            env::set_var(APP_MODE, "production");
            env::set_var(SECRET_KEY, "a-sufficiently-long-random-secret-key-value");
        }
        let config = load().expect("strong secret key should be accepted");
        assert_eq!(config.app_mode, AppMode::Production);
        clear_all();
    }
}
