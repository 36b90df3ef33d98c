//! Detection and verification components that sit in the governance pipeline:
//! prompt-injection scanning, secret redaction, MFA step-up, and behavioral
//! anomaly detection.

#![warn(missing_docs, clippy::pedantic)]

mod anomaly;
mod behavioral;
mod error;
mod injection;
mod mfa;
mod normalizer;
mod secrets;

pub use anomaly::{
    AlertConfig, AlertLevel, Anomaly, AnomalyAlertDispatcher, AnomalyAlertSink, AnomalyDetector,
    AnomalyKind, AnomalySeverity, TracingAlertSink, determine_alert_level,
};
pub use behavioral::{BehavioralBaseline, BehavioralEvent};
pub use error::{Result, SecurityError};
pub use injection::{InjectionDetector, InjectionDetectorConfig, InjectionFinding, InjectionScanResult, Severity};
pub use mfa::{ChallengeStatus, MfaChallenge, MfaConfig, MfaChallengeSystem, MfaMethod, TotpGenerator};
pub use normalizer::{Normalized, Transform, normalize};
pub use secrets::{SecretFinding, SecretScanner};
