//! Sensitivity classification shared by resources, capabilities, and audit records.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Sensitivity tier assigned to a resource or capability.
///
/// Ordering follows severity: `Low < Medium < High < Critical`. Several
/// detectors (behavioral baselines, anomaly escalation) compare levels
/// directly via `Ord`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensitivityLevel {
    /// Read-only, non-sensitive operations.
    Low,
    /// Write operations affecting non-critical data.
    Medium,
    /// Administrative or destructive operations.
    High,
    /// Operations touching credentials, payments, or encryption.
    Critical,
}

impl SensitivityLevel {
    /// All variants in ascending severity order.
    pub const ALL: [SensitivityLevel; 4] = [
        SensitivityLevel::Low,
        SensitivityLevel::Medium,
        SensitivityLevel::High,
        SensitivityLevel::Critical,
    ];

    /// Numeric rank used for baseline/escalation comparisons (none=0..critical=4).
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            SensitivityLevel::Low => 1,
            SensitivityLevel::Medium => 2,
            SensitivityLevel::High => 3,
            SensitivityLevel::Critical => 4,
        }
    }

    /// Lowercase string form, matching the wire/config representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SensitivityLevel::Low => "low",
            SensitivityLevel::Medium => "medium",
            SensitivityLevel::High => "high",
            SensitivityLevel::Critical => "critical",
        }
    }
}

impl Display for SensitivityLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensitivityLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(SensitivityLevel::Low),
            "medium" => Ok(SensitivityLevel::Medium),
            "high" => Ok(SensitivityLevel::High),
            "critical" => Ok(SensitivityLevel::Critical),
            other => Err(Error::UnknownSensitivityLevel(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_severity() {
        assert!(SensitivityLevel::Low < SensitivityLevel::Medium);
        assert!(SensitivityLevel::Medium < SensitivityLevel::High);
        assert!(SensitivityLevel::High < SensitivityLevel::Critical);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("HIGH".parse::<SensitivityLevel>().unwrap(), SensitivityLevel::High);
    }

    #[test]
    fn rejects_unknown_level() {
        assert!("extreme".parse::<SensitivityLevel>().is_err());
    }
}
