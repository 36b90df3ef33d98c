//! Keyword-tier auto-classification of capability sensitivity.
//!
//! Mirrors the MCP tool discovery heuristic: adapters see a name and an
//! optional description and must assign a sensitivity tier before a human
//! ever reviews the capability. Tiers are checked critical-first so a tool
//! named `"delete_secret"` lands as critical, not high.

use crate::sensitivity::SensitivityLevel;

const CRITICAL_KEYWORDS: &[&str] = &[
    "payment",
    "transaction",
    "credit_card",
    "password",
    "secret",
    "key",
    "token",
    "credential",
    "encrypt",
    "decrypt",
];

const HIGH_KEYWORDS: &[&str] = &[
    "delete", "drop", "exec", "execute", "admin", "root", "sudo", "kill", "destroy", "remove",
];

const MEDIUM_KEYWORDS: &[&str] = &[
    "write", "update", "modify", "change", "edit", "create", "insert", "save",
];

const LOW_KEYWORDS: &[&str] = &["read", "get", "list", "fetch", "view", "show", "query"];

/// Classifies a capability's sensitivity from its name and optional description.
///
/// Falls back to [`SensitivityLevel::Medium`] when no keyword matches, matching
/// the conservative default used by MCP tool discovery.
#[must_use]
pub fn classify(name: &str, description: Option<&str>) -> SensitivityLevel {
    let haystack = match description {
        Some(description) => format!("{name} {description}").to_lowercase(),
        None => name.to_lowercase(),
    };

    if CRITICAL_KEYWORDS.iter().any(|kw| haystack.contains(kw)) {
        return SensitivityLevel::Critical;
    }
    if HIGH_KEYWORDS.iter().any(|kw| haystack.contains(kw)) {
        return SensitivityLevel::High;
    }
    if MEDIUM_KEYWORDS.iter().any(|kw| haystack.contains(kw)) {
        return SensitivityLevel::Medium;
    }
    if LOW_KEYWORDS.iter().any(|kw| haystack.contains(kw)) {
        return SensitivityLevel::Low;
    }

    SensitivityLevel::Medium
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_keyword_wins_over_high() {
        assert_eq!(classify("delete_api_key", None), SensitivityLevel::Critical);
    }

    #[test]
    fn read_only_tool_is_low() {
        assert_eq!(classify("list_files", None), SensitivityLevel::Low);
    }

    #[test]
    fn unknown_tool_defaults_to_medium() {
        assert_eq!(classify("ping", None), SensitivityLevel::Medium);
    }

    #[test]
    fn description_contributes_signal() {
        assert_eq!(
            classify("noop", Some("permanently destroy the target")),
            SensitivityLevel::High
        );
    }
}
