//! Policy change tracking: versioned, diffed, content-hashed edit history.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use similar::{ChangeTag, TextDiff};

/// The kind of edit a [`PolicyChangeEntry`] records.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// The policy did not exist before this entry.
    Created,
    /// The policy's content was edited.
    Updated,
    /// The policy was removed.
    Deleted,
    /// The policy was switched on.
    Activated,
    /// The policy was switched off.
    Deactivated,
}

/// A single append-only entry in a policy's edit history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyChangeEntry {
    /// Name of the policy this entry belongs to.
    pub policy_name: String,
    /// Monotonically increasing version, scoped to `policy_name`.
    pub version: u64,
    /// The kind of change this entry represents.
    pub change_kind: ChangeKind,
    /// Identifier of the principal who made the change.
    pub author_id: String,
    /// Full policy content after the change (empty for `Deleted`).
    pub content: String,
    /// Unified diff of `content` against the previous version.
    pub diff: String,
    /// SHA-256 hex digest of `content`.
    pub content_hash: String,
    /// Identifier of the principal who approved the change, if required.
    pub approver_id: Option<String>,
    /// Free-form tags attached to this entry.
    pub tags: Vec<String>,
    /// When this entry was recorded.
    pub recorded_at: DateTime<Utc>,
}

fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn unified_diff(previous: &str, next: &str) -> String {
    TextDiff::from_lines(previous, next)
        .unified_diff()
        .header("previous", "next")
        .to_string()
}

/// In-memory ledger of policy changes, enforcing the strictly-increasing
/// per-policy-name version invariant.
#[derive(Default)]
pub struct PolicyChangeLog {
    // Keyed by policy name; each Vec is append-only and kept sorted by version.
    entries: RwLock<HashMap<String, Vec<PolicyChangeEntry>>>,
}

impl PolicyChangeLog {
    /// Creates an empty change log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a change to `policy_name`, computing version, diff, and
    /// content hash from the existing history.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned.
    pub fn record(
        &self,
        policy_name: impl Into<String>,
        change_kind: ChangeKind,
        author_id: impl Into<String>,
        content: impl Into<String>,
        approver_id: Option<String>,
        tags: Vec<String>,
        recorded_at: DateTime<Utc>,
    ) -> PolicyChangeEntry {
        let policy_name = policy_name.into();
        let content = content.into();
        let mut history = self.entries.write().expect("policy change log poisoned");
        let versions = history.entry(policy_name.clone()).or_default();

        let previous_content = versions.last().map(|entry| entry.content.as_str()).unwrap_or("");
        let version = versions.last().map_or(1, |entry| entry.version + 1);

        let entry = PolicyChangeEntry {
            policy_name,
            version,
            change_kind,
            author_id: author_id.into(),
            diff: unified_diff(previous_content, &content),
            content_hash: content_hash(&content),
            content,
            approver_id,
            tags,
            recorded_at,
        };

        versions.push(entry.clone());
        entry
    }

    /// Returns the full change history for a policy, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock has been poisoned.
    #[must_use]
    pub fn history(&self, policy_name: &str) -> Vec<PolicyChangeEntry> {
        self.entries
            .read()
            .expect("policy change log poisoned")
            .get(policy_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the number of lines added/removed between two policy
    /// versions, mostly useful for summarizing an entry without
    /// re-parsing its unified diff text.
    #[must_use]
    pub fn diff_stats(previous: &str, next: &str) -> (usize, usize) {
        let mut added = 0;
        let mut removed = 0;
        for change in TextDiff::from_lines(previous, next).iter_all_changes() {
            match change.tag() {
                ChangeTag::Insert => added += 1,
                ChangeTag::Delete => removed += 1,
                ChangeTag::Equal => {}
            }
        }
        (added, removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_increase_monotonically_per_policy_name() {
        let log = PolicyChangeLog::new();
        let now = Utc::now();
        let first = log.record("no-deletes", ChangeKind::Created, "alice", "allow: []", None, vec![], now);
        let second = log.record(
            "no-deletes",
            ChangeKind::Updated,
            "alice",
            "allow: [read]",
            None,
            vec![],
            now,
        );
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);

        let other = log.record("other-policy", ChangeKind::Created, "bob", "allow: []", None, vec![], now);
        assert_eq!(other.version, 1);
    }

    #[test]
    fn content_hash_is_deterministic() {
        let log = PolicyChangeLog::new();
        let now = Utc::now();
        let entry = log.record("p", ChangeKind::Created, "alice", "same content", None, vec![], now);
        assert_eq!(entry.content_hash, content_hash("same content"));
    }

    #[test]
    fn diff_reflects_added_lines() {
        let log = PolicyChangeLog::new();
        let now = Utc::now();
        log.record("p", ChangeKind::Created, "alice", "line one\n", None, vec![], now);
        let second = log.record("p", ChangeKind::Updated, "alice", "line one\nline two\n", None, vec![], now);
        assert!(second.diff.contains("+line two"));
    }

    #[test]
    fn history_is_returned_oldest_first() {
        let log = PolicyChangeLog::new();
        let now = Utc::now();
        log.record("p", ChangeKind::Created, "alice", "a", None, vec![], now);
        log.record("p", ChangeKind::Updated, "alice", "b", None, vec![], now);
        let history = log.history("p");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].version, 1);
        assert_eq!(history[1].version, 2);
    }
}
