//! Append-only, day-partitioned audit event storage.
//!
//! Generalizes the newline-delimited-JSON journal pattern used for episodic
//! memory into a day-partitioned store indexed (in practice: filtered) on
//! `timestamp`, `event_kind`, `severity`, `principal_id`, `capability_id`,
//! and `request_id`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::AuditResult;
use crate::event::{AuditEvent, AuditSeverity};

/// Filters applied when querying the audit store. All fields are
/// conjunctive (AND'd together); `None` means "no constraint".
#[derive(Clone, Debug, Default)]
pub struct AuditQuery {
    /// Earliest timestamp to include (inclusive).
    pub since: Option<DateTime<Utc>>,
    /// Latest timestamp to include (inclusive).
    pub until: Option<DateTime<Utc>>,
    /// Restrict to a single event kind.
    pub event_kind: Option<String>,
    /// Restrict to a minimum severity.
    pub min_severity: Option<AuditSeverity>,
    /// Restrict to a single principal.
    pub principal_id: Option<String>,
    /// Restrict to a single capability.
    pub capability_id: Option<String>,
    /// Restrict to a single request.
    pub request_id: Option<String>,
    /// Skip this many matching rows before collecting results.
    pub offset: usize,
    /// Return at most this many rows.
    pub limit: usize,
}

impl AuditQuery {
    fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(since) = self.since {
            if event.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.timestamp > until {
                return false;
            }
        }
        if let Some(kind) = &self.event_kind {
            if &event.event_kind != kind {
                return false;
            }
        }
        if let Some(min_severity) = self.min_severity {
            if event.severity < min_severity {
                return false;
            }
        }
        if let Some(principal_id) = &self.principal_id {
            if event.principal_id.map(|id| id.to_string()).as_deref() != Some(principal_id.as_str()) {
                return false;
            }
        }
        if let Some(capability_id) = &self.capability_id {
            if event.capability_id.as_ref().map(|id| id.as_str()) != Some(capability_id.as_str()) {
                return false;
            }
        }
        if let Some(request_id) = &self.request_id {
            if event.request_id.map(|id| id.to_string()).as_deref() != Some(request_id.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Trait implemented by durable audit stores.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Appends an event to the store.
    async fn append(&self, event: &AuditEvent) -> AuditResult<()>;

    /// Returns events matching `query`, ordered oldest to newest.
    async fn query(&self, query: &AuditQuery) -> AuditResult<Vec<AuditEvent>>;
}

/// File-backed audit store, one newline-delimited-JSON file per UTC day.
pub struct FileAuditStore {
    base_dir: PathBuf,
    current: Mutex<Option<(NaiveDate, tokio::fs::File)>>,
}

impl FileAuditStore {
    /// Opens (creating if needed) a store rooted at `base_dir`.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors encountered while preparing the directory.
    pub async fn open(base_dir: impl Into<PathBuf>) -> AuditResult<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).await?;
        Ok(Self {
            base_dir,
            current: Mutex::new(None),
        })
    }

    fn partition_path(&self, date: NaiveDate) -> PathBuf {
        self.base_dir.join(format!("{date}.ndjson"))
    }

    /// Returns the root directory events are partitioned under.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    async fn files_in_range(&self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> AuditResult<Vec<PathBuf>> {
        let mut entries = fs::read_dir(&self.base_dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(date) = stem.parse::<NaiveDate>() else {
                continue;
            };
            if let Some(since) = since {
                if date < since.date_naive() {
                    continue;
                }
            }
            if let Some(until) = until {
                if date > until.date_naive() {
                    continue;
                }
            }
            files.push(path);
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl AuditStore for FileAuditStore {
    async fn append(&self, event: &AuditEvent) -> AuditResult<()> {
        let date = event.timestamp.date_naive();
        let mut guard = self.current.lock().await;

        let needs_reopen = match guard.as_ref() {
            Some((open_date, _)) => *open_date != date,
            None => true,
        };

        if needs_reopen {
            let path = self.partition_path(date);
            let file = OpenOptions::new().create(true).append(true).open(&path).await?;
            *guard = Some((date, file));
        }

        let (_, file) = guard.as_mut().expect("just opened");
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> AuditResult<Vec<AuditEvent>> {
        let files = self.files_in_range(query.since, query.until).await?;

        let mut matched = Vec::new();
        for path in files {
            let data = fs::read(&path).await?;
            for chunk in data.split(|byte| *byte == b'\n').filter(|chunk| !chunk.is_empty()) {
                let event: AuditEvent = serde_json::from_slice(chunk)?;
                if query.matches(&event) {
                    matched.push(event);
                }
            }
        }
        matched.sort_by_key(|event| event.timestamp);

        let limit = if query.limit == 0 { matched.len() } else { query.limit };
        Ok(matched.into_iter().skip(query.offset).take(limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn temp_dir() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("sark-audit-{}", uuid::Uuid::new_v4()));
        path
    }

    #[tokio::test]
    async fn append_and_query_round_trip() {
        let dir = temp_dir();
        let store = FileAuditStore::open(&dir).await.unwrap();

        let now = Utc::now();
        store
            .append(&AuditEvent::new("injection_block", AuditSeverity::Critical, now))
            .await
            .unwrap();
        store
            .append(&AuditEvent::new("mfa_pending", AuditSeverity::Low, now + Duration::seconds(1)))
            .await
            .unwrap();

        let all = store.query(&AuditQuery::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].event_kind, "injection_block");

        let filtered = store
            .query(&AuditQuery {
                min_severity: Some(AuditSeverity::High),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].event_kind, "injection_block");

        let _ = fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn query_respects_offset_and_limit() {
        let dir = temp_dir();
        let store = FileAuditStore::open(&dir).await.unwrap();
        let base = Utc::now();
        for i in 0..5 {
            store
                .append(&AuditEvent::new("log", AuditSeverity::Low, base + Duration::seconds(i)))
                .await
                .unwrap();
        }

        let page = store
            .query(&AuditQuery {
                offset: 2,
                limit: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 2);

        let _ = fs::remove_dir_all(&dir).await;
    }
}
