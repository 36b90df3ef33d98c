//! Replay and deterministic debugging utilities.
//!
//! A bounded, in-memory recording of recent governance events (policy
//! decisions, anomaly detections, MFA transitions) that a debugging
//! session or test harness can dump and step through without re-running
//! the request that produced them. This is deliberately not the audit
//! log (`sark-audit`): the recorder keeps only the most recent entries
//! and is never persisted.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;

/// Bounded ring buffer of serialized governance events, newest last.
#[derive(Debug)]
pub struct ReplayRecorder {
    capacity: usize,
    entries: Mutex<VecDeque<Value>>,
}

impl ReplayRecorder {
    /// Construct a recorder holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Record one event, evicting the oldest entry if at capacity.
    ///
    /// Serialization failures are logged and dropped rather than
    /// propagated: recording must never affect the request path.
    pub fn record<T: Serialize>(&self, event: &T) {
        let value = match serde_json::to_value(event) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize replay event");
                return;
            }
        };
        let mut entries = self.entries.lock().expect("replay recorder mutex poisoned");
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(value);
    }

    /// Snapshot all currently recorded entries, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Value> {
        self.entries
            .lock()
            .expect("replay recorder mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("replay recorder mutex poisoned").len()
    }

    /// True if no entries are currently held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Dummy {
        n: u32,
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let recorder = ReplayRecorder::new(2);
        recorder.record(&Dummy { n: 1 });
        recorder.record(&Dummy { n: 2 });
        recorder.record(&Dummy { n: 3 });
        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0]["n"], 2);
        assert_eq!(snapshot[1]["n"], 3);
    }

    #[test]
    fn empty_recorder_reports_empty() {
        let recorder = ReplayRecorder::new(4);
        assert!(recorder.is_empty());
    }
}
