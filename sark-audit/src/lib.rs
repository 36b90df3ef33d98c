//! Temporal audit log, SIEM forwarding, and export/analytics for SARK.
//!
//! The audit log is append-only and partitioned by day on `timestamp`
//! (§4.8). Every `policy_decision` and `tool_invoked` event is inserted
//! here immediately; events at `high`/`critical` severity are queued for
//! asynchronous SIEM forwarding, which never blocks or rolls back the
//! original insert on failure.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod event;
mod export;
mod policy_log;
mod siem;
mod store;

pub use error::{AuditError, AuditResult};
pub use event::{AuditEvent, AuditSeverity};
pub use export::{ExportRange, export_events_json, export_policy_decisions_csv};
pub use policy_log::PolicyDecisionLog;
pub use siem::{DatadogForwarder, SiemForwarder, SiemQueue, SiemQueueConfig, SplunkHecForwarder};
pub use store::{AuditQuery, AuditStore, FileAuditStore};
