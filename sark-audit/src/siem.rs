//! SIEM batch forwarding for high/critical severity audit events.
//!
//! A bounded producer-many/consumer-one queue drains into a set of
//! vendor-specific forwarders, each guarded by its own circuit breaker with
//! exponential-backoff retry. Grounded in the same supervised-background-
//! worker shape used for scheduled async work elsewhere in the workspace: a
//! `tokio::spawn`'d loop with an explicit shutdown signal, not a bespoke
//! concurrency primitive.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sark_core::{CircuitBreaker, CircuitBreakerConfig};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};

use crate::error::AuditResult;
use crate::event::AuditEvent;

/// Trait implemented by a vendor-specific SIEM forwarder.
#[async_trait]
pub trait SiemForwarder: Send + Sync {
    /// Stable name used in logs and error messages (e.g. `"splunk_hec"`).
    fn name(&self) -> &'static str;

    /// Sends a batch of events to the backend.
    async fn forward_batch(&self, events: &[AuditEvent]) -> AuditResult<()>;

    /// Maximum batch size this forwarder accepts per call.
    fn max_batch_size(&self) -> usize;
}

/// Splunk HTTP Event Collector forwarder.
pub struct SplunkHecForwarder {
    client: reqwest::Client,
    hec_url: String,
    hec_token: String,
    max_batch_size: usize,
}

impl SplunkHecForwarder {
    /// Builds a forwarder targeting `hec_url` with the supplied token.
    ///
    /// `verify_tls=false` must never be used in production; callers are
    /// expected to enforce that at configuration load time (`sark-config`).
    #[must_use]
    pub fn new(hec_url: impl Into<String>, hec_token: impl Into<String>, verify_tls: bool) -> Self {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .unwrap_or_default();
        Self {
            client,
            hec_url: hec_url.into(),
            hec_token: hec_token.into(),
            max_batch_size: 100,
        }
    }
}

#[async_trait]
impl SiemForwarder for SplunkHecForwarder {
    fn name(&self) -> &'static str {
        "splunk_hec"
    }

    async fn forward_batch(&self, events: &[AuditEvent]) -> AuditResult<()> {
        let body: Vec<serde_json::Value> = events
            .iter()
            .map(|event| serde_json::json!({ "event": event, "time": event.timestamp.timestamp() }))
            .collect();

        let response = self
            .client
            .post(&self.hec_url)
            .header("Authorization", format!("Splunk {}", self.hec_token))
            .json(&body)
            .send()
            .await
            .map_err(|err| crate::error::AuditError::SiemForward {
                forwarder: "splunk_hec",
                reason: err.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(crate::error::AuditError::SiemForward {
                forwarder: "splunk_hec",
                reason: format!("HEC returned {}", response.status()),
            });
        }
        Ok(())
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

/// Datadog Logs API forwarder.
pub struct DatadogForwarder {
    client: reqwest::Client,
    logs_url: String,
    api_key: String,
}

impl DatadogForwarder {
    /// Builds a forwarder targeting `logs_url` with the supplied API key.
    #[must_use]
    pub fn new(logs_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            logs_url: logs_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl SiemForwarder for DatadogForwarder {
    fn name(&self) -> &'static str {
        "datadog"
    }

    async fn forward_batch(&self, events: &[AuditEvent]) -> AuditResult<()> {
        let response = self
            .client
            .post(&self.logs_url)
            .header("DD-API-KEY", &self.api_key)
            .json(events)
            .send()
            .await
            .map_err(|err| crate::error::AuditError::SiemForward {
                forwarder: "datadog",
                reason: err.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(crate::error::AuditError::SiemForward {
                forwarder: "datadog",
                reason: format!("logs API returned {}", response.status()),
            });
        }
        Ok(())
    }

    fn max_batch_size(&self) -> usize {
        1000
    }
}

/// Queue configuration.
#[derive(Clone, Copy, Debug)]
pub struct SiemQueueConfig {
    /// Bound on the number of events buffered before forwarding drops new ones.
    pub channel_capacity: usize,
    /// Flush early once the buffer reaches this many events.
    pub batch_size: usize,
    /// Flush on this cadence regardless of buffer size.
    pub flush_interval: Duration,
    /// Maximum retry attempts per batch per forwarder.
    pub max_retries: u32,
}

impl Default for SiemQueueConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 4096,
            batch_size: 100,
            flush_interval: Duration::from_secs(10),
            max_retries: 3,
        }
    }
}

struct ForwarderSlot {
    forwarder: Arc<dyn SiemForwarder>,
    breaker: CircuitBreaker,
}

/// A running SIEM forwarding queue. Dropping the last handle and calling
/// [`SiemQueue::shutdown`] drains and stops the background task.
pub struct SiemQueue {
    sender: mpsc::Sender<AuditEvent>,
}

impl SiemQueue {
    /// Spawns the background flush loop and returns a handle plus its
    /// `JoinHandle` so callers can await clean shutdown.
    #[must_use]
    pub fn spawn(forwarders: Vec<Arc<dyn SiemForwarder>>, config: SiemQueueConfig) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(config.channel_capacity);
        let slots: Vec<ForwarderSlot> = forwarders
            .into_iter()
            .map(|forwarder| ForwarderSlot {
                forwarder,
                breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            })
            .collect();

        let handle = tokio::spawn(run_flush_loop(receiver, slots, config));
        (Self { sender }, handle)
    }

    /// Enqueues an event for forwarding. Non-blocking: if the queue is full
    /// the event is dropped and logged, since a forwarding backlog must
    /// never apply backpressure to the request path.
    pub fn enqueue(&self, event: AuditEvent) {
        if self.sender.try_send(event).is_err() {
            warn!("siem forwarding queue full, dropping event");
        }
    }
}

async fn run_flush_loop(mut receiver: mpsc::Receiver<AuditEvent>, slots: Vec<ForwarderSlot>, config: SiemQueueConfig) {
    let mut buffer = Vec::with_capacity(config.batch_size);
    let mut ticker = interval(config.flush_interval);

    loop {
        tokio::select! {
            maybe_event = receiver.recv() => {
                match maybe_event {
                    Some(event) => {
                        buffer.push(event);
                        if buffer.len() >= config.batch_size {
                            flush(&slots, &mut buffer, config.max_retries).await;
                        }
                    }
                    None => {
                        flush(&slots, &mut buffer, config.max_retries).await;
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                flush(&slots, &mut buffer, config.max_retries).await;
            }
        }
    }
}

async fn flush(slots: &[ForwarderSlot], buffer: &mut Vec<AuditEvent>, max_retries: u32) {
    if buffer.is_empty() {
        return;
    }

    for slot in slots {
        let batch_size = slot.forwarder.max_batch_size().min(buffer.len());
        for chunk in buffer.chunks(batch_size.max(1)) {
            forward_with_retry(slot, chunk, max_retries).await;
        }
    }
    buffer.clear();
}

async fn forward_with_retry(slot: &ForwarderSlot, batch: &[AuditEvent], max_retries: u32) {
    if !slot.breaker.allow_call() {
        warn!(forwarder = slot.forwarder.name(), "circuit open, skipping siem batch");
        return;
    }

    let mut attempt = 0;
    loop {
        match slot.forwarder.forward_batch(batch).await {
            Ok(()) => {
                slot.breaker.record_success();
                debug!(forwarder = slot.forwarder.name(), count = batch.len(), "siem batch forwarded");
                return;
            }
            Err(err) if attempt < max_retries => {
                attempt += 1;
                let backoff = Duration::from_millis(100 * 2u64.pow(attempt));
                warn!(forwarder = slot.forwarder.name(), error = %err, attempt, "siem batch failed, retrying");
                tokio::time::sleep(backoff).await;
            }
            Err(err) => {
                slot.breaker.record_failure();
                warn!(forwarder = slot.forwarder.name(), error = %err, "siem batch forwarding gave up");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AuditSeverity;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    struct CountingForwarder {
        calls: Arc<AtomicUsize>,
        fail_first_n: usize,
    }

    #[async_trait]
    impl SiemForwarder for CountingForwarder {
        fn name(&self) -> &'static str {
            "test"
        }

        async fn forward_batch(&self, _events: &[AuditEvent]) -> AuditResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first_n {
                return Err(crate::error::AuditError::SiemForward {
                    forwarder: "test",
                    reason: "simulated failure".into(),
                });
            }
            Ok(())
        }

        fn max_batch_size(&self) -> usize {
            100
        }
    }

    #[tokio::test]
    async fn flush_on_batch_size_forwards_events() {
        let calls = Arc::new(AtomicUsize::new(0));
        let forwarder = Arc::new(CountingForwarder {
            calls: Arc::clone(&calls),
            fail_first_n: 0,
        });
        let (queue, handle) = SiemQueue::spawn(
            vec![forwarder],
            SiemQueueConfig {
                channel_capacity: 16,
                batch_size: 2,
                flush_interval: Duration::from_secs(3600),
                max_retries: 0,
            },
        );

        queue.enqueue(AuditEvent::new("a", AuditSeverity::Critical, Utc::now()));
        queue.enqueue(AuditEvent::new("b", AuditSeverity::Critical, Utc::now()));

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        handle.abort();
    }

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let calls = Arc::new(AtomicUsize::new(0));
        let forwarder = Arc::new(CountingForwarder {
            calls: Arc::clone(&calls),
            fail_first_n: 2,
        });
        let (queue, handle) = SiemQueue::spawn(
            vec![forwarder],
            SiemQueueConfig {
                channel_capacity: 16,
                batch_size: 1,
                flush_interval: Duration::from_secs(3600),
                max_retries: 3,
            },
        );

        queue.enqueue(AuditEvent::new("a", AuditSeverity::High, Utc::now()));
        tokio::time::sleep(StdDuration::from_millis(800)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        handle.abort();
    }
}
