//! Job-lifecycle event vocabulary for the Scanorama notification layer.
//!
//! This crate is the seam between the job-execution subsystem (scan and
//! discovery workers) and anything that wants to react to their progress,
//! most importantly the WebSocket hub in the `ws` crate.
//!
//! # Architecture
//!
//! - **ScanUpdate / DiscoveryUpdate**: Progress payloads, serialized as-is into
//!   the `data` field of the wire envelope.
//! - **JobEvent**: Enum of everything a producer can announce.
//! - **EventHandler**: Trait for implementing event consumers.
//! - **EventPublisher**: Fans a `JobEvent` out to registered handlers.
//!
//! This crate has no dependencies on internal crates so that producers never
//! need to link against the transport layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Progress report for a single scan job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanUpdate {
    pub scan_id: i64,
    pub status: String,
    /// Percent complete, 0 to 100.
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_count: Option<u64>,
}

impl ScanUpdate {
    pub fn new(scan_id: i64, status: impl Into<String>, progress: f64) -> Self {
        Self {
            scan_id,
            status: status.into(),
            progress,
            message: None,
            error: None,
            start_time: None,
            end_time: None,
            results_count: None,
        }
    }
}

/// Progress report for a single network discovery job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryUpdate {
    pub job_id: i64,
    pub status: String,
    /// Percent complete, 0 to 100.
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosts_found: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_hosts: Option<u64>,
}

impl DiscoveryUpdate {
    pub fn new(job_id: i64, status: impl Into<String>, progress: f64) -> Self {
        Self {
            job_id,
            status: status.into(),
            progress,
            message: None,
            error: None,
            hosts_found: None,
            new_hosts: None,
        }
    }
}

/// Everything a job producer can announce.
///
/// `request_id` correlates the event with the API request that started the
/// job (or triggered the notice) and is echoed to clients when present.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// A scan job changed state or made progress.
    ScanProgress {
        update: ScanUpdate,
        request_id: Option<String>,
    },
    /// A discovery job changed state or made progress.
    DiscoveryProgress {
        update: DiscoveryUpdate,
        request_id: Option<String>,
    },
    /// Operator or maintenance broadcast delivered to every subscriber.
    SystemNotice {
        kind: String,
        message: String,
        request_id: Option<String>,
    },
}

impl JobEvent {
    pub fn request_id(&self) -> Option<&str> {
        match self {
            JobEvent::ScanProgress { request_id, .. }
            | JobEvent::DiscoveryProgress { request_id, .. }
            | JobEvent::SystemNotice { request_id, .. } => request_id.as_deref(),
        }
    }
}

/// Error returned by an `EventHandler` that could not accept an event.
///
/// Handlers never block producers, so the only failure is a rejection; the
/// producing job carries on regardless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Rejected { reason: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Rejected { reason } => write!(f, "Event rejected: {reason}"),
        }
    }
}

impl std::error::Error for Error {}

/// Trait for handling job events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &JobEvent) -> Result<(), Error>;
}

/// Publishes job events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Returns a publisher with `handler` appended to the handler list.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// Publish an event to every registered handler.
    ///
    /// A failing handler does not stop the remaining ones from running; the
    /// last failure seen is returned to the producer.
    pub async fn publish(&self, event: JobEvent) -> Result<(), Error> {
        let mut outcome = Ok(());
        for handler in self.handlers.iter() {
            if let Err(e) = handler.handle(&event).await {
                outcome = Err(e);
            }
        }
        outcome
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        seen: AtomicUsize,
        reject: bool,
    }

    #[async_trait]
    impl EventHandler for Counting {
        async fn handle(&self, _event: &JobEvent) -> Result<(), Error> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                Err(Error::Rejected {
                    reason: "full".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn notice() -> JobEvent {
        JobEvent::SystemNotice {
            kind: "maintenance".to_string(),
            message: "restarting".to_string(),
            request_id: Some("req-1".to_string()),
        }
    }

    #[test]
    fn scan_update_omits_absent_optional_fields() {
        let update = ScanUpdate::new(123, "running", 50.0);
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(
            value,
            json!({"scan_id": 123, "status": "running", "progress": 50.0})
        );
    }

    #[test]
    fn discovery_update_includes_host_counts_when_set() {
        let mut update = DiscoveryUpdate::new(7, "completed", 100.0);
        update.hosts_found = Some(12);
        update.new_hosts = Some(3);
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["hosts_found"], 12);
        assert_eq!(value["new_hosts"], 3);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn request_id_is_exposed_for_every_variant() {
        assert_eq!(notice().request_id(), Some("req-1"));
        let scan = JobEvent::ScanProgress {
            update: ScanUpdate::new(1, "queued", 0.0),
            request_id: None,
        };
        assert_eq!(scan.request_id(), None);
    }

    #[tokio::test]
    async fn publish_with_no_handlers_succeeds() {
        assert!(EventPublisher::new().publish(notice()).await.is_ok());
    }

    #[tokio::test]
    async fn publish_runs_every_handler_and_reports_failure() {
        let rejecting = Arc::new(Counting {
            seen: AtomicUsize::new(0),
            reject: true,
        });
        let accepting = Arc::new(Counting {
            seen: AtomicUsize::new(0),
            reject: false,
        });
        let publisher = EventPublisher::new()
            .with_handler(rejecting.clone())
            .with_handler(accepting.clone());

        let result = publisher.publish(notice()).await;

        assert!(matches!(result, Err(Error::Rejected { .. })));
        assert_eq!(rejecting.seen.load(Ordering::SeqCst), 1);
        assert_eq!(accepting.seen.load(Ordering::SeqCst), 1);
    }
}
