use crate::message::{Envelope, EventType};
use crate::Manager;
use async_trait::async_trait;
use events::{Error as EventError, EventHandler, JobEvent};
use log::*;
use std::sync::Arc;

/// Handles job events by converting them to envelopes and broadcasting them
/// on the matching topic.
///
/// Publishing never waits on subscribers. When the hub cannot take the event
/// (backpressure or shutdown) the event is rejected and the producer decides
/// whether that matters.
pub struct JobEventHandler {
    ws_manager: Arc<Manager>,
}

impl JobEventHandler {
    pub fn new(ws_manager: Arc<Manager>) -> Self {
        Self { ws_manager }
    }
}

#[async_trait]
impl EventHandler for JobEventHandler {
    async fn handle(&self, event: &JobEvent) -> Result<(), EventError> {
        let envelope = Envelope::from(event);
        debug!(
            "Handling {} event for the {} topic",
            envelope.event_type(),
            envelope.topic()
        );

        self.ws_manager
            .publish(&envelope)
            .map_err(|e| EventError::Rejected {
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Interest;
    use crate::testing;
    use crate::HubConfig;
    use events::{EventPublisher, ScanUpdate};

    #[tokio::test]
    async fn published_job_events_reach_subscribers_with_request_id() {
        let manager = Arc::new(Manager::start(HubConfig::default()).unwrap());
        let (sink, source, mut peer) = testing::pair();
        manager.register(Interest::Scan, sink, source).await.unwrap();
        let publisher =
            EventPublisher::new().with_handler(Arc::new(JobEventHandler::new(manager.clone())));

        publisher
            .publish(JobEvent::ScanProgress {
                update: ScanUpdate::new(77, "completed", 100.0),
                request_id: Some("req-7".to_string()),
            })
            .await
            .unwrap();

        let message = peer.next_json().await;
        assert_eq!(message["type"], "scan_update");
        assert_eq!(message["data"]["scan_id"], 77);
        assert_eq!(message["request_id"], "req-7");
    }

    #[tokio::test]
    async fn events_are_rejected_after_shutdown() {
        let manager = Arc::new(Manager::start(HubConfig::default()).unwrap());
        let handler = JobEventHandler::new(manager.clone());
        manager.shutdown().await;

        let result = handler
            .handle(&JobEvent::SystemNotice {
                kind: "maintenance".to_string(),
                message: "too late".to_string(),
                request_id: None,
            })
            .await;

        assert!(matches!(result, Err(EventError::Rejected { .. })));
    }
}
