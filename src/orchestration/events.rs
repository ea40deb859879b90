//! In-process domain event fan-out.

use crate::domain::DomainEvent;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Broadcast bus for [`DomainEvent`]s. Publish only after the commit that
/// produced the event; delivery is best effort.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: DomainEvent) {
        let name = event.name();
        let request_id = event.service_request_id();
        if self.tx.send(event).is_err() {
            debug!("No subscribers for {} on request {}", name, request_id);
        }
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = DomainEvent>) {
        for event in events {
            self.publish(event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Log every event on the bus until it is dropped.
pub fn spawn_event_logger(bus: &EventBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let payload = serde_json::to_string(&event).unwrap_or_default();
                    info!(
                        "Event {} for request {}: {}",
                        event.name(),
                        event.service_request_id(),
                        payload
                    );
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event logger lagged, {} events dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
