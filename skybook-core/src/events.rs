use async_trait::async_trait;
use skybook_shared::DomainEvent;
use std::sync::Mutex;
use tracing::{error, info};

/// Outbound seam for events raised after a successful commit
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        event: &DomainEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Publish every event, logging failures. Publishing never fails the
/// operation that produced the events.
pub async fn publish_all(publisher: &dyn EventPublisher, events: &[DomainEvent]) {
    for event in events {
        if let Err(e) = publisher.publish(event).await {
            error!("Failed to publish {} event {}: {}", event.topic(), event.key(), e);
        }
    }
}

/// Writes events to the log only. Used when no broker is configured.
pub struct TracingEventPublisher;

#[async_trait]
impl EventPublisher for TracingEventPublisher {
    async fn publish(
        &self,
        event: &DomainEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(topic = event.topic(), key = %event.key(), "Domain event: {}", event.kind());
        Ok(())
    }
}

/// Keeps published events in memory
#[derive(Default)]
pub struct CollectingEventPublisher {
    events: Mutex<Vec<DomainEvent>>,
}

impl CollectingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventPublisher for CollectingEventPublisher {
    async fn publish(
        &self,
        event: &DomainEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.events
            .lock()
            .map_err(|_| "event buffer poisoned")?
            .push(event.clone());
        Ok(())
    }
}
