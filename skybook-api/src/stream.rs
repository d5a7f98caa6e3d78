use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::Stream;
use skybook_core::EventPublisher;
use skybook_shared::DomainEvent;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Forwards every event to `inner` and fans it out to SSE subscribers
pub struct BroadcastEventPublisher {
    inner: Arc<dyn EventPublisher>,
    tx: broadcast::Sender<DomainEvent>,
}

impl BroadcastEventPublisher {
    pub fn new(inner: Arc<dyn EventPublisher>, tx: broadcast::Sender<DomainEvent>) -> Self {
        Self { inner, tx }
    }
}

#[async_trait]
impl EventPublisher for BroadcastEventPublisher {
    async fn publish(
        &self,
        event: &DomainEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // No subscribers is fine
        let _ = self.tx.send(event.clone());
        self.inner.publish(event).await
    }
}

/// GET /v1/flights/{id}/seats/stream
pub async fn seat_stream(
    State(state): State<AppState>,
    Path(flight_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    // 404 before opening a stream for a flight that does not exist
    state.flights.get_flight(flight_id).await?;

    let stream = BroadcastStream::new(state.seat_events.subscribe()).filter_map(move |result| {
        match result {
            Ok(event) if event.touches_flight(flight_id) => match Event::default()
                .event(event.kind())
                .json_data(&event)
            {
                Ok(sse) => Some(Ok(sse)),
                Err(e) => {
                    warn!("Dropping unserializable {} event: {}", event.kind(), e);
                    None
                }
            },
            Ok(_) => None,
            Err(e) => {
                warn!("Seat stream for flight {} lagged: {}", flight_id, e);
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
