use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use skybook_core::events::publish_all;
use skybook_core::seat::SeatStatus;
use skybook_core::{BookingError, BookingResult, ChangeSet, EventPublisher, RequestContext, Store};
use skybook_shared::events::{SeatReleasedEvent, SeatReservedEvent};
use skybook_shared::DomainEvent;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const MIN_LOCK_MINUTES: i64 = 5;
pub const MAX_LOCK_MINUTES: i64 = 60;

/// A seat held for a user until `lock_expires_at`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeatHold {
    pub flight_seat_id: Uuid,
    pub flight_id: Uuid,
    pub seat_number: String,
    pub lock_owner: String,
    pub lock_expires_at: DateTime<Utc>,
}

/// Temporary seat locks ahead of checkout
pub struct SeatService {
    store: Arc<dyn Store>,
    events: Arc<dyn EventPublisher>,
}

impl SeatService {
    pub fn new(store: Arc<dyn Store>, events: Arc<dyn EventPublisher>) -> Self {
        Self { store, events }
    }

    pub async fn reserve_seat(
        &self,
        ctx: &RequestContext,
        flight_id: Uuid,
        seat_id: Uuid,
        lock_minutes: i64,
    ) -> BookingResult<SeatHold> {
        if !(MIN_LOCK_MINUTES..=MAX_LOCK_MINUTES).contains(&lock_minutes) {
            return Err(BookingError::Validation(format!(
                "Lock duration must be between {} and {} minutes",
                MIN_LOCK_MINUTES, MAX_LOCK_MINUTES
            )));
        }

        let mut seat = self
            .store
            .find_flight_seat(flight_id, seat_id)
            .await?
            .ok_or_else(|| {
                BookingError::NotFound(format!("Seat {} not found on flight {}", seat_id, flight_id))
            })?;

        if !seat.can_be_reserved() {
            warn!("Seat {} on flight {} is {}, reserve refused", seat.seat_number, flight_id, seat.status);
            return Err(BookingError::Conflict(format!(
                "Seat {} is not available",
                seat.seat_number
            )));
        }

        let lock_expires_at = ctx.now + Duration::minutes(lock_minutes);
        seat.lock(&ctx.user_id, lock_expires_at);

        let mut changes = ChangeSet::new(ctx);
        changes.update_flight_seat(&mut seat);
        self.store.commit(changes).await?;

        info!(
            "Seat {} on flight {} locked by {} until {}",
            seat.seat_number, flight_id, ctx.user_id, lock_expires_at
        );

        let event = DomainEvent::SeatReserved(SeatReservedEvent {
            flight_id,
            flight_seat_id: seat.id,
            seat_number: seat.seat_number.clone(),
            lock_owner: ctx.user_id.clone(),
            lock_expires_at: lock_expires_at.timestamp(),
            timestamp: ctx.now.timestamp(),
        });
        publish_all(self.events.as_ref(), &[event]).await;

        Ok(SeatHold {
            flight_seat_id: seat.id,
            flight_id,
            seat_number: seat.seat_number,
            lock_owner: ctx.user_id.clone(),
            lock_expires_at,
        })
    }

    /// Give up a lock the caller holds. Seats bound to a booking are released
    /// through the booking instead.
    pub async fn release_seat(&self, ctx: &RequestContext, flight_seat_id: Uuid) -> BookingResult<()> {
        let mut seat = self
            .store
            .get_flight_seat(flight_seat_id)
            .await?
            .ok_or_else(|| BookingError::not_found("Flight seat", flight_seat_id))?;

        if seat.status != SeatStatus::Reserved {
            return Err(BookingError::Conflict(format!(
                "Seat {} is not reserved",
                seat.seat_number
            )));
        }
        if seat.booking_id.is_some() {
            return Err(BookingError::Conflict(format!(
                "Seat {} is assigned to a booking",
                seat.seat_number
            )));
        }
        if seat.lock_owner.as_deref() != Some(ctx.user_id.as_str()) {
            warn!("{} tried to release seat {} held by someone else", ctx.user_id, seat.id);
            return Err(BookingError::Conflict(format!(
                "Seat {} is held by another user",
                seat.seat_number
            )));
        }

        seat.release();
        let mut changes = ChangeSet::new(ctx);
        changes.update_flight_seat(&mut seat);
        self.store.commit(changes).await?;

        info!("Seat {} on flight {} released by {}", seat.seat_number, seat.flight_id, ctx.user_id);

        let event = DomainEvent::SeatReleased(SeatReleasedEvent {
            flight_id: seat.flight_id,
            flight_seat_id: seat.id,
            seat_number: seat.seat_number,
            timestamp: ctx.now.timestamp(),
        });
        publish_all(self.events.as_ref(), &[event]).await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{customer, harness};
    use skybook_core::repository::SeatRepository;

    #[tokio::test]
    async fn test_reserve_locks_seat_for_caller() {
        let h = harness();
        let ctx = customer("user-a");
        let seat = h.aircraft_seat("12A");

        let hold = h.seats.reserve_seat(&ctx, h.flight_id(), seat, 15).await.unwrap();
        assert_eq!(hold.seat_number, "12A");
        assert_eq!(hold.lock_expires_at, ctx.now + Duration::minutes(15));

        let stored = h.store.get_flight_seat(hold.flight_seat_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SeatStatus::Reserved);
        assert_eq!(stored.lock_owner.as_deref(), Some("user-a"));
        assert_eq!(stored.version, 1);
        assert_eq!(stored.updated_by.as_deref(), Some("user-a"));

        let events = h.events.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], DomainEvent::SeatReserved(_)));
    }

    #[tokio::test]
    async fn test_second_reserve_conflicts() {
        let h = harness();
        let seat = h.aircraft_seat("12A");

        h.seats.reserve_seat(&customer("user-a"), h.flight_id(), seat, 10).await.unwrap();
        let err = h
            .seats
            .reserve_seat(&customer("user-b"), h.flight_id(), seat, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_concurrent_reserves_have_one_winner() {
        let h = harness();
        let seat = h.aircraft_seat("14C");
        let (a, b) = (customer("user-a"), customer("user-b"));

        let (first, second) = tokio::join!(
            h.seats.reserve_seat(&a, h.flight_id(), seat, 10),
            h.seats.reserve_seat(&b, h.flight_id(), seat, 10),
        );
        assert_eq!([first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert!(h.store.orphaned_reservations().is_empty());
    }

    #[tokio::test]
    async fn test_lock_duration_bounds() {
        let h = harness();
        let seat = h.aircraft_seat("12A");
        let ctx = customer("user-a");

        for minutes in [0, 4, 61] {
            let err = h.seats.reserve_seat(&ctx, h.flight_id(), seat, minutes).await.unwrap_err();
            assert!(matches!(err, BookingError::Validation(_)));
        }
        assert!(h.seats.reserve_seat(&ctx, h.flight_id(), seat, 60).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_seat_is_not_found() {
        let h = harness();
        let err = h
            .seats
            .reserve_seat(&customer("user-a"), h.flight_id(), Uuid::new_v4(), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_release_rules() {
        let h = harness();
        let seat = h.aircraft_seat("12A");
        let hold = h.seats.reserve_seat(&customer("user-a"), h.flight_id(), seat, 10).await.unwrap();

        let err = h.seats.release_seat(&customer("user-b"), hold.flight_seat_id).await.unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));

        h.seats.release_seat(&customer("user-a"), hold.flight_seat_id).await.unwrap();
        let stored = h.store.get_flight_seat(hold.flight_seat_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SeatStatus::Available);
        assert!(stored.lock_owner.is_none());
        assert!(stored.lock_expires_at.is_none());

        // Already available
        let err = h.seats.release_seat(&customer("user-a"), hold.flight_seat_id).await.unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));

        let err = h.seats.release_seat(&customer("user-a"), Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_release_refuses_seat_bound_to_booking() {
        let h = harness();
        let ctx = customer("user-a");
        let booking = h.pending_booking(&ctx).await;
        let seat = h.flight_seat("12A");
        h.bookings
            .select_seat(&ctx, booking.id, booking.passengers[0].id, booking.segments[0].id, seat)
            .await
            .unwrap();

        let err = h.seats.release_seat(&ctx, seat).await.unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));

        let stored = h.store.get_flight_seat(seat).await.unwrap().unwrap();
        assert_eq!(stored.status, SeatStatus::Reserved);
        assert_eq!(stored.booking_id, Some(booking.id));
    }
}
