use chrono::{DateTime, Utc};
use serde::Serialize;
use skybook_core::events::publish_all;
use skybook_core::{BookingError, BookingResult, ChangeSet, EventPublisher, RequestContext, Store};
use skybook_shared::events::SeatReleasedEvent;
use skybook_shared::DomainEvent;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::bookings::BookingService;

pub const HOLD_EXPIRED_REASON: &str = "hold expired";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub cancelled_bookings: usize,
    pub released_seats: usize,
    /// Items that changed underneath the sweep; picked up on the next run
    pub conflicts: usize,
    pub failures: usize,
}

impl SweepReport {
    fn record_failure(&mut self, what: &str, err: &BookingError) {
        match err {
            BookingError::Conflict(_) => {
                warn!("Skipping {}: {}", what, err);
                self.conflicts += 1;
            }
            _ => {
                error!("Failed to expire {}: {}", what, err);
                self.failures += 1;
            }
        }
    }
}

/// Cancels pending bookings whose hold ran out and frees lapsed seat locks
pub struct ExpirySweeper {
    store: Arc<dyn Store>,
    events: Arc<dyn EventPublisher>,
    bookings: Arc<BookingService>,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn Store>, events: Arc<dyn EventPublisher>, bookings: Arc<BookingService>) -> Self {
        Self { store, events, bookings }
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> BookingResult<SweepReport> {
        let ctx = RequestContext::system(now);
        let mut report = SweepReport::default();

        for booking in self.store.list_expired_pending_bookings(now).await? {
            let reference = booking.reference.clone();
            match self.bookings.cancel_loaded(&ctx, booking, HOLD_EXPIRED_REASON).await {
                Ok(outcome) => {
                    report.cancelled_bookings += 1;
                    report.released_seats += outcome.released_seats.len();
                }
                Err(e) => report.record_failure(&format!("booking {}", reference), &e),
            }
        }

        for mut seat in self.store.list_expired_seat_locks(now).await? {
            let label = format!("seat lock {} on flight {}", seat.seat_number, seat.flight_id);
            seat.release();

            let mut changes = ChangeSet::new(&ctx);
            changes.update_flight_seat(&mut seat);
            match self.store.commit(changes).await {
                Ok(()) => {
                    report.released_seats += 1;
                    debug!("Released expired {}", label);
                    let event = DomainEvent::SeatReleased(SeatReleasedEvent {
                        flight_id: seat.flight_id,
                        flight_seat_id: seat.id,
                        seat_number: seat.seat_number.clone(),
                        timestamp: now.timestamp(),
                    });
                    publish_all(self.events.as_ref(), &[event]).await;
                }
                Err(e) => report.record_failure(&label, &BookingError::from(e)),
            }
        }

        if report != SweepReport::default() {
            info!(
                "Expiry sweep: {} bookings cancelled, {} seats released, {} conflicts, {} failures",
                report.cancelled_bookings, report.released_seats, report.conflicts, report.failures
            );
        }
        Ok(report)
    }
}
