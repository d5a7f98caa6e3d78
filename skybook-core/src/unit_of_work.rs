use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::{Booking, BookingExtra, BookingHistory, PaymentRecord};
use crate::context::RequestContext;
use crate::fare::Promotion;
use crate::flight::Flight;
use crate::seat::{FlightSeat, PassengerSeat};

/// One write of a change set. Updates carry the version the handler read;
/// the store refuses the whole set if any row moved since.
#[derive(Debug, Clone)]
pub enum Change {
    UpdateFlight { flight: Flight, expected_version: i32 },
    InsertFlightSeat(FlightSeat),
    UpdateFlightSeat { seat: FlightSeat, expected_version: i32 },
    InsertPassengerSeat(PassengerSeat),
    DeletePassengerSeat { id: Uuid },
    InsertBooking(Booking),
    UpdateBooking { booking: Booking, expected_version: i32 },
    InsertBookingExtra(BookingExtra),
    InsertPaymentRecord(PaymentRecord),
    AppendHistory(BookingHistory),
    UpdatePromotion { promotion: Promotion, expected_version: i32 },
}

/// Writes collected by one operation, committed with a single
/// `UnitOfWork::commit` call.
///
/// The write methods stamp audit fields (`updated_at`, `updated_by`) and bump
/// versions on the caller's value, then queue a copy of it.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    actor: String,
    now: DateTime<Utc>,
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new(ctx: &RequestContext) -> Self {
        Self {
            actor: ctx.user_id.clone(),
            now: ctx.now,
            changes: Vec::new(),
        }
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn into_changes(self) -> Vec<Change> {
        self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn update_flight(&mut self, flight: &mut Flight) {
        let expected_version = flight.version;
        flight.version += 1;
        flight.updated_at = self.now;
        self.changes.push(Change::UpdateFlight {
            flight: flight.clone(),
            expected_version,
        });
    }

    pub fn insert_flight_seat(&mut self, seat: &mut FlightSeat) {
        seat.updated_at = self.now;
        seat.updated_by = Some(self.actor.clone());
        self.changes.push(Change::InsertFlightSeat(seat.clone()));
    }

    pub fn update_flight_seat(&mut self, seat: &mut FlightSeat) {
        let expected_version = seat.version;
        seat.version += 1;
        seat.updated_at = self.now;
        seat.updated_by = Some(self.actor.clone());
        self.changes.push(Change::UpdateFlightSeat {
            seat: seat.clone(),
            expected_version,
        });
    }

    pub fn insert_passenger_seat(&mut self, seat: PassengerSeat) {
        self.changes.push(Change::InsertPassengerSeat(seat));
    }

    pub fn delete_passenger_seat(&mut self, id: Uuid) {
        self.changes.push(Change::DeletePassengerSeat { id });
    }

    pub fn insert_booking(&mut self, booking: &mut Booking) {
        booking.created_at = self.now;
        booking.updated_at = self.now;
        booking.updated_by = Some(self.actor.clone());
        self.changes.push(Change::InsertBooking(booking.clone()));
    }

    pub fn update_booking(&mut self, booking: &mut Booking) {
        let expected_version = booking.version;
        booking.version += 1;
        booking.updated_at = self.now;
        booking.updated_by = Some(self.actor.clone());
        self.changes.push(Change::UpdateBooking {
            booking: booking.clone(),
            expected_version,
        });
    }

    pub fn insert_extra(&mut self, extra: BookingExtra) {
        self.changes.push(Change::InsertBookingExtra(extra));
    }

    pub fn insert_payment(&mut self, payment: PaymentRecord) {
        self.changes.push(Change::InsertPaymentRecord(payment));
    }

    pub fn update_promotion(&mut self, promotion: &mut Promotion) {
        let expected_version = promotion.version;
        promotion.version += 1;
        self.changes.push(Change::UpdatePromotion {
            promotion: promotion.clone(),
            expected_version,
        });
    }

    /// Append an audit row for `booking_id`
    pub fn record_history(
        &mut self,
        booking_id: Uuid,
        action: &str,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    ) {
        self.changes.push(Change::AppendHistory(BookingHistory {
            id: Uuid::new_v4(),
            booking_id,
            action: action.to_string(),
            old_value,
            new_value,
            actor: self.actor.clone(),
            created_at: self.now,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Role;
    use crate::flight::{AircraftSeat, CabinClass};
    use chrono::Duration;

    #[test]
    fn test_update_stamps_audit_fields_and_bumps_version() {
        let then = Utc::now() - Duration::hours(1);
        let ctx = RequestContext::new("agent-7", Role::Staff, Utc::now());
        let aircraft_seat = AircraftSeat {
            id: Uuid::new_v4(),
            aircraft_id: Uuid::new_v4(),
            seat_number: "1A".to_string(),
            cabin_class: CabinClass::First,
            base_fee_nuc: 0,
        };
        let mut seat = FlightSeat::new(Uuid::new_v4(), &aircraft_seat, then);

        let mut changes = ChangeSet::new(&ctx);
        changes.update_flight_seat(&mut seat);
        assert_eq!(seat.version, 1);

        match &changes.changes()[0] {
            Change::UpdateFlightSeat { seat, expected_version } => {
                assert_eq!(*expected_version, 0);
                assert_eq!(seat.version, 1);
                assert_eq!(seat.updated_at, ctx.now);
                assert_eq!(seat.updated_by.as_deref(), Some("agent-7"));
            }
            other => panic!("unexpected change {:?}", other),
        }
    }

    #[test]
    fn test_history_rows_carry_actor() {
        let ctx = RequestContext::new("user-1", Role::Customer, Utc::now());
        let booking_id = Uuid::new_v4();
        let mut changes = ChangeSet::new(&ctx);
        changes.record_history(booking_id, "EXTRA_ADDED", None, Some(serde_json::json!({"a": 1})));

        assert_eq!(changes.len(), 1);
        match &changes.changes()[0] {
            Change::AppendHistory(row) => {
                assert_eq!(row.booking_id, booking_id);
                assert_eq!(row.actor, "user-1");
                assert_eq!(row.action, "EXTRA_ADDED");
            }
            other => panic!("unexpected change {:?}", other),
        }
    }
}
