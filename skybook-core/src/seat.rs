use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::flight::{AircraftSeat, CabinClass};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    Available,
    Reserved,
    Blocked,
}

string_enum!(SeatStatus {
    Available => "AVAILABLE",
    Reserved => "RESERVED",
    Blocked => "BLOCKED",
});

/// Booking status of one physical seat on one flight occurrence.
///
/// Created when the flight is scheduled, changed in place, never deleted.
/// A `Reserved` seat is always either bound to a booking or held by a lock
/// owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightSeat {
    pub id: Uuid,
    pub flight_id: Uuid,
    pub seat_id: Uuid,
    pub seat_number: String,
    pub cabin_class: CabinClass,
    pub status: SeatStatus,
    pub lock_owner: Option<String>,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub booking_id: Option<Uuid>,
    pub base_fee_nuc: i32,
    pub price_override_nuc: Option<i32>,
    pub version: i32,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

impl FlightSeat {
    pub fn new(flight_id: Uuid, seat: &AircraftSeat, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            flight_id,
            seat_id: seat.id,
            seat_number: seat.seat_number.clone(),
            cabin_class: seat.cabin_class,
            status: SeatStatus::Available,
            lock_owner: None,
            lock_expires_at: None,
            booking_id: None,
            base_fee_nuc: seat.base_fee_nuc,
            price_override_nuc: None,
            version: 0,
            updated_at: now,
            updated_by: None,
        }
    }

    /// Fee charged when this seat is selected
    pub fn fee_nuc(&self) -> i32 {
        self.price_override_nuc.unwrap_or(self.base_fee_nuc)
    }

    pub fn can_be_reserved(&self) -> bool {
        self.status == SeatStatus::Available
    }

    /// A TTL lock that nobody turned into a booking and whose time is up
    pub fn is_lock_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == SeatStatus::Reserved
            && self.booking_id.is_none()
            && self.lock_expires_at.is_some_and(|at| at <= now)
    }

    /// Held by `user_id` through a live lock that is not yet bound to a booking
    pub fn is_held_by(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        self.status == SeatStatus::Reserved
            && self.booking_id.is_none()
            && self.lock_owner.as_deref() == Some(user_id)
            && !self.is_lock_expired(now)
    }

    /// Counts towards cabin availability
    pub fn counts_as_available(&self, now: DateTime<Utc>) -> bool {
        self.status == SeatStatus::Available || self.is_lock_expired(now)
    }

    pub fn lock(&mut self, owner: &str, expires_at: DateTime<Utc>) {
        self.status = SeatStatus::Reserved;
        self.lock_owner = Some(owner.to_string());
        self.lock_expires_at = Some(expires_at);
        self.booking_id = None;
    }

    pub fn assign_to_booking(&mut self, booking_id: Uuid, owner: &str) {
        self.status = SeatStatus::Reserved;
        self.lock_owner = Some(owner.to_string());
        self.lock_expires_at = None;
        self.booking_id = Some(booking_id);
    }

    pub fn release(&mut self) {
        self.status = SeatStatus::Available;
        self.lock_owner = None;
        self.lock_expires_at = None;
        self.booking_id = None;
    }

    pub fn block(&mut self) {
        self.status = SeatStatus::Blocked;
        self.lock_owner = None;
        self.lock_expires_at = None;
        self.booking_id = None;
    }

    pub fn satisfies_invariant(&self) -> bool {
        self.status != SeatStatus::Reserved
            || self.booking_id.is_some()
            || self.lock_owner.is_some()
    }
}

/// Assignment of one flight seat to one passenger on one booking segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassengerSeat {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub passenger_id: Uuid,
    pub segment_id: Uuid,
    pub flight_seat_id: Uuid,
    pub seat_number: String,
    pub fee_nuc: i32,
    pub created_at: DateTime<Utc>,
}

impl PassengerSeat {
    pub fn new(
        booking_id: Uuid,
        passenger_id: Uuid,
        segment_id: Uuid,
        seat: &FlightSeat,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            passenger_id,
            segment_id,
            flight_seat_id: seat.id,
            seat_number: seat.seat_number.clone(),
            fee_nuc: seat.fee_nuc(),
            created_at: now,
        }
    }
}
