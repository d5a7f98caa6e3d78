use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SEATS_RESERVED_TOPIC: &str = "seats.reserved";
pub const SEATS_RELEASED_TOPIC: &str = "seats.released";
pub const SEATS_SELECTED_TOPIC: &str = "seats.selected";
pub const BOOKINGS_CONFIRMED_TOPIC: &str = "bookings.confirmed";
pub const BOOKINGS_CANCELLED_TOPIC: &str = "bookings.cancelled";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SeatReservedEvent {
    pub flight_id: Uuid,
    pub flight_seat_id: Uuid,
    pub seat_number: String,
    pub lock_owner: String,
    pub lock_expires_at: i64,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SeatReleasedEvent {
    pub flight_id: Uuid,
    pub flight_seat_id: Uuid,
    pub seat_number: String,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SeatSelectedEvent {
    pub booking_id: Uuid,
    pub flight_id: Uuid,
    pub passenger_id: Uuid,
    pub flight_seat_id: Uuid,
    pub seat_number: String,
    pub released_seat: Option<ReleasedSeat>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReleasedSeat {
    pub flight_id: Uuid,
    pub flight_seat_id: Uuid,
    pub seat_number: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BookingConfirmedEvent {
    pub booking_id: Uuid,
    pub reference: String,
    pub user_id: String,
    pub total_nuc: i32,
    pub currency: String,
    pub flight_ids: Vec<Uuid>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BookingCancelledEvent {
    pub booking_id: Uuid,
    pub reference: String,
    pub reason: String,
    pub refund_nuc: i32,
    pub released_seats: Vec<ReleasedSeat>,
    pub timestamp: i64,
}

/// Everything the booking core announces after a successful commit.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainEvent {
    SeatReserved(SeatReservedEvent),
    SeatReleased(SeatReleasedEvent),
    SeatSelected(SeatSelectedEvent),
    BookingConfirmed(BookingConfirmedEvent),
    BookingCancelled(BookingCancelledEvent),
}

impl DomainEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            DomainEvent::SeatReserved(_) => SEATS_RESERVED_TOPIC,
            DomainEvent::SeatReleased(_) => SEATS_RELEASED_TOPIC,
            DomainEvent::SeatSelected(_) => SEATS_SELECTED_TOPIC,
            DomainEvent::BookingConfirmed(_) => BOOKINGS_CONFIRMED_TOPIC,
            DomainEvent::BookingCancelled(_) => BOOKINGS_CANCELLED_TOPIC,
        }
    }

    /// Partition key: seat events are keyed by flight, booking events by booking.
    pub fn key(&self) -> String {
        match self {
            DomainEvent::SeatReserved(e) => e.flight_id.to_string(),
            DomainEvent::SeatReleased(e) => e.flight_id.to_string(),
            DomainEvent::SeatSelected(e) => e.flight_id.to_string(),
            DomainEvent::BookingConfirmed(e) => e.booking_id.to_string(),
            DomainEvent::BookingCancelled(e) => e.booking_id.to_string(),
        }
    }

    /// Short name used as the SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::SeatReserved(_) => "seat_reserved",
            DomainEvent::SeatReleased(_) => "seat_released",
            DomainEvent::SeatSelected(_) => "seat_selected",
            DomainEvent::BookingConfirmed(_) => "booking_confirmed",
            DomainEvent::BookingCancelled(_) => "booking_cancelled",
        }
    }

    /// Whether this event changes the seat map of `flight_id`.
    pub fn touches_flight(&self, flight_id: Uuid) -> bool {
        match self {
            DomainEvent::SeatReserved(e) => e.flight_id == flight_id,
            DomainEvent::SeatReleased(e) => e.flight_id == flight_id,
            DomainEvent::SeatSelected(e) => {
                e.flight_id == flight_id
                    || e.released_seat.as_ref().is_some_and(|s| s.flight_id == flight_id)
            }
            DomainEvent::BookingConfirmed(_) => false,
            DomainEvent::BookingCancelled(e) => {
                e.released_seats.iter().any(|s| s.flight_id == flight_id)
            }
        }
    }
}
