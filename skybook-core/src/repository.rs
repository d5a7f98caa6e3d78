use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::{Booking, BookingExtra, BookingHistory, PaymentRecord};
use crate::error::StoreResult;
use crate::fare::{CabinFare, DynamicPricingRule, Promotion, SeasonalPricing};
use crate::flight::{Aircraft, AircraftSeat, CabinClass, Flight};
use crate::seat::{FlightSeat, PassengerSeat};
use crate::unit_of_work::ChangeSet;

/// Repository trait for flight and aircraft reference data
#[async_trait]
pub trait FlightRepository: Send + Sync {
    async fn get_flight(&self, id: Uuid) -> StoreResult<Option<Flight>>;

    async fn get_aircraft(&self, id: Uuid) -> StoreResult<Option<Aircraft>>;

    async fn list_aircraft_seats(&self, aircraft_id: Uuid) -> StoreResult<Vec<AircraftSeat>>;
}

/// Repository trait for per-flight seat inventory
#[async_trait]
pub trait SeatRepository: Send + Sync {
    async fn get_flight_seat(&self, id: Uuid) -> StoreResult<Option<FlightSeat>>;

    async fn find_flight_seat(
        &self,
        flight_id: Uuid,
        seat_id: Uuid,
    ) -> StoreResult<Option<FlightSeat>>;

    async fn list_flight_seats(&self, flight_id: Uuid) -> StoreResult<Vec<FlightSeat>>;

    async fn find_passenger_seat(
        &self,
        passenger_id: Uuid,
        segment_id: Uuid,
    ) -> StoreResult<Option<PassengerSeat>>;

    /// Unbound `Reserved` seats whose lock expired at or before `now`
    async fn list_expired_seat_locks(&self, now: DateTime<Utc>) -> StoreResult<Vec<FlightSeat>>;
}

/// Repository trait for bookings and their append-only children
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn list_bookings_for_user(&self, user_id: &str) -> StoreResult<Vec<Booking>>;

    async fn list_passenger_seats(&self, booking_id: Uuid) -> StoreResult<Vec<PassengerSeat>>;

    async fn list_booking_extras(&self, booking_id: Uuid) -> StoreResult<Vec<BookingExtra>>;

    async fn list_booking_history(&self, booking_id: Uuid) -> StoreResult<Vec<BookingHistory>>;

    async fn list_payment_records(&self, booking_id: Uuid) -> StoreResult<Vec<PaymentRecord>>;

    /// `Pending` bookings whose hold expired at or before `now`
    async fn list_expired_pending_bookings(&self, now: DateTime<Utc>) -> StoreResult<Vec<Booking>>;
}

/// Repository trait for pricing configuration rows
#[async_trait]
pub trait FareRepository: Send + Sync {
    async fn get_cabin_fare(
        &self,
        flight_id: Uuid,
        cabin_class: CabinClass,
    ) -> StoreResult<Option<CabinFare>>;

    async fn list_pricing_rules(&self) -> StoreResult<Vec<DynamicPricingRule>>;

    async fn list_seasonal_pricing(&self) -> StoreResult<Vec<SeasonalPricing>>;

    async fn find_promotion_by_code(&self, code: &str) -> StoreResult<Option<Promotion>>;
}

/// Single save-changes call: applies every change of the set or none of them
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn commit(&self, changes: ChangeSet) -> StoreResult<()>;
}

/// Everything the booking services need from persistence
pub trait Store:
    FlightRepository + SeatRepository + BookingRepository + FareRepository + UnitOfWork
{
}

impl<T> Store for T where
    T: FlightRepository + SeatRepository + BookingRepository + FareRepository + UnitOfWork
{
}
