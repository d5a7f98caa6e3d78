use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skybook_core::booking::{Booking, BookingExtra, BookingHistory, BookingStatus, PaymentRecord};
use skybook_core::fare::{CabinFare, DynamicPricingRule, Promotion, SeasonalPricing};
use skybook_core::flight::{Aircraft, AircraftSeat, CabinClass, Flight};
use skybook_core::repository::{
    BookingRepository, FareRepository, FlightRepository, SeatRepository, UnitOfWork,
};
use skybook_core::seat::{FlightSeat, PassengerSeat, SeatStatus};
use skybook_core::{Change, ChangeSet, StoreError, StoreResult};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

use crate::fixtures::FlightFixture;

#[derive(Debug, Clone, Default)]
struct State {
    aircraft: HashMap<Uuid, Aircraft>,
    aircraft_seats: HashMap<Uuid, AircraftSeat>,
    flights: HashMap<Uuid, Flight>,
    flight_seats: HashMap<Uuid, FlightSeat>,
    passenger_seats: HashMap<Uuid, PassengerSeat>,
    cabin_fares: HashMap<(Uuid, CabinClass), CabinFare>,
    pricing_rules: Vec<DynamicPricingRule>,
    seasons: Vec<SeasonalPricing>,
    promotions: HashMap<Uuid, Promotion>,
    bookings: HashMap<Uuid, Booking>,
    extras: Vec<BookingExtra>,
    history: Vec<BookingHistory>,
    payments: Vec<PaymentRecord>,
}

fn conflict(entity: &str, id: Uuid) -> StoreError {
    StoreError::Conflict(format!("{} {} was modified concurrently", entity, id))
}

fn duplicate(what: String) -> StoreError {
    StoreError::Conflict(format!("Duplicate {}", what))
}

impl State {
    fn check_version(&self, entity: &str, id: Uuid, current: Option<i32>, expected: i32) -> StoreResult<()> {
        match current {
            Some(v) if v == expected => Ok(()),
            _ => Err(conflict(entity, id)),
        }
    }

    /// Same constraints the Postgres schema enforces
    fn apply(&mut self, change: Change) -> StoreResult<()> {
        match change {
            Change::UpdateFlight { flight, expected_version } => {
                let current = self.flights.get(&flight.id).map(|f| f.version);
                self.check_version("Flight", flight.id, current, expected_version)?;
                self.flights.insert(flight.id, flight);
            }
            Change::InsertFlightSeat(seat) => {
                let taken = self.flight_seats.contains_key(&seat.id)
                    || self
                        .flight_seats
                        .values()
                        .any(|s| s.flight_id == seat.flight_id && s.seat_id == seat.seat_id);
                if taken {
                    return Err(duplicate(format!("flight seat {}", seat.seat_number)));
                }
                self.flight_seats.insert(seat.id, seat);
            }
            Change::UpdateFlightSeat { seat, expected_version } => {
                let current = self.flight_seats.get(&seat.id).map(|s| s.version);
                self.check_version("Flight seat", seat.id, current, expected_version)?;
                if !seat.satisfies_invariant() {
                    return Err(StoreError::Database(format!(
                        "Reserved flight seat {} has neither booking nor lock owner",
                        seat.id
                    )));
                }
                self.flight_seats.insert(seat.id, seat);
            }
            Change::InsertPassengerSeat(seat) => {
                let taken = self.passenger_seats.values().any(|p| {
                    (p.passenger_id == seat.passenger_id && p.segment_id == seat.segment_id)
                        || p.flight_seat_id == seat.flight_seat_id
                });
                if taken {
                    return Err(duplicate(format!("passenger seat {}", seat.seat_number)));
                }
                self.passenger_seats.insert(seat.id, seat);
            }
            Change::DeletePassengerSeat { id } => {
                if self.passenger_seats.remove(&id).is_none() {
                    return Err(conflict("Passenger seat", id));
                }
            }
            Change::InsertBooking(booking) => {
                let taken = self.bookings.contains_key(&booking.id)
                    || self.bookings.values().any(|b| b.reference == booking.reference);
                if taken {
                    return Err(duplicate(format!("booking reference {}", booking.reference)));
                }
                self.bookings.insert(booking.id, booking);
            }
            Change::UpdateBooking { booking, expected_version } => {
                let current = self.bookings.get(&booking.id).map(|b| b.version);
                self.check_version("Booking", booking.id, current, expected_version)?;
                if !booking.totals.is_consistent() {
                    return Err(StoreError::Database(format!(
                        "Booking {} total does not match its components",
                        booking.reference
                    )));
                }
                self.bookings.insert(booking.id, booking);
            }
            Change::InsertBookingExtra(extra) => self.extras.push(extra),
            Change::InsertPaymentRecord(payment) => self.payments.push(payment),
            Change::AppendHistory(row) => self.history.push(row),
            Change::UpdatePromotion { promotion, expected_version } => {
                let current = self.promotions.get(&promotion.id).map(|p| p.version);
                self.check_version("Promotion", promotion.id, current, expected_version)?;
                self.promotions.insert(promotion.id, promotion);
            }
        }
        Ok(())
    }
}

/// Process-local `Store` used by tests and by the service in demo mode.
///
/// A commit applies the change set to a scratch copy of the state and only
/// swaps it in when every change succeeded.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn seed_aircraft(&self, aircraft: Aircraft, seats: Vec<AircraftSeat>) {
        let mut state = self.state();
        for seat in seats {
            state.aircraft_seats.insert(seat.id, seat);
        }
        state.aircraft.insert(aircraft.id, aircraft);
    }

    pub fn seed_flight(&self, flight: Flight) {
        self.state().flights.insert(flight.id, flight);
    }

    pub fn seed_flight_seat(&self, seat: FlightSeat) {
        self.state().flight_seats.insert(seat.id, seat);
    }

    /// Aircraft, aircraft seats, flight and any pre-built flight seats
    pub fn seed_fixture(&self, fixture: &FlightFixture) {
        self.seed_aircraft(fixture.aircraft.clone(), fixture.aircraft_seats.clone());
        self.seed_flight(fixture.flight.clone());
        for seat in &fixture.flight_seats {
            self.seed_flight_seat(seat.clone());
        }
    }

    pub fn seed_cabin_fare(&self, flight_id: Uuid, cabin_class: CabinClass, base_fare_nuc: i32, currency: &str) {
        self.state().cabin_fares.insert(
            (flight_id, cabin_class),
            CabinFare {
                flight_id,
                cabin_class,
                base_fare_nuc,
                currency: currency.to_string(),
            },
        );
    }

    pub fn seed_pricing_rule(&self, rule: DynamicPricingRule) {
        self.state().pricing_rules.push(rule);
    }

    pub fn seed_season(&self, season: SeasonalPricing) {
        self.state().seasons.push(season);
    }

    pub fn seed_promotion(&self, promotion: Promotion) {
        self.state().promotions.insert(promotion.id, promotion);
    }

    pub fn seed_booking(&self, booking: Booking) {
        self.state().bookings.insert(booking.id, booking);
    }

    /// Seats of a flight ordered by seat number, for before/after comparisons
    pub fn snapshot_flight_seats(&self, flight_id: Uuid) -> Vec<FlightSeat> {
        let mut seats: Vec<FlightSeat> = self
            .state()
            .flight_seats
            .values()
            .filter(|s| s.flight_id == flight_id)
            .cloned()
            .collect();
        seats.sort_by(|a, b| a.seat_number.cmp(&b.seat_number));
        seats
    }

    /// Total of each booking checked against its components; returns offenders
    pub fn inconsistent_bookings(&self) -> Vec<Uuid> {
        self.state()
            .bookings
            .values()
            .filter(|b| !b.totals.is_consistent())
            .map(|b| b.id)
            .collect()
    }

    /// Reserved seats without booking and lock owner; should always be empty
    pub fn orphaned_reservations(&self) -> Vec<Uuid> {
        self.state()
            .flight_seats
            .values()
            .filter(|s| s.status == SeatStatus::Reserved && !s.satisfies_invariant())
            .map(|s| s.id)
            .collect()
    }
}

#[async_trait]
impl FlightRepository for InMemoryStore {
    async fn get_flight(&self, id: Uuid) -> StoreResult<Option<Flight>> {
        Ok(self.state().flights.get(&id).cloned())
    }

    async fn get_aircraft(&self, id: Uuid) -> StoreResult<Option<Aircraft>> {
        Ok(self.state().aircraft.get(&id).cloned())
    }

    async fn list_aircraft_seats(&self, aircraft_id: Uuid) -> StoreResult<Vec<AircraftSeat>> {
        let mut seats: Vec<AircraftSeat> = self
            .state()
            .aircraft_seats
            .values()
            .filter(|s| s.aircraft_id == aircraft_id)
            .cloned()
            .collect();
        seats.sort_by(|a, b| a.seat_number.cmp(&b.seat_number));
        Ok(seats)
    }
}

#[async_trait]
impl SeatRepository for InMemoryStore {
    async fn get_flight_seat(&self, id: Uuid) -> StoreResult<Option<FlightSeat>> {
        Ok(self.state().flight_seats.get(&id).cloned())
    }

    async fn find_flight_seat(
        &self,
        flight_id: Uuid,
        seat_id: Uuid,
    ) -> StoreResult<Option<FlightSeat>> {
        Ok(self
            .state()
            .flight_seats
            .values()
            .find(|s| s.flight_id == flight_id && s.seat_id == seat_id)
            .cloned())
    }

    async fn list_flight_seats(&self, flight_id: Uuid) -> StoreResult<Vec<FlightSeat>> {
        Ok(self.snapshot_flight_seats(flight_id))
    }

    async fn find_passenger_seat(
        &self,
        passenger_id: Uuid,
        segment_id: Uuid,
    ) -> StoreResult<Option<PassengerSeat>> {
        Ok(self
            .state()
            .passenger_seats
            .values()
            .find(|p| p.passenger_id == passenger_id && p.segment_id == segment_id)
            .cloned())
    }

    async fn list_expired_seat_locks(&self, now: DateTime<Utc>) -> StoreResult<Vec<FlightSeat>> {
        let mut seats: Vec<FlightSeat> = self
            .state()
            .flight_seats
            .values()
            .filter(|s| s.is_lock_expired(now))
            .cloned()
            .collect();
        seats.sort_by_key(|s| s.lock_expires_at);
        Ok(seats)
    }
}

#[async_trait]
impl BookingRepository for InMemoryStore {
    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.state().bookings.get(&id).cloned())
    }

    async fn list_bookings_for_user(&self, user_id: &str) -> StoreResult<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .state()
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn list_passenger_seats(&self, booking_id: Uuid) -> StoreResult<Vec<PassengerSeat>> {
        let mut seats: Vec<PassengerSeat> = self
            .state()
            .passenger_seats
            .values()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect();
        seats.sort_by_key(|p| p.created_at);
        Ok(seats)
    }

    async fn list_booking_extras(&self, booking_id: Uuid) -> StoreResult<Vec<BookingExtra>> {
        Ok(self
            .state()
            .extras
            .iter()
            .filter(|e| e.booking_id == booking_id)
            .cloned()
            .collect())
    }

    async fn list_booking_history(&self, booking_id: Uuid) -> StoreResult<Vec<BookingHistory>> {
        Ok(self
            .state()
            .history
            .iter()
            .filter(|h| h.booking_id == booking_id)
            .cloned()
            .collect())
    }

    async fn list_payment_records(&self, booking_id: Uuid) -> StoreResult<Vec<PaymentRecord>> {
        Ok(self
            .state()
            .payments
            .iter()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect())
    }

    async fn list_expired_pending_bookings(&self, now: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .state()
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::Pending && b.is_expired(now))
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.expires_at);
        Ok(bookings)
    }
}

#[async_trait]
impl FareRepository for InMemoryStore {
    async fn get_cabin_fare(
        &self,
        flight_id: Uuid,
        cabin_class: CabinClass,
    ) -> StoreResult<Option<CabinFare>> {
        Ok(self.state().cabin_fares.get(&(flight_id, cabin_class)).cloned())
    }

    async fn list_pricing_rules(&self) -> StoreResult<Vec<DynamicPricingRule>> {
        Ok(self.state().pricing_rules.clone())
    }

    async fn list_seasonal_pricing(&self) -> StoreResult<Vec<SeasonalPricing>> {
        Ok(self.state().seasons.clone())
    }

    async fn find_promotion_by_code(&self, code: &str) -> StoreResult<Option<Promotion>> {
        Ok(self
            .state()
            .promotions
            .values()
            .find(|p| p.code.eq_ignore_ascii_case(code))
            .cloned())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryStore {
    async fn commit(&self, changes: ChangeSet) -> StoreResult<()> {
        let actor = changes.actor().to_string();
        let mut state = self.state();
        let mut scratch = state.clone();

        for change in changes.into_changes() {
            scratch.apply(change)?;
        }

        *state = scratch;
        debug!("Committed in-memory change set for {}", actor);
        Ok(())
    }
}
