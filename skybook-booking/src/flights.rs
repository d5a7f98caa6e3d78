use serde::Serialize;
use skybook_catalog::inventory::{CabinInventory, SeatInventory};
use skybook_core::flight::{Aircraft, AircraftSeat, Flight, FlightStatus};
use skybook_core::seat::{FlightSeat, SeatStatus};
use skybook_core::{BookingError, BookingResult, ChangeSet, RequestContext, Role, Store};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AircraftDetails {
    pub aircraft: Aircraft,
    pub seats: Vec<AircraftSeat>,
}

/// Seat rows of one flight with per-cabin counts
#[derive(Debug, Clone, Serialize)]
pub struct SeatMap {
    pub flight_id: Uuid,
    pub seats: Vec<FlightSeat>,
    pub cabins: Vec<CabinInventory>,
}

/// Flight reference reads plus the admin operations on a flight's seat rows
pub struct FlightService {
    store: Arc<dyn Store>,
}

impl FlightService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn ensure_admin(ctx: &RequestContext) -> BookingResult<()> {
        if ctx.role != Role::Admin {
            return Err(BookingError::Forbidden("Admin role required".to_string()));
        }
        Ok(())
    }

    async fn load_flight(&self, flight_id: Uuid) -> BookingResult<Flight> {
        self.store
            .get_flight(flight_id)
            .await?
            .ok_or_else(|| BookingError::not_found("Flight", flight_id))
    }

    pub async fn get_flight(&self, flight_id: Uuid) -> BookingResult<Flight> {
        self.load_flight(flight_id).await
    }

    pub async fn get_aircraft(&self, aircraft_id: Uuid) -> BookingResult<AircraftDetails> {
        let aircraft = self
            .store
            .get_aircraft(aircraft_id)
            .await?
            .ok_or_else(|| BookingError::not_found("Aircraft", aircraft_id))?;
        let seats = self.store.list_aircraft_seats(aircraft.id).await?;
        Ok(AircraftDetails { aircraft, seats })
    }

    /// Lock-expired seats are reported as they are stored but counted as
    /// available in `cabins`.
    pub async fn list_flight_seats(&self, ctx: &RequestContext, flight_id: Uuid) -> BookingResult<SeatMap> {
        let flight = self.load_flight(flight_id).await?;
        let seats = self.store.list_flight_seats(flight.id).await?;
        let cabins = SeatInventory::from_seats(&seats, ctx.now)
            .cabins()
            .into_iter()
            .cloned()
            .collect();

        Ok(SeatMap {
            flight_id: flight.id,
            seats,
            cabins,
        })
    }

    /// One `Available` seat row per aircraft seat
    pub async fn schedule_flight_seats(
        &self,
        ctx: &RequestContext,
        flight_id: Uuid,
    ) -> BookingResult<Vec<FlightSeat>> {
        Self::ensure_admin(ctx)?;
        let flight = self.load_flight(flight_id).await?;

        if !self.store.list_flight_seats(flight.id).await?.is_empty() {
            return Err(BookingError::Conflict(format!(
                "Seats for flight {} are already scheduled",
                flight.flight_number
            )));
        }
        if !flight.is_bookable() {
            return Err(BookingError::Conflict(format!(
                "Flight {} is {}",
                flight.flight_number, flight.status
            )));
        }

        let aircraft_seats = self.store.list_aircraft_seats(flight.aircraft_id).await?;
        if aircraft_seats.is_empty() {
            return Err(BookingError::Validation(format!(
                "Aircraft {} has no seat map",
                flight.aircraft_id
            )));
        }

        let mut changes = ChangeSet::new(ctx);
        let mut seats = Vec::with_capacity(aircraft_seats.len());
        for aircraft_seat in &aircraft_seats {
            let mut seat = FlightSeat::new(flight.id, aircraft_seat, ctx.now);
            changes.insert_flight_seat(&mut seat);
            seats.push(seat);
        }
        self.store.commit(changes).await?;

        info!("Scheduled {} seats for flight {}", seats.len(), flight.flight_number);
        Ok(seats)
    }

    /// Flight goes to `Cancelled` and every seat to `Blocked`. Bookings on the
    /// flight are left for staff to handle.
    pub async fn cancel_flight(&self, ctx: &RequestContext, flight_id: Uuid) -> BookingResult<Flight> {
        Self::ensure_admin(ctx)?;
        let mut flight = self.load_flight(flight_id).await?;

        if flight.status == FlightStatus::Cancelled {
            return Err(BookingError::Conflict(format!(
                "Flight {} is already cancelled",
                flight.flight_number
            )));
        }
        if flight.has_departed(ctx.now) {
            return Err(BookingError::Conflict(format!(
                "Flight {} has already departed",
                flight.flight_number
            )));
        }

        let mut changes = ChangeSet::new(ctx);
        let mut bound = 0;
        for mut seat in self.store.list_flight_seats(flight.id).await? {
            if seat.status == SeatStatus::Blocked {
                continue;
            }
            if seat.booking_id.is_some() {
                bound += 1;
            }
            seat.block();
            changes.update_flight_seat(&mut seat);
        }

        flight.status = FlightStatus::Cancelled;
        changes.update_flight(&mut flight);
        self.store.commit(changes).await?;

        if bound > 0 {
            warn!(
                "Flight {} cancelled with {} seats still assigned to bookings",
                flight.flight_number, bound
            );
        }
        info!("Flight {} cancelled by {}", flight.flight_number, ctx.user_id);
        Ok(flight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{admin, customer, harness, staff};
    use chrono::{Duration, Utc};
    use skybook_core::flight::CabinClass;
    use skybook_core::repository::SeatRepository;
    use skybook_store::fixtures::FlightFixture;

    #[tokio::test]
    async fn test_reads_are_idempotent() {
        let h = harness();
        let first = h.flights.get_flight(h.flight_id()).await.unwrap();
        let second = h.flights.get_flight(h.flight_id()).await.unwrap();
        assert_eq!(first, second);

        let before = h.store.snapshot_flight_seats(h.flight_id());
        let a = h.flights.get_aircraft(first.aircraft_id).await.unwrap();
        let b = h.flights.get_aircraft(first.aircraft_id).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.seats.len(), 5);
        assert_eq!(before, h.store.snapshot_flight_seats(h.flight_id()));

        let err = h.flights.get_flight(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, BookingError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_seat_map_counts_cabins() {
        let h = harness();
        let ctx = customer("user-a");
        h.seats.reserve_seat(&ctx, h.flight_id(), h.aircraft_seat("12A"), 10).await.unwrap();

        let map = h.flights.list_flight_seats(&ctx, h.flight_id()).await.unwrap();
        assert_eq!(map.seats.len(), 5);
        let economy = map.cabins.iter().find(|c| c.cabin_class == CabinClass::Economy).unwrap();
        assert_eq!(economy.total_seats, 4);
        assert_eq!(economy.available_seats, 3);
        assert_eq!(economy.reserved_seats, 1);

        // After the lock lapses the seat counts as available again
        let later = RequestContext::new("user-a", Role::Customer, ctx.now + Duration::minutes(11));
        let map = h.flights.list_flight_seats(&later, h.flight_id()).await.unwrap();
        let economy = map.cabins.iter().find(|c| c.cabin_class == CabinClass::Economy).unwrap();
        assert_eq!(economy.available_seats, 4);
    }

    #[tokio::test]
    async fn test_schedule_flight_seats_once() {
        let h = harness();
        let fixture = FlightFixture::economy("SB300", Utc::now() + Duration::days(5), 6, 1000).unscheduled();
        h.store.seed_fixture(&fixture);

        let err = h.flights.schedule_flight_seats(&staff(), fixture.flight.id).await.unwrap_err();
        assert!(matches!(err, BookingError::Forbidden(_)));

        let seats = h.flights.schedule_flight_seats(&admin(), fixture.flight.id).await.unwrap();
        assert_eq!(seats.len(), 6);
        assert!(seats.iter().all(|s| s.status == SeatStatus::Available));
        assert_eq!(h.store.list_flight_seats(fixture.flight.id).await.unwrap().len(), 6);

        let err = h.flights.schedule_flight_seats(&admin(), fixture.flight.id).await.unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_cancel_flight_blocks_every_seat() {
        let h = harness();
        h.seats
            .reserve_seat(&customer("user-a"), h.flight_id(), h.aircraft_seat("15A"), 10)
            .await
            .unwrap();

        let flight = h.flights.cancel_flight(&admin(), h.flight_id()).await.unwrap();
        assert_eq!(flight.status, FlightStatus::Cancelled);

        let seats = h.store.snapshot_flight_seats(h.flight_id());
        assert!(seats.iter().all(|s| s.status == SeatStatus::Blocked && s.lock_owner.is_none()));

        let err = h
            .seats
            .reserve_seat(&customer("user-b"), h.flight_id(), h.aircraft_seat("15B"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));

        let err = h.flights.cancel_flight(&admin(), h.flight_id()).await.unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));
    }
}
