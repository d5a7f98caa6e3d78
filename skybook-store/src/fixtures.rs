use chrono::{DateTime, Duration, Utc};
use skybook_core::flight::{Aircraft, AircraftSeat, CabinClass, Flight, FlightStatus};
use skybook_core::seat::FlightSeat;
use uuid::Uuid;

use crate::memory::InMemoryStore;

const SEAT_LETTERS: [char; 6] = ['A', 'B', 'C', 'D', 'E', 'F'];

/// A flight with its aircraft and seat map, ready to seed into a store
#[derive(Debug, Clone)]
pub struct FlightFixture {
    pub flight: Flight,
    pub aircraft: Aircraft,
    pub aircraft_seats: Vec<AircraftSeat>,
    pub flight_seats: Vec<FlightSeat>,
}

impl FlightFixture {
    /// `layout` lists `(seat number, cabin, seat fee)` for every physical seat
    pub fn new(
        flight_number: &str,
        departure_time: DateTime<Utc>,
        layout: &[(&str, CabinClass, i32)],
    ) -> Self {
        let aircraft = Aircraft {
            id: Uuid::new_v4(),
            model: "A320neo".to_string(),
            registration: format!("N{}", &Uuid::new_v4().simple().to_string()[..5]).to_uppercase(),
            total_seats: layout.len() as i32,
        };

        let aircraft_seats: Vec<AircraftSeat> = layout
            .iter()
            .map(|(number, cabin_class, fee)| AircraftSeat {
                id: Uuid::new_v4(),
                aircraft_id: aircraft.id,
                seat_number: number.to_string(),
                cabin_class: *cabin_class,
                base_fee_nuc: *fee,
            })
            .collect();

        let flight = Flight {
            id: Uuid::new_v4(),
            flight_number: flight_number.to_string(),
            airline_code: flight_number.chars().take(2).collect(),
            origin: "SFO".to_string(),
            destination: "JFK".to_string(),
            aircraft_id: aircraft.id,
            departure_time,
            arrival_time: departure_time + Duration::hours(5),
            status: FlightStatus::Scheduled,
            version: 0,
            updated_at: Utc::now(),
        };

        let flight_seats = aircraft_seats
            .iter()
            .map(|seat| FlightSeat::new(flight.id, seat, flight.updated_at))
            .collect();

        Self {
            flight,
            aircraft,
            aircraft_seats,
            flight_seats,
        }
    }

    /// `count` economy seats numbered 1A..1F, 2A.. all with the same fee
    pub fn economy(flight_number: &str, departure_time: DateTime<Utc>, count: usize, fee_nuc: i32) -> Self {
        let numbers: Vec<String> = (0..count)
            .map(|i| format!("{}{}", i / SEAT_LETTERS.len() + 1, SEAT_LETTERS[i % SEAT_LETTERS.len()]))
            .collect();
        let layout: Vec<(&str, CabinClass, i32)> = numbers
            .iter()
            .map(|n| (n.as_str(), CabinClass::Economy, fee_nuc))
            .collect();
        Self::new(flight_number, departure_time, &layout)
    }

    /// Same fixture before its seat map has been scheduled
    pub fn unscheduled(mut self) -> Self {
        self.flight_seats.clear();
        self
    }

    pub fn seat(&self, seat_number: &str) -> Option<&FlightSeat> {
        self.flight_seats.iter().find(|s| s.seat_number == seat_number)
    }

    pub fn aircraft_seat(&self, seat_number: &str) -> Option<&AircraftSeat> {
        self.aircraft_seats.iter().find(|s| s.seat_number == seat_number)
    }
}

/// Store used when no database is configured: two flights a few days out,
/// each with business and economy seats and stored fares.
pub fn demo_store(currency: &str) -> (InMemoryStore, Vec<FlightFixture>) {
    let store = InMemoryStore::new();
    let now = Utc::now();

    let mut layout: Vec<(String, CabinClass, i32)> = Vec::new();
    for row in 1..=2 {
        for letter in ['A', 'C', 'D', 'F'] {
            layout.push((format!("{}{}", row, letter), CabinClass::Business, 0));
        }
    }
    for row in 10..=20 {
        for letter in SEAT_LETTERS {
            let fee = match letter {
                'A' | 'F' => 2500,
                'C' | 'D' => 2000,
                _ => 1000,
            };
            layout.push((format!("{}{}", row, letter), CabinClass::Economy, fee));
        }
    }
    let layout: Vec<(&str, CabinClass, i32)> = layout
        .iter()
        .map(|(n, c, f)| (n.as_str(), *c, *f))
        .collect();

    let fixtures = vec![
        FlightFixture::new("SB101", now + Duration::days(3), &layout),
        FlightFixture::new("SB202", now + Duration::days(7), &layout),
    ];

    for fixture in &fixtures {
        store.seed_fixture(fixture);
        store.seed_cabin_fare(fixture.flight.id, CabinClass::Economy, 50000, currency);
        store.seed_cabin_fare(fixture.flight.id, CabinClass::Business, 180000, currency);
    }

    (store, fixtures)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_economy_numbering() {
        let fixture = FlightFixture::economy("SB1", Utc::now(), 8, 500);
        let numbers: Vec<&str> = fixture.flight_seats.iter().map(|s| s.seat_number.as_str()).collect();
        assert_eq!(numbers, vec!["1A", "1B", "1C", "1D", "1E", "1F", "2A", "2B"]);
        assert_eq!(fixture.aircraft.total_seats, 8);
        assert!(fixture.flight_seats.iter().all(|s| s.flight_id == fixture.flight.id));
    }

    #[test]
    fn test_unscheduled_keeps_aircraft_layout() {
        let fixture = FlightFixture::economy("SB1", Utc::now(), 3, 500).unscheduled();
        assert!(fixture.flight_seats.is_empty());
        assert_eq!(fixture.aircraft_seats.len(), 3);
        assert!(fixture.aircraft_seat("1C").is_some());
    }
}
