use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fare/service tier on a flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CabinClass {
    Economy,
    PremiumEconomy,
    Business,
    First,
}

string_enum!(CabinClass {
    Economy => "ECONOMY",
    PremiumEconomy => "PREMIUM_ECONOMY",
    Business => "BUSINESS",
    First => "FIRST",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightStatus {
    Scheduled,
    Delayed,
    Cancelled,
    Departed,
    Arrived,
}

string_enum!(FlightStatus {
    Scheduled => "SCHEDULED",
    Delayed => "DELAYED",
    Cancelled => "CANCELLED",
    Departed => "DEPARTED",
    Arrived => "ARRIVED",
});

/// One scheduled flight occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flight {
    pub id: Uuid,
    pub flight_number: String,
    pub airline_code: String,
    pub origin: String,
    pub destination: String,
    pub aircraft_id: Uuid,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub status: FlightStatus,
    pub version: i32,
    pub updated_at: DateTime<Utc>,
}

impl Flight {
    /// Seats can still be sold on this flight
    pub fn is_bookable(&self) -> bool {
        matches!(self.status, FlightStatus::Scheduled | FlightStatus::Delayed)
    }

    pub fn has_departed(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, FlightStatus::Departed | FlightStatus::Arrived)
            || self.departure_time <= now
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aircraft {
    pub id: Uuid,
    pub model: String,
    pub registration: String,
    pub total_seats: i32,
}

/// A physical seat in an aircraft's cabin layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AircraftSeat {
    pub id: Uuid,
    pub aircraft_id: Uuid,
    pub seat_number: String,
    pub cabin_class: CabinClass,
    pub base_fee_nuc: i32,
}
