use chrono::{DateTime, Utc};
use serde::Serialize;
use skybook_core::flight::CabinClass;
use skybook_core::seat::{FlightSeat, SeatStatus};
use std::collections::HashMap;

/// Seat counts for one cabin of one flight
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CabinInventory {
    pub cabin_class: CabinClass,
    pub total_seats: i32,
    pub available_seats: i32,
    pub reserved_seats: i32,
    pub blocked_seats: i32,
}

impl CabinInventory {
    fn empty(cabin_class: CabinClass) -> Self {
        Self {
            cabin_class,
            total_seats: 0,
            available_seats: 0,
            reserved_seats: 0,
            blocked_seats: 0,
        }
    }

    /// Share of the cabin that can no longer be sold
    pub fn load_factor(&self) -> f64 {
        if self.total_seats == 0 {
            0.0
        } else {
            1.0 - (self.available_seats as f64 / self.total_seats as f64)
        }
    }
}

/// Availability snapshot derived from a flight's seat rows
#[derive(Debug, Clone, Default)]
pub struct SeatInventory {
    cabins: HashMap<CabinClass, CabinInventory>,
}

impl SeatInventory {
    /// Count seats per cabin. A reserved seat whose unbound lock already
    /// expired counts as available.
    pub fn from_seats(seats: &[FlightSeat], now: DateTime<Utc>) -> Self {
        let mut cabins: HashMap<CabinClass, CabinInventory> = HashMap::new();

        for seat in seats {
            let entry = cabins
                .entry(seat.cabin_class)
                .or_insert_with(|| CabinInventory::empty(seat.cabin_class));
            entry.total_seats += 1;

            if seat.counts_as_available(now) {
                entry.available_seats += 1;
            } else if seat.status == SeatStatus::Blocked {
                entry.blocked_seats += 1;
            } else {
                entry.reserved_seats += 1;
            }
        }

        Self { cabins }
    }

    pub fn get(&self, cabin_class: CabinClass) -> Option<&CabinInventory> {
        self.cabins.get(&cabin_class)
    }

    pub fn available(&self, cabin_class: CabinClass) -> i32 {
        self.get(cabin_class).map(|c| c.available_seats).unwrap_or(0)
    }

    pub fn load_factor(&self, cabin_class: CabinClass) -> f64 {
        self.get(cabin_class).map(|c| c.load_factor()).unwrap_or(0.0)
    }

    pub fn ensure_available(
        &self,
        cabin_class: CabinClass,
        requested: i32,
    ) -> Result<(), InventoryError> {
        let available = self.available(cabin_class);
        if available < requested {
            return Err(InventoryError::InsufficientSeats {
                cabin_class,
                requested,
                available,
            });
        }
        Ok(())
    }

    pub fn cabins(&self) -> Vec<&CabinInventory> {
        let mut cabins: Vec<&CabinInventory> = self.cabins.values().collect();
        cabins.sort_by_key(|c| c.cabin_class.as_str());
        cabins
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Insufficient seats in {cabin_class}: requested {requested}, available {available}")]
    InsufficientSeats {
        cabin_class: CabinClass,
        requested: i32,
        available: i32,
    },
}
