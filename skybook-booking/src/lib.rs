pub mod bookings;
pub mod expiry;
pub mod flights;
pub mod policy;
pub mod seats;

#[cfg(test)]
mod test_support;

pub use bookings::{BookingService, BookingSettings};
pub use expiry::{ExpirySweeper, SweepReport};
pub use flights::FlightService;
pub use policy::CancellationPolicy;
pub use seats::SeatService;
