#[macro_use]
mod macros;

pub mod booking;
pub mod context;
pub mod error;
pub mod events;
pub mod fare;
pub mod flight;
pub mod repository;
pub mod seat;
pub mod unit_of_work;

pub use context::{Policy, RequestContext, Role};
pub use error::{BookingError, BookingResult, StoreError, StoreResult, UnknownVariant};
pub use events::EventPublisher;
pub use repository::Store;
pub use unit_of_work::{Change, ChangeSet};
