pub mod auth;
pub mod rate_limit;

pub use auth::{admin_only, admin_or_staff, customer_or_admin, Claims};
pub use rate_limit::rate_limit;
