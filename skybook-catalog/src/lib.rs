pub mod inventory;
pub mod pricing;
pub mod promotion;
pub mod quote;
pub mod rules;

pub use inventory::{InventoryError, SeatInventory};
pub use pricing::{FareContext, PricingConfig, PricingEngine};
pub use promotion::PromotionError;
pub use quote::{Quote, QuoteEngine, QuoteRequest, QuoteSettings};
pub use rules::RuleEngine;
