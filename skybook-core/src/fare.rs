use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::flight::CabinClass;

/// Stored adult fare for one cabin of one flight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CabinFare {
    pub flight_id: Uuid,
    pub cabin_class: CabinClass,
    pub base_fare_nuc: i32,
    pub currency: String,
}

/// Percentage (e.g. `15.0` = 15%) or fixed minor-unit amount
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceAdjustment {
    Percentage(f64),
    Fixed(i32),
}

/// Fare adjustment applied when all of its conditions hold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicPricingRule {
    pub id: Uuid,
    pub name: String,
    pub cabin_class: Option<CabinClass>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    /// ISO weekday numbers of the departure date, Monday = 1
    pub days_of_week: Vec<u32>,
    pub min_load_factor: Option<f64>,
    pub min_days_before_departure: Option<i64>,
    pub max_days_before_departure: Option<i64>,
    pub adjustment: PriceAdjustment,
    pub priority: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalPricing {
    pub id: Uuid,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub multiplier: f64,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: Uuid,
    pub code: String,
    pub description: String,
    pub discount: PriceAdjustment,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub min_purchase_nuc: i32,
    pub is_active: bool,
    pub version: i32,
}
