use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skybook_core::booking::PassengerType;
use skybook_core::flight::CabinClass;
use skybook_core::{BookingError, BookingResult, Store};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::inventory::SeatInventory;
use crate::pricing::{round_nuc, FareContext, PricingEngine};

/// Largest party a single quote or booking may carry
pub const MAX_PASSENGERS: u32 = 9;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteSegmentRequest {
    pub flight_id: Uuid,
    pub cabin_class: CabinClass,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub segments: Vec<QuoteSegmentRequest>,
    pub adults: u32,
    #[serde(default)]
    pub children: u32,
    #[serde(default)]
    pub infants: u32,
    pub promo_code: Option<String>,
}

impl QuoteRequest {
    /// Passengers that occupy a seat; infants travel on a lap
    pub fn seated_passengers(&self) -> u32 {
        self.adults + self.children
    }

    fn validate(&self) -> BookingResult<()> {
        if self.segments.is_empty() {
            return Err(BookingError::Validation("At least one segment is required".to_string()));
        }
        if self.adults == 0 {
            return Err(BookingError::Validation("At least one adult is required".to_string()));
        }
        if self.infants > self.adults {
            return Err(BookingError::Validation(
                "Each infant must travel with an adult".to_string(),
            ));
        }
        if self.adults + self.children + self.infants > MAX_PASSENGERS {
            return Err(BookingError::Validation(format!(
                "At most {} passengers per booking",
                MAX_PASSENGERS
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentQuote {
    pub flight_id: Uuid,
    pub flight_number: String,
    pub cabin_class: CabinClass,
    pub departure_time: DateTime<Utc>,
    pub adult_fare_nuc: i32,
    pub child_fare_nuc: i32,
    pub infant_fare_nuc: i32,
    pub base_fare_nuc: i32,
    pub tax_nuc: i32,
    pub service_fee_nuc: i32,
    pub available_seats: i32,
}

impl SegmentQuote {
    pub fn total_nuc(&self) -> i32 {
        self.base_fare_nuc + self.tax_nuc + self.service_fee_nuc
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub segments: Vec<SegmentQuote>,
    pub adults: u32,
    pub children: u32,
    pub infants: u32,
    pub base_fare_nuc: i32,
    pub tax_nuc: i32,
    pub service_fee_nuc: i32,
    pub discount_nuc: i32,
    pub total_nuc: i32,
    pub currency: String,
    pub promo_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteSettings {
    pub tax_rate: f64,
    /// Flat fee charged per segment
    pub service_fee_nuc: i32,
    pub currency: String,
}

/// Discount from the fixed promo-code table, capped at the subtotal.
/// Unknown codes give no discount.
pub fn promo_code_discount(code: &str, subtotal_nuc: i32) -> Option<i32> {
    let discount = match code.trim().to_ascii_uppercase().as_str() {
        "SAVE10" => round_nuc(subtotal_nuc as f64 * 0.10),
        "SAVE20" => round_nuc(subtotal_nuc as f64 * 0.20),
        "FLAT50" => 5000,
        _ => return None,
    };
    Some(discount.min(subtotal_nuc))
}

/// Stateless price/availability computation. Reads flight, fare, rule and
/// seat rows; writes nothing.
pub struct QuoteEngine {
    store: Arc<dyn Store>,
    pricing: PricingEngine,
    settings: QuoteSettings,
}

impl QuoteEngine {
    pub fn new(store: Arc<dyn Store>, pricing: PricingEngine, settings: QuoteSettings) -> Self {
        Self {
            store,
            pricing,
            settings,
        }
    }

    pub fn settings(&self) -> &QuoteSettings {
        &self.settings
    }

    pub async fn quote(&self, request: &QuoteRequest, now: DateTime<Utc>) -> BookingResult<Quote> {
        request.validate()?;

        let rules = self.store.list_pricing_rules().await?;
        let seasons = self.store.list_seasonal_pricing().await?;
        let seated = request.seated_passengers() as i32;

        let mut segments = Vec::with_capacity(request.segments.len());
        for leg in &request.segments {
            let flight = self
                .store
                .get_flight(leg.flight_id)
                .await?
                .ok_or_else(|| BookingError::not_found("Flight", leg.flight_id))?;

            if !flight.is_bookable() || flight.departure_time <= now {
                return Err(BookingError::Conflict(format!(
                    "Flight {} is not open for booking",
                    flight.flight_number
                )));
            }

            let fare = self
                .store
                .get_cabin_fare(flight.id, leg.cabin_class)
                .await?
                .ok_or_else(|| {
                    BookingError::NotFound(format!(
                        "No {} fare for flight {}",
                        leg.cabin_class, flight.flight_number
                    ))
                })?;

            if fare.currency != self.settings.currency {
                return Err(BookingError::Validation(format!(
                    "Flight {} is priced in {}, expected {}",
                    flight.flight_number, fare.currency, self.settings.currency
                )));
            }

            let seats = self.store.list_flight_seats(flight.id).await?;
            let inventory = SeatInventory::from_seats(&seats, now);
            inventory
                .ensure_available(leg.cabin_class, seated)
                .map_err(|e| BookingError::Conflict(e.to_string()))?;

            let context = FareContext {
                cabin_class: leg.cabin_class,
                departure_time: flight.departure_time,
                now,
                load_factor: inventory.load_factor(leg.cabin_class),
            };

            let adult_fare_nuc = self.pricing.adult_fare(fare.base_fare_nuc, &context, &rules, &seasons);
            let child_fare_nuc = self.pricing.passenger_fare(adult_fare_nuc, PassengerType::Child);
            let infant_fare_nuc = self.pricing.passenger_fare(adult_fare_nuc, PassengerType::Infant);

            let base_fare_nuc = adult_fare_nuc * request.adults as i32
                + child_fare_nuc * request.children as i32
                + infant_fare_nuc * request.infants as i32;
            let tax_nuc = self.pricing.tax(base_fare_nuc, self.settings.tax_rate);

            debug!(
                "Quoted flight {} {}: adult {} base {} tax {}",
                flight.flight_number, leg.cabin_class, adult_fare_nuc, base_fare_nuc, tax_nuc
            );

            segments.push(SegmentQuote {
                flight_id: flight.id,
                flight_number: flight.flight_number,
                cabin_class: leg.cabin_class,
                departure_time: flight.departure_time,
                adult_fare_nuc,
                child_fare_nuc,
                infant_fare_nuc,
                base_fare_nuc,
                tax_nuc,
                service_fee_nuc: self.settings.service_fee_nuc,
                available_seats: inventory.available(leg.cabin_class),
            });
        }

        let base_fare_nuc: i32 = segments.iter().map(|s| s.base_fare_nuc).sum();
        let tax_nuc: i32 = segments.iter().map(|s| s.tax_nuc).sum();
        let service_fee_nuc: i32 = segments.iter().map(|s| s.service_fee_nuc).sum();
        let subtotal_nuc = base_fare_nuc + tax_nuc + service_fee_nuc;

        let (discount_nuc, promo_code) = match request.promo_code.as_deref() {
            Some(code) => match promo_code_discount(code, subtotal_nuc) {
                Some(discount) => (discount, Some(code.trim().to_ascii_uppercase())),
                None => (0, None),
            },
            None => (0, None),
        };

        Ok(Quote {
            segments,
            adults: request.adults,
            children: request.children,
            infants: request.infants,
            base_fare_nuc,
            tax_nuc,
            service_fee_nuc,
            discount_nuc,
            total_nuc: subtotal_nuc - discount_nuc,
            currency: self.settings.currency.clone(),
            promo_code,
        })
    }
}
