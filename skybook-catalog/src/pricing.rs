use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skybook_core::booking::PassengerType;
use skybook_core::fare::{DynamicPricingRule, PriceAdjustment, SeasonalPricing};
use skybook_core::flight::CabinClass;

use crate::rules::RuleEngine;

/// What a fare is being computed for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FareContext {
    pub cabin_class: CabinClass,
    pub departure_time: DateTime<Utc>,
    pub now: DateTime<Utc>,
    /// Share of the cabin already sold or held, 0.0 - 1.0
    pub load_factor: f64,
}

impl FareContext {
    pub fn days_before_departure(&self) -> i64 {
        (self.departure_time.date_naive() - self.now.date_naive()).num_days()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Maximum multiplier allowed
    pub max_multiplier: f64,

    /// Minimum multiplier allowed
    pub min_multiplier: f64,

    /// Child fare as a share of the adult fare
    pub child_fare_ratio: f64,

    /// Infant fare as a share of the adult fare
    pub infant_fare_ratio: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            max_multiplier: 3.0,
            min_multiplier: 0.5,
            child_fare_ratio: 0.75,
            infant_fare_ratio: 0.10,
        }
    }
}

/// Fare arithmetic over stored rule rows
#[derive(Debug, Clone, Default)]
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    /// Adult fare after seasonal multipliers and dynamic rules.
    ///
    /// Percentage adjustments and seasons compound into one multiplier that is
    /// clamped to the configured band; fixed adjustments are added afterwards.
    pub fn adult_fare(
        &self,
        base_fare_nuc: i32,
        context: &FareContext,
        rules: &[DynamicPricingRule],
        seasons: &[SeasonalPricing],
    ) -> i32 {
        let departure_date = context.departure_time.date_naive();

        let mut multiplier: f64 = seasons
            .iter()
            .filter(|s| s.is_active && s.start_date <= departure_date && departure_date <= s.end_date)
            .map(|s| s.multiplier)
            .product();

        let mut fixed_nuc = 0;
        let engine = RuleEngine::new(rules.to_vec());
        for rule in engine.applicable(context) {
            match rule.adjustment {
                PriceAdjustment::Percentage(pct) => multiplier *= 1.0 + pct / 100.0,
                PriceAdjustment::Fixed(amount) => fixed_nuc += amount,
            }
        }

        let multiplier = multiplier
            .max(self.config.min_multiplier)
            .min(self.config.max_multiplier);

        (round_nuc(base_fare_nuc as f64 * multiplier) + fixed_nuc).max(0)
    }

    /// Fare for one passenger of the given type from the adult fare
    pub fn passenger_fare(&self, adult_fare_nuc: i32, passenger_type: PassengerType) -> i32 {
        match passenger_type {
            PassengerType::Adult => adult_fare_nuc,
            PassengerType::Child => round_nuc(adult_fare_nuc as f64 * self.config.child_fare_ratio),
            PassengerType::Infant => round_nuc(adult_fare_nuc as f64 * self.config.infant_fare_ratio),
        }
    }

    pub fn tax(&self, fare_nuc: i32, tax_rate: f64) -> i32 {
        round_nuc(fare_nuc as f64 * tax_rate)
    }
}

/// Round to the nearest minor unit, halves away from zero
pub fn round_nuc(value: f64) -> i32 {
    value.round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};
    use uuid::Uuid;

    fn context() -> FareContext {
        let departure_time = Utc.with_ymd_and_hms(2026, 7, 3, 9, 0, 0).unwrap();
        FareContext {
            cabin_class: CabinClass::Economy,
            departure_time,
            now: departure_time - Duration::days(30),
            load_factor: 0.2,
        }
    }

    fn rule(adjustment: PriceAdjustment) -> DynamicPricingRule {
        DynamicPricingRule {
            id: Uuid::new_v4(),
            name: "rule".to_string(),
            cabin_class: None,
            valid_from: None,
            valid_to: None,
            days_of_week: vec![],
            min_load_factor: None,
            min_days_before_departure: None,
            max_days_before_departure: None,
            adjustment,
            priority: 0,
            is_active: true,
        }
    }

    #[test]
    fn test_passenger_type_ratios() {
        let engine = PricingEngine::default();
        assert_eq!(engine.passenger_fare(10000, PassengerType::Adult), 10000);
        assert_eq!(engine.passenger_fare(10000, PassengerType::Child), 7500);
        assert_eq!(engine.passenger_fare(10000, PassengerType::Infant), 1000);
        // 0.75 * 333 = 249.75
        assert_eq!(engine.passenger_fare(333, PassengerType::Child), 250);
    }

    #[test]
    fn test_no_rules_keeps_stored_fare() {
        let engine = PricingEngine::default();
        assert_eq!(engine.adult_fare(50000, &context(), &[], &[]), 50000);
    }

    #[test]
    fn test_rules_and_seasons_compound() {
        let engine = PricingEngine::default();
        let season = SeasonalPricing {
            id: Uuid::new_v4(),
            name: "Summer".to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 8, 31).unwrap(),
            multiplier: 1.2,
            is_active: true,
        };
        let rules = vec![
            rule(PriceAdjustment::Percentage(10.0)),
            rule(PriceAdjustment::Fixed(500)),
        ];

        // 10000 * 1.2 * 1.1 + 500
        assert_eq!(engine.adult_fare(10000, &context(), &rules, &[season]), 13700);
    }

    #[test]
    fn test_multiplier_is_clamped() {
        let engine = PricingEngine::default();
        let rules = vec![rule(PriceAdjustment::Percentage(500.0))];
        assert_eq!(engine.adult_fare(10000, &context(), &rules, &[]), 30000);

        let rules = vec![rule(PriceAdjustment::Percentage(-90.0))];
        assert_eq!(engine.adult_fare(10000, &context(), &rules, &[]), 5000);
    }

    #[test]
    fn test_tax_rounding() {
        let engine = PricingEngine::default();
        assert_eq!(engine.tax(50000, 0.1), 5000);
        assert_eq!(engine.tax(12345, 0.1), 1235);
    }
}
