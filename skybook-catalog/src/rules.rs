use chrono::Datelike;
use skybook_core::fare::DynamicPricingRule;

use crate::pricing::FareContext;

/// Evaluates dynamic pricing rule rows against a fare context
pub struct RuleEngine {
    rules: Vec<DynamicPricingRule>,
}

impl RuleEngine {
    pub fn new(rules: Vec<DynamicPricingRule>) -> Self {
        let mut rules = rules;
        rules.sort_by_key(|r| -r.priority);
        Self { rules }
    }

    /// Active rules whose conditions all hold, highest priority first
    pub fn applicable<'a>(
        &'a self,
        context: &'a FareContext,
    ) -> impl Iterator<Item = &'a DynamicPricingRule> + 'a {
        self.rules
            .iter()
            .filter(move |rule| rule.is_active && Self::matches(rule, context))
    }

    fn matches(rule: &DynamicPricingRule, context: &FareContext) -> bool {
        if let Some(cabin) = rule.cabin_class {
            if cabin != context.cabin_class {
                return false;
            }
        }

        let departure_date = context.departure_time.date_naive();
        if let Some(from) = rule.valid_from {
            if departure_date < from {
                return false;
            }
        }
        if let Some(to) = rule.valid_to {
            if departure_date > to {
                return false;
            }
        }

        if !rule.days_of_week.is_empty() {
            let weekday = departure_date.weekday().number_from_monday();
            if !rule.days_of_week.contains(&weekday) {
                return false;
            }
        }

        if let Some(min_load) = rule.min_load_factor {
            if context.load_factor < min_load {
                return false;
            }
        }

        let days_out = context.days_before_departure();
        if let Some(min_days) = rule.min_days_before_departure {
            if days_out < min_days {
                return false;
            }
        }
        if let Some(max_days) = rule.max_days_before_departure {
            if days_out > max_days {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use skybook_core::fare::PriceAdjustment;
    use skybook_core::flight::CabinClass;
    use uuid::Uuid;

    fn rule(name: &str, priority: i32) -> DynamicPricingRule {
        DynamicPricingRule {
            id: Uuid::new_v4(),
            name: name.to_string(),
            cabin_class: None,
            valid_from: None,
            valid_to: None,
            days_of_week: vec![],
            min_load_factor: None,
            min_days_before_departure: None,
            max_days_before_departure: None,
            adjustment: PriceAdjustment::Percentage(10.0),
            priority,
            is_active: true,
        }
    }

    fn context() -> FareContext {
        // A Friday
        let departure_time = Utc.with_ymd_and_hms(2026, 7, 3, 9, 0, 0).unwrap();
        FareContext {
            cabin_class: CabinClass::Economy,
            departure_time,
            now: departure_time - Duration::days(10),
            load_factor: 0.85,
        }
    }

    #[test]
    fn test_rules_ordered_by_priority() {
        let engine = RuleEngine::new(vec![rule("low", 1), rule("high", 50), rule("mid", 10)]);
        let ctx = context();
        let names: Vec<&str> = engine.applicable(&ctx).map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_conditions_filter_rules() {
        let mut weekend = rule("weekend", 1);
        weekend.days_of_week = vec![6, 7];

        let mut friday = rule("friday", 1);
        friday.days_of_week = vec![5];

        let mut high_demand = rule("high demand", 1);
        high_demand.min_load_factor = Some(0.8);

        let mut business_only = rule("business", 1);
        business_only.cabin_class = Some(CabinClass::Business);

        let mut last_minute = rule("last minute", 1);
        last_minute.max_days_before_departure = Some(3);

        let mut early_bird = rule("early bird", 1);
        early_bird.min_days_before_departure = Some(7);

        let mut inactive = rule("inactive", 1);
        inactive.is_active = false;

        let engine = RuleEngine::new(vec![
            weekend,
            friday,
            high_demand,
            business_only,
            last_minute,
            early_bird,
            inactive,
        ]);
        let ctx = context();
        let mut names: Vec<&str> = engine.applicable(&ctx).map(|r| r.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["early bird", "friday", "high demand"]);
    }

    #[test]
    fn test_season_window() {
        let mut summer = rule("summer", 1);
        summer.valid_from = chrono::NaiveDate::from_ymd_opt(2026, 6, 1);
        summer.valid_to = chrono::NaiveDate::from_ymd_opt(2026, 8, 31);

        let mut winter = rule("winter", 1);
        winter.valid_from = chrono::NaiveDate::from_ymd_opt(2026, 12, 1);

        let engine = RuleEngine::new(vec![summer, winter]);
        let ctx = context();
        let names: Vec<&str> = engine.applicable(&ctx).map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["summer"]);
    }
}
