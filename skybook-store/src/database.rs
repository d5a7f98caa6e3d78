use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{info, warn};

use crate::app_config::BusinessRules;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

#[derive(sqlx::FromRow)]
struct RuleRow {
    rule_key: String,
    rule_value: Value,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay `business_rules` table rows (`{"value": ...}`) on the configured defaults
    pub async fn fetch_business_rules(
        &self,
        defaults: BusinessRules,
    ) -> Result<BusinessRules, sqlx::Error> {
        let rows = sqlx::query_as::<_, RuleRow>("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;
        for row in rows {
            if !apply_rule(&mut rules, &row.rule_key, &row.rule_value) {
                warn!("Ignoring business rule {} = {}", row.rule_key, row.rule_value);
            }
        }

        Ok(rules)
    }
}

/// Returns false when the key is unknown or the value has the wrong shape
fn apply_rule(rules: &mut BusinessRules, key: &str, raw: &Value) -> bool {
    let Some(v) = raw.get("value") else {
        return false;
    };

    match key {
        "seat_lock_minutes" => v.as_i64().map(|m| rules.seat_lock_minutes = m).is_some(),
        "booking_hold_minutes" => v.as_i64().map(|m| rules.booking_hold_minutes = m).is_some(),
        "tax_rate" => v.as_f64().map(|r| rules.tax_rate = r).is_some(),
        "service_fee_nuc" => v
            .as_i64()
            .and_then(|f| i32::try_from(f).ok())
            .map(|f| rules.service_fee_nuc = f)
            .is_some(),
        "expiry_sweep_seconds" => v.as_u64().map(|s| rules.expiry_sweep_seconds = s).is_some(),
        "currency" => v.as_str().map(|c| rules.currency = c.to_string()).is_some(),
        _ => false,
    }
}
