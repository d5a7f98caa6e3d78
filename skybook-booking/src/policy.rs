use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Share of the paid amount returned when cancelling at least
/// `min_hours_before_departure` hours before the first departure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundTier {
    pub min_hours_before_departure: i64,
    pub refund_percent: u32,
}

/// Refund rules for cancelled paid bookings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationPolicy {
    tiers: Vec<RefundTier>,
    /// Deducted from every non-zero refund
    cancellation_fee_nuc: i32,
}

impl Default for CancellationPolicy {
    fn default() -> Self {
        Self::new(
            vec![
                RefundTier {
                    min_hours_before_departure: 72,
                    refund_percent: 100,
                },
                RefundTier {
                    min_hours_before_departure: 24,
                    refund_percent: 50,
                },
            ],
            2500,
        )
    }
}

impl CancellationPolicy {
    pub fn new(mut tiers: Vec<RefundTier>, cancellation_fee_nuc: i32) -> Self {
        tiers.sort_by_key(|t| -t.min_hours_before_departure);
        Self {
            tiers,
            cancellation_fee_nuc,
        }
    }

    /// Percentage of the paid amount that is refundable at `now`
    pub fn refund_percent(&self, first_departure: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u32 {
        let Some(departure) = first_departure else {
            return 0;
        };
        let hours_left = (departure - now).num_hours();
        if departure <= now {
            return 0;
        }

        self.tiers
            .iter()
            .find(|t| hours_left >= t.min_hours_before_departure)
            .map(|t| t.refund_percent.min(100))
            .unwrap_or(0)
    }

    pub fn refund_for(&self, paid_nuc: i32, first_departure: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i32 {
        let percent = self.refund_percent(first_departure, now);
        if percent == 0 || paid_nuc <= 0 {
            return 0;
        }
        let gross = (paid_nuc as i64 * percent as i64 / 100) as i32;
        (gross - self.cancellation_fee_nuc).max(0)
    }
}
