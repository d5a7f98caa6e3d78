use chrono::{DateTime, Utc};
use skybook_core::fare::{PriceAdjustment, Promotion};

use crate::pricing::round_nuc;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PromotionError {
    #[error("Promotion {0} is not active")]
    Inactive(String),

    #[error("Promotion {0} has not started yet")]
    NotStarted(String),

    #[error("Promotion {0} has ended")]
    Ended(String),

    #[error("Promotion {0} has reached its usage limit")]
    Exhausted(String),

    #[error("Promotion {code} requires a minimum purchase of {minimum}, got {amount}")]
    BelowMinimum { code: String, minimum: i32, amount: i32 },
}

/// Discount granted by `promotion` on `amount_nuc` at `now`, never more than
/// the amount itself.
pub fn evaluate_promotion(
    promotion: &Promotion,
    amount_nuc: i32,
    now: DateTime<Utc>,
) -> Result<i32, PromotionError> {
    if !promotion.is_active {
        return Err(PromotionError::Inactive(promotion.code.clone()));
    }
    if now < promotion.valid_from {
        return Err(PromotionError::NotStarted(promotion.code.clone()));
    }
    if now > promotion.valid_to {
        return Err(PromotionError::Ended(promotion.code.clone()));
    }
    if let Some(limit) = promotion.usage_limit {
        if promotion.used_count >= limit {
            return Err(PromotionError::Exhausted(promotion.code.clone()));
        }
    }
    if amount_nuc < promotion.min_purchase_nuc {
        return Err(PromotionError::BelowMinimum {
            code: promotion.code.clone(),
            minimum: promotion.min_purchase_nuc,
            amount: amount_nuc,
        });
    }

    let discount = match promotion.discount {
        PriceAdjustment::Percentage(pct) => round_nuc(amount_nuc as f64 * pct / 100.0),
        PriceAdjustment::Fixed(value) => value,
    };

    Ok(discount.clamp(0, amount_nuc.max(0)))
}
