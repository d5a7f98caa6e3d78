use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skybook_shared::Masked;
use uuid::Uuid;

use crate::error::{BookingError, BookingResult, StoreError};
use crate::flight::CabinClass;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

string_enum!(BookingStatus {
    Pending => "PENDING",
    Confirmed => "CONFIRMED",
    Cancelled => "CANCELLED",
    Completed => "COMPLETED",
});

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Refunded,
}

string_enum!(PaymentStatus {
    Pending => "PENDING",
    Completed => "COMPLETED",
    Refunded => "REFUNDED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PassengerType {
    Adult,
    Child,
    Infant,
}

string_enum!(PassengerType {
    Adult => "ADULT",
    Child => "CHILD",
    Infant => "INFANT",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingPassenger {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub passenger_type: PassengerType,
    pub email: Option<Masked<String>>,
}

/// One flight leg of a booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingSegment {
    pub id: Uuid,
    pub flight_id: Uuid,
    pub cabin_class: CabinClass,
    pub departure_time: DateTime<Utc>,
    pub fare_nuc: i32,
}

/// Running money buckets of a booking.
///
/// The fields are private: every change goes through a named bucket operation
/// that moves `total` by the same delta, so
/// `total == base_fare + tax + service_fee + seat_selection_fees + extras_fees - discount`
/// holds after every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingTotals {
    base_fare_nuc: i32,
    tax_nuc: i32,
    service_fee_nuc: i32,
    seat_selection_fees_nuc: i32,
    extras_fees_nuc: i32,
    discount_nuc: i32,
    total_nuc: i32,
}

impl BookingTotals {
    pub fn new(base_fare_nuc: i32, tax_nuc: i32, service_fee_nuc: i32, discount_nuc: i32) -> Self {
        Self {
            base_fare_nuc,
            tax_nuc,
            service_fee_nuc,
            seat_selection_fees_nuc: 0,
            extras_fees_nuc: 0,
            discount_nuc,
            total_nuc: base_fare_nuc + tax_nuc + service_fee_nuc - discount_nuc,
        }
    }

    /// Rehydrate persisted buckets, rejecting rows that break the sum.
    pub fn from_parts(
        base_fare_nuc: i32,
        tax_nuc: i32,
        service_fee_nuc: i32,
        seat_selection_fees_nuc: i32,
        extras_fees_nuc: i32,
        discount_nuc: i32,
        total_nuc: i32,
    ) -> Result<Self, StoreError> {
        let totals = Self {
            base_fare_nuc,
            tax_nuc,
            service_fee_nuc,
            seat_selection_fees_nuc,
            extras_fees_nuc,
            discount_nuc,
            total_nuc,
        };
        if !totals.is_consistent() {
            return Err(StoreError::Corrupt(format!(
                "booking total {} does not match its components ({})",
                total_nuc,
                totals.component_sum()
            )));
        }
        Ok(totals)
    }

    pub fn add_seat_fee(&mut self, fee_nuc: i32) -> BookingResult<()> {
        let (bucket, total) = (
            in_range(self.seat_selection_fees_nuc.checked_add(fee_nuc))?,
            in_range(self.total_nuc.checked_add(fee_nuc))?,
        );
        self.seat_selection_fees_nuc = bucket;
        self.total_nuc = total;
        Ok(())
    }

    /// Follow with [`BookingTotals::cap_discount`] once the change is complete.
    pub fn remove_seat_fee(&mut self, fee_nuc: i32) -> BookingResult<()> {
        let (bucket, total) = (
            in_range(self.seat_selection_fees_nuc.checked_sub(fee_nuc))?,
            in_range(self.total_nuc.checked_sub(fee_nuc))?,
        );
        self.seat_selection_fees_nuc = bucket;
        self.total_nuc = total;
        Ok(())
    }

    pub fn add_extras_fee(&mut self, amount_nuc: i32) -> BookingResult<()> {
        let (bucket, total) = (
            in_range(self.extras_fees_nuc.checked_add(amount_nuc))?,
            in_range(self.total_nuc.checked_add(amount_nuc))?,
        );
        self.extras_fees_nuc = bucket;
        self.total_nuc = total;
        Ok(())
    }

    pub fn add_discount(&mut self, amount_nuc: i32) -> BookingResult<()> {
        let (bucket, total) = (
            in_range(self.discount_nuc.checked_add(amount_nuc))?,
            in_range(self.total_nuc.checked_sub(amount_nuc))?,
        );
        if total < 0 {
            return Err(BookingError::Validation(format!(
                "Discount of {} exceeds the booking total {}",
                amount_nuc, self.total_nuc
            )));
        }
        self.discount_nuc = bucket;
        self.total_nuc = total;
        Ok(())
    }

    /// Shrinks the discount until `total` is back at zero. Returns the amount
    /// taken off the discount.
    pub fn cap_discount(&mut self) -> i32 {
        if self.total_nuc >= 0 {
            return 0;
        }
        let trimmed = self.discount_nuc.min(self.total_nuc.checked_neg().unwrap_or(i32::MAX));
        self.discount_nuc -= trimmed;
        self.total_nuc += trimmed;
        trimmed
    }

    pub fn base_fare_nuc(&self) -> i32 {
        self.base_fare_nuc
    }

    pub fn tax_nuc(&self) -> i32 {
        self.tax_nuc
    }

    pub fn service_fee_nuc(&self) -> i32 {
        self.service_fee_nuc
    }

    pub fn seat_selection_fees_nuc(&self) -> i32 {
        self.seat_selection_fees_nuc
    }

    pub fn extras_fees_nuc(&self) -> i32 {
        self.extras_fees_nuc
    }

    pub fn discount_nuc(&self) -> i32 {
        self.discount_nuc
    }

    pub fn total_nuc(&self) -> i32 {
        self.total_nuc
    }

    pub fn component_sum(&self) -> i64 {
        i64::from(self.base_fare_nuc)
            + i64::from(self.tax_nuc)
            + i64::from(self.service_fee_nuc)
            + i64::from(self.seat_selection_fees_nuc)
            + i64::from(self.extras_fees_nuc)
            - i64::from(self.discount_nuc)
    }

    pub fn is_consistent(&self) -> bool {
        i64::from(self.total_nuc) == self.component_sum()
    }
}

fn in_range(value: Option<i32>) -> BookingResult<i32> {
    value.ok_or_else(|| BookingError::Validation("Booking amount is too large".to_string()))
}

/// The paying unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Booking {
    pub id: Uuid,
    pub reference: String,
    pub user_id: String,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub currency: String,
    pub totals: BookingTotals,
    pub expires_at: Option<DateTime<Utc>>,
    pub passengers: Vec<BookingPassenger>,
    pub segments: Vec<BookingSegment>,
    pub promotion_code: Option<String>,
    pub cancellation_reason: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

impl Booking {
    #[allow(clippy::too_many_arguments)]
    pub fn new_pending(
        reference: String,
        user_id: String,
        currency: String,
        totals: BookingTotals,
        passengers: Vec<BookingPassenger>,
        segments: Vec<BookingSegment>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            reference,
            user_id,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            currency,
            totals,
            expires_at: Some(expires_at),
            passengers,
            segments,
            promotion_code: None,
            cancellation_reason: None,
            version: 0,
            created_at: now,
            updated_at: now,
            updated_by: None,
        }
    }

    pub fn is_mutable(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn ensure_mutable(&self) -> BookingResult<()> {
        if !self.is_mutable() {
            return Err(BookingError::Conflict(format!(
                "Booking {} is {} and can no longer be changed",
                self.reference, self.status
            )));
        }
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn passenger(&self, passenger_id: Uuid) -> Option<&BookingPassenger> {
        self.passengers.iter().find(|p| p.id == passenger_id)
    }

    pub fn segment(&self, segment_id: Uuid) -> Option<&BookingSegment> {
        self.segments.iter().find(|s| s.id == segment_id)
    }

    pub fn flight_ids(&self) -> Vec<Uuid> {
        self.segments.iter().map(|s| s.flight_id).collect()
    }

    pub fn first_departure(&self) -> Option<DateTime<Utc>> {
        self.segments.iter().map(|s| s.departure_time).min()
    }

    /// State captured in history rows
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "status": self.status,
            "payment_status": self.payment_status,
            "totals": self.totals,
            "expires_at": self.expires_at,
            "promotion_code": self.promotion_code,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtraType {
    Baggage,
    Meal,
    Lounge,
    Insurance,
    PriorityBoarding,
    Other,
}

string_enum!(ExtraType {
    Baggage => "BAGGAGE",
    Meal => "MEAL",
    Lounge => "LOUNGE",
    Insurance => "INSURANCE",
    PriorityBoarding => "PRIORITY_BOARDING",
    Other => "OTHER",
});

/// Paid add-on attached to a booking. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingExtra {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub segment_id: Option<Uuid>,
    pub passenger_id: Option<Uuid>,
    pub amenity_id: Option<Uuid>,
    pub extra_type: ExtraType,
    pub description: String,
    pub unit_price_nuc: i32,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

/// Immutable audit row appended on every state change of a booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingHistory {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub action: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentKind {
    Charge,
    Refund,
}

string_enum!(PaymentKind {
    Charge => "CHARGE",
    Refund => "REFUND",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub kind: PaymentKind,
    pub amount_nuc: i32,
    pub method: String,
    pub transaction_reference: Option<Masked<String>>,
    pub created_at: DateTime<Utc>,
}
