use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use skybook_catalog::promotion::{evaluate_promotion, PromotionError};
use skybook_catalog::quote::{QuoteEngine, QuoteRequest, QuoteSegmentRequest};
use skybook_core::booking::{
    Booking, BookingExtra, BookingHistory, BookingPassenger, BookingSegment, BookingStatus,
    BookingTotals, ExtraType, PassengerType, PaymentKind, PaymentRecord, PaymentStatus,
};
use skybook_core::events::publish_all;
use skybook_core::seat::{FlightSeat, PassengerSeat};
use skybook_core::{
    BookingError, BookingResult, ChangeSet, EventPublisher, RequestContext, Store, StoreError,
};
use skybook_shared::events::{
    BookingCancelledEvent, BookingConfirmedEvent, ReleasedSeat, SeatSelectedEvent,
};
use skybook_shared::{DomainEvent, Masked};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::policy::CancellationPolicy;

const REFERENCE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const REFERENCE_LENGTH: usize = 6;
const REFERENCE_ATTEMPTS: u32 = 3;

/// Six characters, no 0/O or 1/I
pub fn generate_reference() -> String {
    let mut rng = rand::thread_rng();
    (0..REFERENCE_LENGTH)
        .map(|_| REFERENCE_ALPHABET[rng.gen_range(0..REFERENCE_ALPHABET.len())] as char)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingSettings {
    pub booking_hold_minutes: i64,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            booking_hold_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassengerInput {
    pub first_name: String,
    pub last_name: String,
    pub passenger_type: PassengerType,
    pub email: Option<Masked<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub segments: Vec<QuoteSegmentRequest>,
    pub passengers: Vec<PassengerInput>,
    pub promo_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddExtraRequest {
    pub extra_type: ExtraType,
    pub description: String,
    pub unit_price_nuc: i32,
    pub quantity: i32,
    pub passenger_id: Option<Uuid>,
    pub segment_id: Option<Uuid>,
    pub amenity_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount_nuc: i32,
    pub method: String,
    pub transaction_reference: Option<Masked<String>>,
}

/// Result of a seat selection: the new assignment and the booking after it
#[derive(Debug, Clone, Serialize)]
pub struct SeatSelection {
    pub passenger_seat: PassengerSeat,
    pub released_seat: Option<ReleasedSeat>,
    pub booking: Booking,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtraAdded {
    pub extra: BookingExtra,
    pub booking: Booking,
}

#[derive(Debug, Clone, Serialize)]
pub struct Cancellation {
    pub booking: Booking,
    pub refund_nuc: i32,
    pub released_seats: Vec<ReleasedSeat>,
}

/// Booking with its append-only children
#[derive(Debug, Clone, Serialize)]
pub struct BookingDetails {
    pub booking: Booking,
    pub seats: Vec<PassengerSeat>,
    pub extras: Vec<BookingExtra>,
    pub payments: Vec<PaymentRecord>,
}

/// Booking lifecycle and total accounting.
///
/// Every mutation loads the rows it needs, applies bucket operations on
/// `BookingTotals`, and commits all writes plus a history row as one change
/// set. Events go out only after the commit succeeded.
pub struct BookingService {
    store: Arc<dyn Store>,
    events: Arc<dyn EventPublisher>,
    quotes: Arc<QuoteEngine>,
    policy: CancellationPolicy,
    settings: BookingSettings,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn Store>,
        events: Arc<dyn EventPublisher>,
        quotes: Arc<QuoteEngine>,
        policy: CancellationPolicy,
        settings: BookingSettings,
    ) -> Self {
        Self {
            store,
            events,
            quotes,
            policy,
            settings,
        }
    }

    async fn load_owned(&self, ctx: &RequestContext, booking_id: Uuid) -> BookingResult<Booking> {
        let booking = self
            .store
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found("Booking", booking_id))?;

        if !ctx.can_act_for(&booking.user_id) {
            warn!("{} denied access to booking {}", ctx.user_id, booking.reference);
            return Err(BookingError::Forbidden(format!(
                "Booking {} belongs to another user",
                booking.reference
            )));
        }
        Ok(booking)
    }

    /// Mutable, and for a pending booking still inside its hold
    fn ensure_open(booking: &Booking, now: DateTime<Utc>) -> BookingResult<()> {
        booking.ensure_mutable()?;
        if booking.status == BookingStatus::Pending && booking.is_expired(now) {
            return Err(BookingError::Expired(format!(
                "Booking {} hold has expired",
                booking.reference
            )));
        }
        Ok(())
    }

    /// Insert a fresh booking, drawing a new reference when the store reports
    /// the current one as taken.
    async fn insert_new_booking<F>(
        &self,
        ctx: &RequestContext,
        booking: &mut Booking,
        mut next_reference: F,
    ) -> BookingResult<()>
    where
        F: FnMut() -> String,
    {
        let mut attempt = 1;
        loop {
            let mut changes = ChangeSet::new(ctx);
            changes.insert_booking(booking);
            changes.record_history(booking.id, "CREATED", None, Some(booking.snapshot()));
            match self.store.commit(changes).await {
                Ok(()) => return Ok(()),
                Err(StoreError::Conflict(reason)) if attempt < REFERENCE_ATTEMPTS => {
                    warn!(
                        "Booking reference {} rejected ({}), drawing another",
                        booking.reference, reason
                    );
                    booking.reference = next_reference();
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// A paid booking cannot grow past what has been charged for it.
    async fn ensure_paid_covers(&self, booking: &Booking) -> BookingResult<()> {
        if booking.payment_status != PaymentStatus::Completed {
            return Ok(());
        }
        let paid_nuc: i64 = self
            .store
            .list_payment_records(booking.id)
            .await?
            .iter()
            .map(|p| match p.kind {
                PaymentKind::Charge => i64::from(p.amount_nuc),
                PaymentKind::Refund => -i64::from(p.amount_nuc),
            })
            .sum();
        if i64::from(booking.totals.total_nuc()) > paid_nuc {
            return Err(BookingError::Conflict(format!(
                "Booking {} is paid; the change would raise its total to {} against {} paid",
                booking.reference,
                booking.totals.total_nuc(),
                paid_nuc
            )));
        }
        Ok(())
    }

    pub async fn create_booking(
        &self,
        ctx: &RequestContext,
        request: CreateBookingRequest,
    ) -> BookingResult<Booking> {
        if request.passengers.is_empty() {
            return Err(BookingError::Validation("At least one passenger is required".to_string()));
        }
        for passenger in &request.passengers {
            if passenger.first_name.trim().is_empty() || passenger.last_name.trim().is_empty() {
                return Err(BookingError::Validation("Passenger names are required".to_string()));
            }
        }

        let count = |kind: PassengerType| {
            request.passengers.iter().filter(|p| p.passenger_type == kind).count() as u32
        };
        let quote_request = QuoteRequest {
            segments: request.segments.clone(),
            adults: count(PassengerType::Adult),
            children: count(PassengerType::Child),
            infants: count(PassengerType::Infant),
            promo_code: request.promo_code.clone(),
        };
        let quote = self.quotes.quote(&quote_request, ctx.now).await?;

        let totals = BookingTotals::new(
            quote.base_fare_nuc,
            quote.tax_nuc,
            quote.service_fee_nuc,
            quote.discount_nuc,
        );

        let passengers = request
            .passengers
            .into_iter()
            .map(|p| BookingPassenger {
                id: Uuid::new_v4(),
                first_name: p.first_name.trim().to_string(),
                last_name: p.last_name.trim().to_string(),
                passenger_type: p.passenger_type,
                email: p.email,
            })
            .collect();

        let segments = quote
            .segments
            .iter()
            .map(|s| BookingSegment {
                id: Uuid::new_v4(),
                flight_id: s.flight_id,
                cabin_class: s.cabin_class,
                departure_time: s.departure_time,
                fare_nuc: s.base_fare_nuc,
            })
            .collect();

        let mut booking = Booking::new_pending(
            generate_reference(),
            ctx.user_id.clone(),
            quote.currency.clone(),
            totals,
            passengers,
            segments,
            ctx.now + Duration::minutes(self.settings.booking_hold_minutes),
            ctx.now,
        );
        booking.promotion_code = quote.promo_code.clone();

        self.insert_new_booking(ctx, &mut booking, generate_reference).await?;

        info!(
            "Booking {} created for {}: total {} {}",
            booking.reference,
            ctx.user_id,
            booking.totals.total_nuc(),
            booking.currency
        );
        Ok(booking)
    }

    pub async fn select_seat(
        &self,
        ctx: &RequestContext,
        booking_id: Uuid,
        passenger_id: Uuid,
        segment_id: Uuid,
        flight_seat_id: Uuid,
    ) -> BookingResult<SeatSelection> {
        let mut booking = self.load_owned(ctx, booking_id).await?;
        Self::ensure_open(&booking, ctx.now)?;

        let passenger = booking.passenger(passenger_id).ok_or_else(|| {
            BookingError::Validation(format!(
                "Passenger {} is not on booking {}",
                passenger_id, booking.reference
            ))
        })?;
        if passenger.passenger_type == PassengerType::Infant {
            return Err(BookingError::Validation(
                "Infants travel on an adult's lap and cannot hold a seat".to_string(),
            ));
        }
        let segment = booking.segment(segment_id).cloned().ok_or_else(|| {
            BookingError::Validation(format!(
                "Segment {} is not on booking {}",
                segment_id, booking.reference
            ))
        })?;

        let mut seat = self
            .store
            .get_flight_seat(flight_seat_id)
            .await?
            .ok_or_else(|| BookingError::not_found("Flight seat", flight_seat_id))?;

        if seat.flight_id != segment.flight_id {
            return Err(BookingError::Validation(format!(
                "Seat {} is not on the segment's flight",
                seat.seat_number
            )));
        }
        if seat.cabin_class != segment.cabin_class {
            return Err(BookingError::Validation(format!(
                "Seat {} is in {}, the segment is booked in {}",
                seat.seat_number, seat.cabin_class, segment.cabin_class
            )));
        }

        let existing = self.store.find_passenger_seat(passenger_id, segment_id).await?;
        if let Some(current) = &existing {
            if current.flight_seat_id == seat.id {
                return Ok(SeatSelection {
                    passenger_seat: current.clone(),
                    released_seat: None,
                    booking,
                });
            }
        }

        if !(seat.can_be_reserved() || seat.is_held_by(&booking.user_id, ctx.now)) {
            warn!(
                "Seat {} requested for booking {} is {}",
                seat.seat_number, booking.reference, seat.status
            );
            return Err(BookingError::Conflict(format!(
                "Seat {} is not available",
                seat.seat_number
            )));
        }

        let before = booking.snapshot();
        let mut changes = ChangeSet::new(ctx);

        let mut released_seat = None;
        if let Some(current) = existing {
            if let Some(mut old_seat) = self.store.get_flight_seat(current.flight_seat_id).await? {
                if old_seat.booking_id == Some(booking.id) {
                    old_seat.release();
                    changes.update_flight_seat(&mut old_seat);
                }
                released_seat = Some(ReleasedSeat {
                    flight_id: old_seat.flight_id,
                    flight_seat_id: old_seat.id,
                    seat_number: old_seat.seat_number.clone(),
                });
            }
            booking.totals.remove_seat_fee(current.fee_nuc)?;
            changes.delete_passenger_seat(current.id);
        }

        seat.assign_to_booking(booking.id, &booking.user_id);
        changes.update_flight_seat(&mut seat);

        let passenger_seat = PassengerSeat::new(booking.id, passenger_id, segment_id, &seat, ctx.now);
        booking.totals.add_seat_fee(passenger_seat.fee_nuc)?;
        let discount_trimmed_nuc = booking.totals.cap_discount();
        if discount_trimmed_nuc > 0 {
            info!(
                "Discount on booking {} reduced by {} to keep the total at zero",
                booking.reference, discount_trimmed_nuc
            );
        }
        self.ensure_paid_covers(&booking).await?;
        changes.insert_passenger_seat(passenger_seat.clone());

        changes.update_booking(&mut booking);
        changes.record_history(
            booking.id,
            "SEAT_SELECTED",
            Some(before),
            Some(serde_json::json!({
                "passenger_id": passenger_id,
                "segment_id": segment_id,
                "seat_number": seat.seat_number,
                "released_seat": released_seat.as_ref().map(|s| s.seat_number.clone()),
                "discount_trimmed_nuc": discount_trimmed_nuc,
                "totals": booking.totals,
            })),
        );
        self.store.commit(changes).await?;

        info!(
            "Seat {} assigned to passenger {} on booking {}, total now {}",
            seat.seat_number,
            passenger_id,
            booking.reference,
            booking.totals.total_nuc()
        );

        let event = DomainEvent::SeatSelected(SeatSelectedEvent {
            booking_id: booking.id,
            flight_id: seat.flight_id,
            passenger_id,
            flight_seat_id: seat.id,
            seat_number: seat.seat_number.clone(),
            released_seat: released_seat.clone(),
            timestamp: ctx.now.timestamp(),
        });
        publish_all(self.events.as_ref(), &[event]).await;

        Ok(SeatSelection {
            passenger_seat,
            released_seat,
            booking,
        })
    }

    pub async fn add_extra(
        &self,
        ctx: &RequestContext,
        booking_id: Uuid,
        request: AddExtraRequest,
    ) -> BookingResult<ExtraAdded> {
        let mut booking = self.load_owned(ctx, booking_id).await?;
        Self::ensure_open(&booking, ctx.now)?;

        if request.unit_price_nuc < 0 {
            return Err(BookingError::Validation("Unit price cannot be negative".to_string()));
        }
        if request.quantity < 1 {
            return Err(BookingError::Validation("Quantity must be at least 1".to_string()));
        }
        if let Some(passenger_id) = request.passenger_id {
            if booking.passenger(passenger_id).is_none() {
                return Err(BookingError::Validation(format!(
                    "Passenger {} is not on booking {}",
                    passenger_id, booking.reference
                )));
            }
        }
        if let Some(segment_id) = request.segment_id {
            if booking.segment(segment_id).is_none() {
                return Err(BookingError::Validation(format!(
                    "Segment {} is not on booking {}",
                    segment_id, booking.reference
                )));
            }
        }
        let amount_nuc = request
            .unit_price_nuc
            .checked_mul(request.quantity)
            .ok_or_else(|| BookingError::Validation("Extra amount is too large".to_string()))?;

        let description = if request.description.trim().is_empty() {
            request.extra_type.to_string()
        } else {
            request.description.trim().to_string()
        };

        let extra = BookingExtra {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            segment_id: request.segment_id,
            passenger_id: request.passenger_id,
            amenity_id: request.amenity_id,
            extra_type: request.extra_type,
            description,
            unit_price_nuc: request.unit_price_nuc,
            quantity: request.quantity,
            created_at: ctx.now,
        };

        let before = booking.snapshot();
        booking.totals.add_extras_fee(amount_nuc)?;
        self.ensure_paid_covers(&booking).await?;

        let mut changes = ChangeSet::new(ctx);
        changes.insert_extra(extra.clone());
        changes.update_booking(&mut booking);
        changes.record_history(
            booking.id,
            "EXTRA_ADDED",
            Some(before),
            Some(serde_json::json!({
                "extra_type": extra.extra_type,
                "quantity": extra.quantity,
                "amount_nuc": amount_nuc,
                "totals": booking.totals,
            })),
        );
        self.store.commit(changes).await?;

        info!(
            "Extra {} x{} added to booking {}, total now {}",
            extra.extra_type,
            extra.quantity,
            booking.reference,
            booking.totals.total_nuc()
        );
        Ok(ExtraAdded { extra, booking })
    }

    /// Discount only pending bookings; a paid amount is never re-priced.
    pub async fn apply_promotion(
        &self,
        ctx: &RequestContext,
        booking_id: Uuid,
        code: &str,
    ) -> BookingResult<Booking> {
        let mut booking = self.load_owned(ctx, booking_id).await?;
        Self::ensure_open(&booking, ctx.now)?;

        if booking.status != BookingStatus::Pending {
            return Err(BookingError::Conflict(format!(
                "Promotions can only be applied to pending bookings, {} is {}",
                booking.reference, booking.status
            )));
        }
        if let Some(existing) = &booking.promotion_code {
            return Err(BookingError::Conflict(format!(
                "Booking {} already carries promotion {}",
                booking.reference, existing
            )));
        }

        let code = code.trim();
        let mut promotion = self
            .store
            .find_promotion_by_code(code)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("Promotion code {} not found", code)))?;

        let discount_nuc = evaluate_promotion(&promotion, booking.totals.total_nuc(), ctx.now)
            .map_err(|e| match e {
                PromotionError::Ended(_) => BookingError::Expired(e.to_string()),
                PromotionError::Exhausted(_) => BookingError::Conflict(e.to_string()),
                _ => BookingError::Validation(e.to_string()),
            })?;

        let before = booking.snapshot();
        booking.totals.add_discount(discount_nuc)?;
        booking.promotion_code = Some(promotion.code.clone());
        promotion.used_count += 1;

        let mut changes = ChangeSet::new(ctx);
        changes.update_promotion(&mut promotion);
        changes.update_booking(&mut booking);
        changes.record_history(booking.id, "PROMOTION_APPLIED", Some(before), Some(booking.snapshot()));
        self.store.commit(changes).await?;

        info!(
            "Promotion {} took {} off booking {}",
            promotion.code, discount_nuc, booking.reference
        );
        Ok(booking)
    }

    pub async fn confirm_booking(
        &self,
        ctx: &RequestContext,
        booking_id: Uuid,
        payment: PaymentRequest,
    ) -> BookingResult<Booking> {
        let mut booking = self.load_owned(ctx, booking_id).await?;

        if booking.status != BookingStatus::Pending {
            return Err(BookingError::Conflict(format!(
                "Booking {} is {}; only pending bookings can be confirmed",
                booking.reference, booking.status
            )));
        }
        if booking.is_expired(ctx.now) {
            warn!("Confirm refused for expired booking {}", booking.reference);
            return Err(BookingError::Expired(format!(
                "Booking {} hold has expired",
                booking.reference
            )));
        }
        if payment.method.trim().is_empty() {
            return Err(BookingError::Validation("Payment method is required".to_string()));
        }
        let total_nuc = booking.totals.total_nuc();
        if payment.amount_nuc < total_nuc {
            warn!(
                "Payment of {} for booking {} is short of total {}",
                payment.amount_nuc, booking.reference, total_nuc
            );
            return Err(BookingError::Validation(format!(
                "Payment amount {} does not match booking total {}",
                payment.amount_nuc, total_nuc
            )));
        }

        let before = booking.snapshot();
        booking.status = BookingStatus::Confirmed;
        booking.payment_status = PaymentStatus::Completed;
        booking.expires_at = None;

        let mut changes = ChangeSet::new(ctx);
        changes.insert_payment(PaymentRecord {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            kind: PaymentKind::Charge,
            amount_nuc: payment.amount_nuc,
            method: payment.method.trim().to_string(),
            transaction_reference: payment.transaction_reference,
            created_at: ctx.now,
        });
        changes.update_booking(&mut booking);
        changes.record_history(booking.id, "CONFIRMED", Some(before), Some(booking.snapshot()));
        self.store.commit(changes).await?;

        info!("Booking {} confirmed, paid {}", booking.reference, payment.amount_nuc);

        let event = DomainEvent::BookingConfirmed(BookingConfirmedEvent {
            booking_id: booking.id,
            reference: booking.reference.clone(),
            user_id: booking.user_id.clone(),
            total_nuc,
            currency: booking.currency.clone(),
            flight_ids: booking.flight_ids(),
            timestamp: ctx.now.timestamp(),
        });
        publish_all(self.events.as_ref(), &[event]).await;

        Ok(booking)
    }

    pub async fn cancel_booking(
        &self,
        ctx: &RequestContext,
        booking_id: Uuid,
        reason: Option<String>,
    ) -> BookingResult<Cancellation> {
        let booking = self.load_owned(ctx, booking_id).await?;
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "cancelled by customer".to_string());
        self.cancel_loaded(ctx, booking, &reason).await
    }

    /// Shared by customer cancellation and the expiry sweep
    pub(crate) async fn cancel_loaded(
        &self,
        ctx: &RequestContext,
        mut booking: Booking,
        reason: &str,
    ) -> BookingResult<Cancellation> {
        booking.ensure_mutable()?;

        let before = booking.snapshot();
        let mut changes = ChangeSet::new(ctx);
        let mut released_seats = Vec::new();

        for assignment in self.store.list_passenger_seats(booking.id).await? {
            if let Some(mut seat) = self.store.get_flight_seat(assignment.flight_seat_id).await? {
                if seat.booking_id == Some(booking.id) {
                    released_seats.push(released(&seat));
                    seat.release();
                    changes.update_flight_seat(&mut seat);
                }
            }
            changes.delete_passenger_seat(assignment.id);
        }

        let mut refund_nuc = 0;
        if booking.payment_status == PaymentStatus::Completed {
            let paid_nuc: i32 = self
                .store
                .list_payment_records(booking.id)
                .await?
                .iter()
                .map(|p| match p.kind {
                    PaymentKind::Charge => p.amount_nuc,
                    PaymentKind::Refund => -p.amount_nuc,
                })
                .sum();
            refund_nuc = self.policy.refund_for(paid_nuc, booking.first_departure(), ctx.now);
            if refund_nuc > 0 {
                changes.insert_payment(PaymentRecord {
                    id: Uuid::new_v4(),
                    booking_id: booking.id,
                    kind: PaymentKind::Refund,
                    amount_nuc: refund_nuc,
                    method: "ORIGINAL_PAYMENT".to_string(),
                    transaction_reference: None,
                    created_at: ctx.now,
                });
                booking.payment_status = PaymentStatus::Refunded;
            }
        }

        booking.status = BookingStatus::Cancelled;
        booking.cancellation_reason = Some(reason.to_string());
        booking.expires_at = None;

        changes.update_booking(&mut booking);
        changes.record_history(booking.id, "CANCELLED", Some(before), Some(booking.snapshot()));
        self.store.commit(changes).await?;

        info!(
            "Booking {} cancelled by {} ({}), refund {}, {} seats released",
            booking.reference,
            ctx.user_id,
            reason,
            refund_nuc,
            released_seats.len()
        );

        let event = DomainEvent::BookingCancelled(BookingCancelledEvent {
            booking_id: booking.id,
            reference: booking.reference.clone(),
            reason: reason.to_string(),
            refund_nuc,
            released_seats: released_seats.clone(),
            timestamp: ctx.now.timestamp(),
        });
        publish_all(self.events.as_ref(), &[event]).await;

        Ok(Cancellation {
            booking,
            refund_nuc,
            released_seats,
        })
    }

    /// Staff close-out of a flown booking
    pub async fn complete_booking(&self, ctx: &RequestContext, booking_id: Uuid) -> BookingResult<Booking> {
        if !ctx.is_privileged() {
            return Err(BookingError::Forbidden("Only staff can complete bookings".to_string()));
        }
        let mut booking = self.load_owned(ctx, booking_id).await?;

        if booking.status != BookingStatus::Confirmed {
            return Err(BookingError::Conflict(format!(
                "Booking {} is {}; only confirmed bookings can be completed",
                booking.reference, booking.status
            )));
        }
        for segment in &booking.segments {
            let departed = match self.store.get_flight(segment.flight_id).await? {
                Some(flight) => flight.has_departed(ctx.now),
                None => segment.departure_time <= ctx.now,
            };
            if !departed {
                return Err(BookingError::Conflict(format!(
                    "Flight {} of booking {} has not departed yet",
                    segment.flight_id, booking.reference
                )));
            }
        }

        let before = booking.snapshot();
        booking.status = BookingStatus::Completed;

        let mut changes = ChangeSet::new(ctx);
        changes.update_booking(&mut booking);
        changes.record_history(booking.id, "COMPLETED", Some(before), Some(booking.snapshot()));
        self.store.commit(changes).await?;

        info!("Booking {} completed by {}", booking.reference, ctx.user_id);
        Ok(booking)
    }

    pub async fn get_booking(&self, ctx: &RequestContext, booking_id: Uuid) -> BookingResult<BookingDetails> {
        let booking = self.load_owned(ctx, booking_id).await?;
        let seats = self.store.list_passenger_seats(booking.id).await?;
        let extras = self.store.list_booking_extras(booking.id).await?;
        let payments = self.store.list_payment_records(booking.id).await?;

        Ok(BookingDetails {
            booking,
            seats,
            extras,
            payments,
        })
    }

    pub async fn get_history(
        &self,
        ctx: &RequestContext,
        booking_id: Uuid,
    ) -> BookingResult<Vec<BookingHistory>> {
        let booking = self.load_owned(ctx, booking_id).await?;
        Ok(self.store.list_booking_history(booking.id).await?)
    }

    pub async fn list_my_bookings(&self, ctx: &RequestContext) -> BookingResult<Vec<Booking>> {
        Ok(self.store.list_bookings_for_user(&ctx.user_id).await?)
    }
}

fn released(seat: &FlightSeat) -> ReleasedSeat {
    ReleasedSeat {
        flight_id: seat.flight_id,
        flight_seat_id: seat.id,
        seat_number: seat.seat_number.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{admin, customer, harness, promotion, Harness};
    use skybook_core::fare::PriceAdjustment;
    use skybook_core::repository::{BookingRepository, FareRepository, SeatRepository};
    use skybook_core::seat::SeatStatus;

    fn extra(unit_price_nuc: i32, quantity: i32) -> AddExtraRequest {
        AddExtraRequest {
            extra_type: ExtraType::Baggage,
            description: "Checked bag".to_string(),
            unit_price_nuc,
            quantity,
            passenger_id: None,
            segment_id: None,
            amenity_id: None,
        }
    }

    fn payment(amount_nuc: i32) -> PaymentRequest {
        PaymentRequest {
            amount_nuc,
            method: "CARD".to_string(),
            transaction_reference: Some(Masked::new("txn_123".to_string())),
        }
    }

    async fn assert_consistent(h: &Harness, booking_id: Uuid) {
        let stored = h.store.get_booking(booking_id).await.unwrap().unwrap();
        assert!(stored.totals.is_consistent());
        assert!(h.store.inconsistent_bookings().is_empty());
    }

    #[test]
    fn test_reference_shape() {
        let reference = generate_reference();
        assert_eq!(reference.len(), 6);
        assert!(reference.bytes().all(|b| REFERENCE_ALPHABET.contains(&b)));
    }

    #[tokio::test]
    async fn test_create_booking_totals() {
        let h = harness();
        let ctx = customer("user-a");
        let booking = h.pending_booking(&ctx).await;

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.totals.base_fare_nuc(), 50000);
        assert_eq!(booking.totals.tax_nuc(), 5000);
        assert_eq!(booking.totals.service_fee_nuc(), 1000);
        assert_eq!(booking.totals.total_nuc(), 56000);
        assert_eq!(booking.expires_at, Some(ctx.now + Duration::minutes(30)));
        assert_eq!(booking.reference.len(), 6);

        let history = h.bookings.get_history(&ctx, booking.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, "CREATED");
    }

    #[tokio::test]
    async fn test_confirm_exact_total_then_short_payment() {
        let h = harness();
        let ctx = customer("user-a");

        let short = h.pending_booking(&ctx).await;
        let err = h.bookings.confirm_booking(&ctx, short.id, payment(55900)).await.unwrap_err();
        match err {
            BookingError::Validation(msg) => assert!(msg.contains("does not match booking total")),
            other => panic!("unexpected error {:?}", other),
        }
        let unchanged = h.store.get_booking(short.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, BookingStatus::Pending);

        let confirmed = h.bookings.confirm_booking(&ctx, short.id, payment(56000)).await.unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(confirmed.payment_status, PaymentStatus::Completed);
        assert!(confirmed.expires_at.is_none());

        let payments = h.store.list_payment_records(short.id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].kind, PaymentKind::Charge);
        assert!(h.events.events().iter().any(|e| matches!(e, DomainEvent::BookingConfirmed(_))));

        // Second confirm is a state conflict
        let err = h.bookings.confirm_booking(&ctx, short.id, payment(56000)).await.unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_confirm_after_hold_expired() {
        let h = harness();
        let ctx = customer("user-a");
        let booking = h.pending_booking(&ctx).await;

        let later = RequestContext::new("user-a", ctx.role, ctx.now + Duration::minutes(31));
        let err = h.bookings.confirm_booking(&later, booking.id, payment(1_000_000)).await.unwrap_err();
        assert!(matches!(err, BookingError::Expired(_)));
    }

    #[tokio::test]
    async fn test_reselecting_seat_moves_fee_and_frees_old_seat() {
        let h = harness();
        let ctx = customer("user-a");
        let booking = h.pending_booking(&ctx).await;
        let passenger_id = booking.passengers[0].id;
        let segment_id = booking.segments[0].id;
        let seat_12a = h.flight_seat("12A");
        let seat_14c = h.flight_seat("14C");

        let first = h
            .bookings
            .select_seat(&ctx, booking.id, passenger_id, segment_id, seat_12a)
            .await
            .unwrap();
        assert_eq!(first.booking.totals.seat_selection_fees_nuc(), 2000);
        assert_eq!(first.booking.totals.total_nuc(), 58000);

        let second = h
            .bookings
            .select_seat(&ctx, booking.id, passenger_id, segment_id, seat_14c)
            .await
            .unwrap();
        assert_eq!(second.booking.totals.seat_selection_fees_nuc(), 3500);
        assert_eq!(second.booking.totals.total_nuc(), first.booking.totals.total_nuc() + 1500);
        assert_eq!(second.released_seat.as_ref().map(|s| s.seat_number.as_str()), Some("12A"));

        let old = h.store.get_flight_seat(seat_12a).await.unwrap().unwrap();
        assert_eq!(old.status, SeatStatus::Available);
        assert!(old.booking_id.is_none());

        let new = h.store.get_flight_seat(seat_14c).await.unwrap().unwrap();
        assert_eq!(new.status, SeatStatus::Reserved);
        assert_eq!(new.booking_id, Some(booking.id));
        assert!(new.lock_expires_at.is_none());

        let assignments = h.store.list_passenger_seats(booking.id).await.unwrap();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].flight_seat_id, seat_14c);
        assert_eq!(assignments[0].seat_number, "14C");

        assert_consistent(&h, booking.id).await;
    }

    #[tokio::test]
    async fn test_select_seat_held_by_another_user() {
        let h = harness();
        let ctx = customer("user-a");
        let booking = h.pending_booking(&ctx).await;

        h.seats
            .reserve_seat(&customer("user-b"), h.flight_id(), h.aircraft_seat("12A"), 10)
            .await
            .unwrap();

        let err = h
            .bookings
            .select_seat(&ctx, booking.id, booking.passengers[0].id, booking.segments[0].id, h.flight_seat("12A"))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_select_seat_own_lock_is_bound() {
        let h = harness();
        let ctx = customer("user-a");
        let booking = h.pending_booking(&ctx).await;

        h.seats.reserve_seat(&ctx, h.flight_id(), h.aircraft_seat("12A"), 10).await.unwrap();
        h.bookings
            .select_seat(&ctx, booking.id, booking.passengers[0].id, booking.segments[0].id, h.flight_seat("12A"))
            .await
            .unwrap();

        let seat = h.store.get_flight_seat(h.flight_seat("12A")).await.unwrap().unwrap();
        assert_eq!(seat.booking_id, Some(booking.id));
        assert!(seat.lock_expires_at.is_none());
    }

    #[tokio::test]
    async fn test_select_seat_ownership_and_membership() {
        let h = harness();
        let ctx = customer("user-a");
        let booking = h.pending_booking(&ctx).await;
        let seat = h.flight_seat("12A");

        let err = h
            .bookings
            .select_seat(&customer("user-b"), booking.id, booking.passengers[0].id, booking.segments[0].id, seat)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Forbidden(_)));

        let err = h
            .bookings
            .select_seat(&ctx, booking.id, Uuid::new_v4(), booking.segments[0].id, seat)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));

        // Staff may act on any booking
        h.bookings
            .select_seat(&admin(), booking.id, booking.passengers[0].id, booking.segments[0].id, seat)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_add_extra_updates_total() {
        let h = harness();
        let ctx = customer("user-a");
        let booking = h.pending_booking(&ctx).await;

        let added = h.bookings.add_extra(&ctx, booking.id, extra(2250, 2)).await.unwrap();
        assert_eq!(added.booking.totals.extras_fees_nuc(), 4500);
        assert_eq!(added.booking.totals.total_nuc(), 60500);

        for bad in [extra(-1, 1), extra(100, 0)] {
            let err = h.bookings.add_extra(&ctx, booking.id, bad).await.unwrap_err();
            assert!(matches!(err, BookingError::Validation(_)));
        }

        let extras = h.store.list_booking_extras(booking.id).await.unwrap();
        assert_eq!(extras.len(), 1);
        assert_consistent(&h, booking.id).await;
    }

    #[tokio::test]
    async fn test_apply_promotion_once() {
        let h = harness();
        let ctx = customer("user-a");
        h.store.seed_promotion(promotion("SPRING", PriceAdjustment::Percentage(10.0)));
        let booking = h.pending_booking(&ctx).await;

        let discounted = h.bookings.apply_promotion(&ctx, booking.id, "spring").await.unwrap();
        assert_eq!(discounted.totals.discount_nuc(), 5600);
        assert_eq!(discounted.totals.total_nuc(), 50400);
        assert_eq!(discounted.promotion_code.as_deref(), Some("SPRING"));

        let err = h.bookings.apply_promotion(&ctx, booking.id, "SPRING").await.unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));

        let promo = h.store.find_promotion_by_code("SPRING").await.unwrap().unwrap();
        assert_eq!(promo.used_count, 1);
        assert_consistent(&h, booking.id).await;
    }

    #[tokio::test]
    async fn test_fixed_promotion_never_makes_total_negative() {
        let h = harness();
        let ctx = customer("user-a");
        h.store.seed_promotion(promotion("HUGE", PriceAdjustment::Fixed(1_000_000)));
        let booking = h.pending_booking(&ctx).await;

        let discounted = h.bookings.apply_promotion(&ctx, booking.id, "HUGE").await.unwrap();
        assert_eq!(discounted.totals.total_nuc(), 0);
        assert!(discounted.totals.is_consistent());
    }

    #[tokio::test]
    async fn test_overflowing_extra_is_rejected() {
        let h = harness();
        let ctx = customer("user-a");
        let booking = h.pending_booking(&ctx).await;

        let err = h.bookings.add_extra(&ctx, booking.id, extra(i32::MAX, 1)).await.unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));

        let stored = h.store.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.totals.total_nuc(), 56000);
        assert!(h.store.list_booking_extras(booking.id).await.unwrap().is_empty());

        let err = h.bookings.confirm_booking(&ctx, booking.id, payment(0)).await.unwrap_err();
        assert!(matches!(err, BookingError::Validation(_)));
        assert_consistent(&h, booking.id).await;
    }

    #[tokio::test]
    async fn test_cheaper_seat_after_full_discount_keeps_total_at_zero() {
        let h = harness();
        let ctx = customer("user-a");
        h.store.seed_promotion(promotion("HUGE", PriceAdjustment::Fixed(1_000_000)));
        let booking = h.pending_booking(&ctx).await;
        let (passenger_id, segment_id) = (booking.passengers[0].id, booking.segments[0].id);

        h.bookings
            .select_seat(&ctx, booking.id, passenger_id, segment_id, h.flight_seat("14C"))
            .await
            .unwrap();
        let discounted = h.bookings.apply_promotion(&ctx, booking.id, "HUGE").await.unwrap();
        assert_eq!(discounted.totals.total_nuc(), 0);
        assert_eq!(discounted.totals.discount_nuc(), 59500);

        let reselected = h
            .bookings
            .select_seat(&ctx, booking.id, passenger_id, segment_id, h.flight_seat("15A"))
            .await
            .unwrap();
        assert_eq!(reselected.booking.totals.total_nuc(), 0);
        assert_eq!(reselected.booking.totals.seat_selection_fees_nuc(), 1500);
        assert_eq!(reselected.booking.totals.discount_nuc(), 57500);

        let history = h.bookings.get_history(&ctx, booking.id).await.unwrap();
        let last_selection = history.iter().rev().find(|row| row.action == "SEAT_SELECTED").unwrap();
        let new_value = last_selection.new_value.as_ref().unwrap();
        assert_eq!(new_value["discount_trimmed_nuc"], 2000);
        assert_consistent(&h, booking.id).await;
    }

    #[tokio::test]
    async fn test_paid_booking_cannot_grow_past_amount_charged() {
        let h = harness();
        let ctx = customer("user-a");
        let booking = h.pending_booking(&ctx).await;
        let (passenger_id, segment_id) = (booking.passengers[0].id, booking.segments[0].id);
        h.bookings
            .select_seat(&ctx, booking.id, passenger_id, segment_id, h.flight_seat("15A"))
            .await
            .unwrap();
        h.bookings.confirm_booking(&ctx, booking.id, payment(57500)).await.unwrap();

        // Same fee, nothing left to pay
        let swapped = h
            .bookings
            .select_seat(&ctx, booking.id, passenger_id, segment_id, h.flight_seat("15B"))
            .await
            .unwrap();
        assert_eq!(swapped.booking.totals.total_nuc(), 57500);
        assert_eq!(swapped.booking.payment_status, PaymentStatus::Completed);

        let err = h
            .bookings
            .select_seat(&ctx, booking.id, passenger_id, segment_id, h.flight_seat("14C"))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));
        let seat_14c = h.store.get_flight_seat(h.flight_seat("14C")).await.unwrap().unwrap();
        assert_eq!(seat_14c.status, SeatStatus::Available);

        let err = h.bookings.add_extra(&ctx, booking.id, extra(100, 1)).await.unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));

        let stored = h.store.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.totals.total_nuc(), 57500);
        assert_consistent(&h, booking.id).await;
    }

    #[tokio::test]
    async fn test_taken_reference_is_redrawn() {
        let h = harness();
        let ctx = customer("user-a");
        let existing = h.pending_booking(&ctx).await;
        let fresh = |reference: &str| {
            Booking::new_pending(
                reference.to_string(),
                "user-a".to_string(),
                "USD".to_string(),
                BookingTotals::new(50000, 5000, 1000, 0),
                vec![],
                vec![],
                ctx.now + Duration::minutes(30),
                ctx.now,
            )
        };

        let mut second = fresh(&existing.reference);
        h.bookings
            .insert_new_booking(&ctx, &mut second, || "ZZZ999".to_string())
            .await
            .unwrap();
        assert_eq!(second.reference, "ZZZ999");
        assert!(h.store.get_booking(second.id).await.unwrap().is_some());

        let mut third = fresh("ZZZ999");
        let err = h
            .bookings
            .insert_new_booking(&ctx, &mut third, || "ZZZ999".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));
        assert!(h.store.get_booking(third.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancel_paid_booking_refunds_and_frees_seats() {
        let h = harness();
        let ctx = customer("user-a");
        let booking = h.pending_booking(&ctx).await;
        let seat = h.flight_seat("12A");
        h.bookings
            .select_seat(&ctx, booking.id, booking.passengers[0].id, booking.segments[0].id, seat)
            .await
            .unwrap();
        let confirmed = h.bookings.confirm_booking(&ctx, booking.id, payment(58000)).await.unwrap();

        let outcome = h
            .bookings
            .cancel_booking(&ctx, booking.id, Some("change of plans".to_string()))
            .await
            .unwrap();

        // Departure is 30 days out: full refund less the fee
        assert_eq!(outcome.refund_nuc, 58000 - 2500);
        assert_eq!(outcome.booking.status, BookingStatus::Cancelled);
        assert_eq!(outcome.booking.payment_status, PaymentStatus::Refunded);
        assert_eq!(outcome.booking.totals, confirmed.totals);
        assert_eq!(outcome.released_seats.len(), 1);

        let freed = h.store.get_flight_seat(seat).await.unwrap().unwrap();
        assert_eq!(freed.status, SeatStatus::Available);
        assert!(h.store.list_passenger_seats(booking.id).await.unwrap().is_empty());

        let err = h.bookings.cancel_booking(&ctx, booking.id, None).await.unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_complete_requires_departure_and_staff() {
        let h = harness();
        let ctx = customer("user-a");
        let booking = h.pending_booking(&ctx).await;
        h.bookings.confirm_booking(&ctx, booking.id, payment(56000)).await.unwrap();

        let err = h.bookings.complete_booking(&ctx, booking.id).await.unwrap_err();
        assert!(matches!(err, BookingError::Forbidden(_)));

        let err = h.bookings.complete_booking(&admin(), booking.id).await.unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));

        let after_flight = RequestContext::system(Utc::now() + Duration::days(31));
        let completed = h.bookings.complete_booking(&after_flight, booking.id).await.unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);

        let err = h.bookings.add_extra(&ctx, booking.id, extra(100, 1)).await.unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_list_my_bookings_only_returns_callers() {
        let h = harness();
        let a = customer("user-a");
        h.pending_booking(&a).await;
        h.pending_booking(&a).await;
        h.pending_booking(&customer("user-b")).await;

        assert_eq!(h.bookings.list_my_bookings(&a).await.unwrap().len(), 2);
        let other = h.bookings.list_my_bookings(&customer("user-c")).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_booking_reads_are_side_effect_free() {
        let h = harness();
        let ctx = customer("user-a");
        let booking = h.pending_booking(&ctx).await;

        let first = h.bookings.get_booking(&ctx, booking.id).await.unwrap();
        let second = h.bookings.get_booking(&ctx, booking.id).await.unwrap();
        assert_eq!(first.booking, second.booking);
        assert_eq!(h.bookings.get_history(&ctx, booking.id).await.unwrap().len(), 1);

        let err = h.bookings.get_booking(&customer("user-b"), booking.id).await.unwrap_err();
        assert!(matches!(err, BookingError::Forbidden(_)));
    }
}
