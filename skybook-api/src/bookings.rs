use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use skybook_booking::bookings::{
    AddExtraRequest, BookingDetails, Cancellation, CreateBookingRequest, ExtraAdded, PaymentRequest,
    SeatSelection,
};
use skybook_core::booking::{Booking, BookingHistory};
use skybook_core::RequestContext;
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SelectSeatRequest {
    pub passenger_id: Uuid,
    pub segment_id: Uuid,
    pub flight_seat_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ApplyPromotionRequest {
    pub code: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelBookingRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /v1/bookings
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<CreateBookingRequest>,
) -> ApiResult<Booking> {
    let result = state.bookings.create_booking(&ctx, req).await;
    state.metrics.booking_op("create", &result);

    let booking = result?;
    Ok(ApiResponse::ok(format!("Booking {} created", booking.reference), booking))
}

/// GET /v1/bookings
pub async fn list_my_bookings(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> ApiResult<Vec<Booking>> {
    let bookings = state.bookings.list_my_bookings(&ctx).await?;
    Ok(ApiResponse::ok(format!("{} bookings", bookings.len()), bookings))
}

/// GET /v1/bookings/{id}
pub async fn get_booking(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(booking_id): Path<Uuid>,
) -> ApiResult<BookingDetails> {
    let details = state.bookings.get_booking(&ctx, booking_id).await?;
    Ok(ApiResponse::ok("Booking retrieved", details))
}

/// GET /v1/bookings/{id}/history
pub async fn get_booking_history(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(booking_id): Path<Uuid>,
) -> ApiResult<Vec<BookingHistory>> {
    let history = state.bookings.get_history(&ctx, booking_id).await?;
    Ok(ApiResponse::ok(format!("{} history entries", history.len()), history))
}

/// POST /v1/bookings/{id}/seats
pub async fn select_seat(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<SelectSeatRequest>,
) -> ApiResult<SeatSelection> {
    let result = state
        .bookings
        .select_seat(&ctx, booking_id, req.passenger_id, req.segment_id, req.flight_seat_id)
        .await;
    state.metrics.seat_op("select", &result);

    let selection = result?;
    Ok(ApiResponse::ok(
        format!("Seat {} selected", selection.passenger_seat.seat_number),
        selection,
    ))
}

/// POST /v1/bookings/{id}/extras
pub async fn add_extra(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<AddExtraRequest>,
) -> ApiResult<ExtraAdded> {
    let result = state.bookings.add_extra(&ctx, booking_id, req).await;
    state.metrics.booking_op("add_extra", &result);

    Ok(ApiResponse::ok("Extra added", result?))
}

/// POST /v1/bookings/{id}/promotion
pub async fn apply_promotion(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<ApplyPromotionRequest>,
) -> ApiResult<Booking> {
    let result = state.bookings.apply_promotion(&ctx, booking_id, &req.code).await;
    state.metrics.booking_op("apply_promotion", &result);

    Ok(ApiResponse::ok("Promotion applied", result?))
}

/// POST /v1/bookings/{id}/confirm
pub async fn confirm_booking(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<PaymentRequest>,
) -> ApiResult<Booking> {
    let result = state.bookings.confirm_booking(&ctx, booking_id, req).await;
    state.metrics.booking_op("confirm", &result);

    let booking = result?;
    info!("Booking {} confirmed via API", booking.reference);
    Ok(ApiResponse::ok(format!("Booking {} confirmed", booking.reference), booking))
}

/// POST /v1/bookings/{id}/cancel
pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<CancelBookingRequest>,
) -> ApiResult<Cancellation> {
    let result = state.bookings.cancel_booking(&ctx, booking_id, req.reason).await;
    state.metrics.booking_op("cancel", &result);

    let outcome = result?;
    Ok(ApiResponse::ok(
        format!("Booking {} cancelled", outcome.booking.reference),
        outcome,
    ))
}
