use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use skybook_booking::seats::SeatHold;
use skybook_core::RequestContext;
use uuid::Uuid;

use crate::error::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ReserveSeatRequest {
    /// Defaults to `business_rules.seat_lock_minutes`
    #[serde(default)]
    pub lock_minutes: Option<i64>,
}

/// POST /v1/flights/{id}/seats/{seat_id}/reserve
pub async fn reserve_seat(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((flight_id, seat_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ReserveSeatRequest>,
) -> ApiResult<SeatHold> {
    let lock_minutes = req.lock_minutes.unwrap_or(state.business_rules.seat_lock_minutes);
    let result = state.seats.reserve_seat(&ctx, flight_id, seat_id, lock_minutes).await;
    state.metrics.seat_op("reserve", &result);

    let hold = result?;
    Ok(ApiResponse::ok(format!("Seat {} reserved", hold.seat_number), hold))
}

/// POST /v1/flight-seats/{id}/release
pub async fn release_seat(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(flight_seat_id): Path<Uuid>,
) -> ApiResult<Uuid> {
    let result = state.seats.release_seat(&ctx, flight_seat_id).await;
    state.metrics.seat_op("release", &result);

    result?;
    Ok(ApiResponse::ok("Seat released", flight_seat_id))
}
