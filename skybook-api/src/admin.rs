use axum::{
    extract::{Path, State},
    Extension,
};
use chrono::Utc;
use skybook_booking::SweepReport;
use skybook_core::booking::Booking;
use skybook_core::flight::Flight;
use skybook_core::seat::FlightSeat;
use skybook_core::RequestContext;
use uuid::Uuid;

use crate::error::{ApiResponse, ApiResult};
use crate::state::AppState;

/// POST /v1/admin/bookings/{id}/complete
pub async fn complete_booking(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(booking_id): Path<Uuid>,
) -> ApiResult<Booking> {
    let result = state.bookings.complete_booking(&ctx, booking_id).await;
    state.metrics.booking_op("complete", &result);

    let booking = result?;
    Ok(ApiResponse::ok(format!("Booking {} completed", booking.reference), booking))
}

/// POST /v1/admin/flights/{id}/schedule-seats
pub async fn schedule_flight_seats(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(flight_id): Path<Uuid>,
) -> ApiResult<Vec<FlightSeat>> {
    let seats = state.flights.schedule_flight_seats(&ctx, flight_id).await?;
    Ok(ApiResponse::ok(format!("{} seats scheduled", seats.len()), seats))
}

/// POST /v1/admin/flights/{id}/cancel
pub async fn cancel_flight(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(flight_id): Path<Uuid>,
) -> ApiResult<Flight> {
    let flight = state.flights.cancel_flight(&ctx, flight_id).await?;
    Ok(ApiResponse::ok(format!("Flight {} cancelled", flight.flight_number), flight))
}

/// POST /v1/admin/expiry/sweep
pub async fn run_expiry_sweep(State(state): State<AppState>) -> ApiResult<SweepReport> {
    let report = state.sweeper.sweep(Utc::now()).await?;
    Ok(ApiResponse::ok("Expiry sweep finished", report))
}
