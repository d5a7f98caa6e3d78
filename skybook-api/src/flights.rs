use axum::{
    extract::{Path, State},
    Extension, Json,
};
use skybook_booking::flights::{AircraftDetails, SeatMap};
use skybook_catalog::quote::{Quote, QuoteRequest};
use skybook_core::flight::Flight;
use skybook_core::RequestContext;
use uuid::Uuid;

use crate::error::{ApiResponse, ApiResult};
use crate::state::AppState;

/// GET /v1/flights/{id}
pub async fn get_flight(State(state): State<AppState>, Path(flight_id): Path<Uuid>) -> ApiResult<Flight> {
    let flight = state.flights.get_flight(flight_id).await?;
    Ok(ApiResponse::ok("Flight retrieved", flight))
}

/// GET /v1/flights/{id}/seats
pub async fn list_flight_seats(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(flight_id): Path<Uuid>,
) -> ApiResult<SeatMap> {
    let map = state.flights.list_flight_seats(&ctx, flight_id).await?;
    Ok(ApiResponse::ok(format!("{} seats", map.seats.len()), map))
}

/// GET /v1/aircraft/{id}
pub async fn get_aircraft(
    State(state): State<AppState>,
    Path(aircraft_id): Path<Uuid>,
) -> ApiResult<AircraftDetails> {
    let details = state.flights.get_aircraft(aircraft_id).await?;
    Ok(ApiResponse::ok("Aircraft retrieved", details))
}

/// POST /v1/quotes
pub async fn create_quote(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<QuoteRequest>,
) -> ApiResult<Quote> {
    let quote = state.quotes.quote(&req, ctx.now).await?;
    Ok(ApiResponse::ok("Quote computed", quote))
}
