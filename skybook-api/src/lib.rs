use axum::{
    http::Method,
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod bookings;
pub mod error;
pub mod flights;
pub mod metrics;
pub mod middleware;
pub mod seats;
pub mod state;
pub mod stream;
pub mod worker;

pub use state::{AppState, AuthConfig};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let customer_routes = Router::new()
        .route("/v1/quotes", post(flights::create_quote))
        .route("/v1/flights/{id}", get(flights::get_flight))
        .route("/v1/flights/{id}/seats", get(flights::list_flight_seats))
        .route("/v1/flights/{id}/seats/stream", get(stream::seat_stream))
        .route("/v1/flights/{id}/seats/{seat_id}/reserve", post(seats::reserve_seat))
        .route("/v1/flight-seats/{id}/release", post(seats::release_seat))
        .route(
            "/v1/bookings",
            post(bookings::create_booking).get(bookings::list_my_bookings),
        )
        .route("/v1/bookings/{id}", get(bookings::get_booking))
        .route("/v1/bookings/{id}/history", get(bookings::get_booking_history))
        .route("/v1/bookings/{id}/seats", post(bookings::select_seat))
        .route("/v1/bookings/{id}/extras", post(bookings::add_extra))
        .route("/v1/bookings/{id}/promotion", post(bookings::apply_promotion))
        .route("/v1/bookings/{id}/confirm", post(bookings::confirm_booking))
        .route("/v1/bookings/{id}/cancel", post(bookings::cancel_booking))
        .route_layer(from_fn_with_state(state.clone(), middleware::customer_or_admin));

    let staff_routes = Router::new()
        .route("/v1/aircraft/{id}", get(flights::get_aircraft))
        .route("/v1/admin/bookings/{id}/complete", post(admin::complete_booking))
        .route("/v1/admin/expiry/sweep", post(admin::run_expiry_sweep))
        .route_layer(from_fn_with_state(state.clone(), middleware::admin_or_staff));

    let admin_routes = Router::new()
        .route("/v1/admin/flights/{id}/schedule-seats", post(admin::schedule_flight_seats))
        .route("/v1/admin/flights/{id}/cancel", post(admin::cancel_flight))
        .route_layer(from_fn_with_state(state.clone(), middleware::admin_only));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics::metrics_handler))
        .merge(customer_routes)
        .merge(staff_routes)
        .merge(admin_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "success": true, "message": "ok", "data": null }))
}
