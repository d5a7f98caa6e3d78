use axum::{extract::State, http::header, response::IntoResponse};
use prometheus::{opts, IntCounterVec, Registry, TextEncoder};
use skybook_core::BookingResult;

use crate::error::AppError;
use crate::state::AppState;

/// Operation counters served on `/metrics`
pub struct Metrics {
    registry: Registry,
    seat_operations: IntCounterVec,
    booking_operations: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let seat_operations = IntCounterVec::new(
            opts!("skybook_seat_operations_total", "Seat reservation operations by outcome"),
            &["operation", "outcome"],
        )?;
        let booking_operations = IntCounterVec::new(
            opts!("skybook_booking_operations_total", "Booking operations by outcome"),
            &["operation", "outcome"],
        )?;

        registry.register(Box::new(seat_operations.clone()))?;
        registry.register(Box::new(booking_operations.clone()))?;

        Ok(Self {
            registry,
            seat_operations,
            booking_operations,
        })
    }

    fn outcome<T>(result: &BookingResult<T>) -> &'static str {
        match result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        }
    }

    pub fn seat_op<T>(&self, operation: &str, result: &BookingResult<T>) {
        self.seat_operations
            .with_label_values(&[operation, Self::outcome(result)])
            .inc();
    }

    pub fn booking_op<T>(&self, operation: &str, result: &BookingResult<T>) {
        self.booking_operations
            .with_label_values(&[operation, Self::outcome(result)])
            .inc();
    }

    pub fn export(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state
        .metrics
        .export()
        .map_err(|e| AppError::InternalServerError(format!("Metrics encoding failed: {}", e)))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
