use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use skybook_api::{app, middleware::Claims, AppState, AuthConfig};
use skybook_core::events::CollectingEventPublisher;
use skybook_core::flight::CabinClass;
use skybook_store::app_config::BusinessRules;
use skybook_store::fixtures::FlightFixture;
use skybook_store::InMemoryStore;
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "test-secret";

struct TestApp {
    router: Router,
    fixture: FlightFixture,
}

fn setup() -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let fixture = FlightFixture::new(
        "SB100",
        Utc::now() + Duration::days(30),
        &[
            ("12A", CabinClass::Economy, 2000),
            ("14C", CabinClass::Economy, 3500),
            ("15A", CabinClass::Economy, 1500),
        ],
    );
    store.seed_fixture(&fixture);
    store.seed_cabin_fare(fixture.flight.id, CabinClass::Economy, 50000, "USD");

    let state = AppState::new(
        store,
        Arc::new(CollectingEventPublisher::new()),
        None,
        AuthConfig {
            secret: SECRET.to_string(),
        },
        BusinessRules::default(),
        120,
    )
    .unwrap();

    TestApp {
        router: app(state),
        fixture,
    }
}

fn token(sub: &str, role: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        role: role.to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

impl TestApp {
    async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn seat(&self, number: &str) -> String {
        self.fixture.seat(number).unwrap().id.to_string()
    }

    async fn create_booking(&self, token: &str) -> Value {
        let body = json!({
            "segments": [{ "flight_id": self.fixture.flight.id, "cabin_class": "ECONOMY" }],
            "passengers": [{
                "first_name": "Ada",
                "last_name": "Lovelace",
                "passenger_type": "ADULT",
                "email": "ada@example.com"
            }],
            "promo_code": null
        });
        let (status, value) = self.call("POST", "/v1/bookings", Some(token), Some(body)).await;
        assert_eq!(status, StatusCode::OK, "{}", value);
        value["data"].clone()
    }
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let app = setup();
    let (status, body) = app.call("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_policies_are_enforced() {
    let app = setup();
    let flight = format!("/v1/flights/{}", app.fixture.flight.id);

    let (status, body) = app.call("GET", &flight, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = app.call("GET", &flight, Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Staff are not in CustomerOrAdmin
    let (status, _) = app.call("GET", &flight, Some(&token("staff-1", "STAFF")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let cancel = format!("/v1/admin/flights/{}/cancel", app.fixture.flight.id);
    let (status, _) = app.call("POST", &cancel, Some(&token("user-a", "CUSTOMER")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let aircraft = format!("/v1/aircraft/{}", app.fixture.aircraft.id);
    let (status, body) = app.call("GET", &aircraft, Some(&token("staff-1", "STAFF")), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["seats"].as_array().map(|s| s.len()), Some(3));
}

#[tokio::test]
async fn test_flight_reads_are_stable() {
    let app = setup();
    let customer = token("user-a", "CUSTOMER");
    let uri = format!("/v1/flights/{}", app.fixture.flight.id);

    let (_, first) = app.call("GET", &uri, Some(&customer), None).await;
    let (_, second) = app.call("GET", &uri, Some(&customer), None).await;
    assert_eq!(first["data"], second["data"]);
    assert_eq!(first["data"]["flight_number"], "SB100");
}

#[tokio::test]
async fn test_second_reserve_is_a_conflict() {
    let app = setup();
    let uri = format!(
        "/v1/flights/{}/seats/{}/reserve",
        app.fixture.flight.id,
        app.fixture.aircraft_seat("12A").unwrap().id
    );

    let (status, body) = app
        .call("POST", &uri, Some(&token("user-a", "CUSTOMER")), Some(json!({ "lock_minutes": 10 })))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["seat_number"], "12A");

    let (status, body) = app
        .call("POST", &uri, Some(&token("user-b", "CUSTOMER")), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);

    let (status, text) = app.call("GET", "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
    // Prometheus text is not JSON
    assert_eq!(text, Value::Null);
}

#[tokio::test]
async fn test_booking_checkout_flow() {
    let app = setup();
    let customer = token("user-a", "CUSTOMER");
    let booking = app.create_booking(&customer).await;
    let id = booking["id"].as_str().unwrap().to_string();
    assert_eq!(booking["totals"]["total_nuc"], 56000);
    assert_eq!(booking["status"], "PENDING");

    let select = json!({
        "passenger_id": booking["passengers"][0]["id"],
        "segment_id": booking["segments"][0]["id"],
        "flight_seat_id": app.seat("12A"),
    });
    let (status, body) = app
        .call("POST", &format!("/v1/bookings/{}/seats", id), Some(&customer), Some(select))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["booking"]["totals"]["total_nuc"], 58000);

    let (status, body) = app
        .call(
            "POST",
            &format!("/v1/bookings/{}/confirm", id),
            Some(&customer),
            Some(json!({ "amount_nuc": 57900, "method": "CARD" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("does not match booking total"));

    let (status, body) = app
        .call(
            "POST",
            &format!("/v1/bookings/{}/confirm", id),
            Some(&customer),
            Some(json!({ "amount_nuc": 58000, "method": "CARD", "transaction_reference": "txn_1" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "CONFIRMED");

    let (status, body) = app
        .call("GET", &format!("/v1/bookings/{}/history", id), Some(&customer), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let actions: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|row| row["action"].as_str())
        .collect();
    assert_eq!(actions, vec!["CREATED", "SEAT_SELECTED", "CONFIRMED"]);

    // Someone else's booking
    let (status, _) = app
        .call("GET", &format!("/v1/bookings/{}", id), Some(&token("user-b", "CUSTOMER")), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_booking_is_not_found() {
    let app = setup();
    let (status, body) = app
        .call(
            "GET",
            &format!("/v1/bookings/{}", uuid::Uuid::new_v4()),
            Some(&token("user-a", "CUSTOMER")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"], Value::Null);
}
