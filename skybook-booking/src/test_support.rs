use chrono::{Duration, Utc};
use skybook_catalog::pricing::PricingEngine;
use skybook_catalog::quote::{QuoteEngine, QuoteSegmentRequest, QuoteSettings};
use skybook_core::booking::{Booking, PassengerType};
use skybook_core::events::CollectingEventPublisher;
use skybook_core::fare::{PriceAdjustment, Promotion};
use skybook_core::flight::CabinClass;
use skybook_core::{RequestContext, Role};
use skybook_store::fixtures::FlightFixture;
use skybook_store::memory::InMemoryStore;
use std::sync::Arc;
use uuid::Uuid;

use crate::bookings::{BookingService, BookingSettings, CreateBookingRequest, PassengerInput};
use crate::expiry::ExpirySweeper;
use crate::flights::FlightService;
use crate::policy::CancellationPolicy;
use crate::seats::SeatService;

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub events: Arc<CollectingEventPublisher>,
    pub seats: SeatService,
    pub bookings: Arc<BookingService>,
    pub flights: FlightService,
    pub sweeper: ExpirySweeper,
    pub fixture: FlightFixture,
}

impl Harness {
    pub fn flight_id(&self) -> Uuid {
        self.fixture.flight.id
    }

    pub fn aircraft_seat(&self, number: &str) -> Uuid {
        self.fixture.aircraft_seat(number).map(|s| s.id).unwrap()
    }

    pub fn flight_seat(&self, number: &str) -> Uuid {
        self.fixture.seat(number).map(|s| s.id).unwrap()
    }

    /// One adult in economy on the harness flight: 50000 + 5000 tax + 1000 fee
    pub async fn pending_booking(&self, ctx: &RequestContext) -> Booking {
        let request = CreateBookingRequest {
            segments: vec![QuoteSegmentRequest {
                flight_id: self.flight_id(),
                cabin_class: CabinClass::Economy,
            }],
            passengers: vec![PassengerInput {
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                passenger_type: PassengerType::Adult,
                email: None,
            }],
            promo_code: None,
        };
        self.bookings.create_booking(ctx, request).await.unwrap()
    }
}

pub fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let events = Arc::new(CollectingEventPublisher::new());

    let fixture = FlightFixture::new(
        "SB100",
        Utc::now() + Duration::days(30),
        &[
            ("12A", CabinClass::Economy, 2000),
            ("14C", CabinClass::Economy, 3500),
            ("15A", CabinClass::Economy, 1500),
            ("15B", CabinClass::Economy, 1500),
            ("2A", CabinClass::Business, 0),
        ],
    );
    store.seed_fixture(&fixture);
    store.seed_cabin_fare(fixture.flight.id, CabinClass::Economy, 50000, "USD");
    store.seed_cabin_fare(fixture.flight.id, CabinClass::Business, 180000, "USD");

    let quotes = Arc::new(QuoteEngine::new(
        store.clone(),
        PricingEngine::default(),
        QuoteSettings {
            tax_rate: 0.10,
            service_fee_nuc: 1000,
            currency: "USD".to_string(),
        },
    ));
    let bookings = Arc::new(BookingService::new(
        store.clone(),
        events.clone(),
        quotes,
        CancellationPolicy::default(),
        BookingSettings {
            booking_hold_minutes: 30,
        },
    ));

    Harness {
        seats: SeatService::new(store.clone(), events.clone()),
        flights: FlightService::new(store.clone()),
        sweeper: ExpirySweeper::new(store.clone(), events.clone(), bookings.clone()),
        bookings,
        store,
        events,
        fixture,
    }
}

pub fn customer(id: &str) -> RequestContext {
    RequestContext::new(id, Role::Customer, Utc::now())
}

pub fn admin() -> RequestContext {
    RequestContext::new("admin-1", Role::Admin, Utc::now())
}

pub fn staff() -> RequestContext {
    RequestContext::new("staff-1", Role::Staff, Utc::now())
}

pub fn promotion(code: &str, discount: PriceAdjustment) -> Promotion {
    let now = Utc::now();
    Promotion {
        id: Uuid::new_v4(),
        code: code.to_string(),
        description: format!("{} test promotion", code),
        discount,
        valid_from: now - Duration::days(1),
        valid_to: now + Duration::days(1),
        usage_limit: Some(100),
        used_count: 0,
        min_purchase_nuc: 0,
        is_active: true,
        version: 0,
    }
}
