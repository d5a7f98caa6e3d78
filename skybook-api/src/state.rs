use skybook_booking::{
    BookingService, BookingSettings, CancellationPolicy, ExpirySweeper, FlightService, SeatService,
};
use skybook_catalog::{PricingEngine, QuoteEngine, QuoteSettings};
use skybook_core::{EventPublisher, Store};
use skybook_shared::DomainEvent;
use skybook_store::app_config::BusinessRules;
use skybook_store::RedisClient;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::metrics::Metrics;
use crate::stream::BroadcastEventPublisher;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub seats: Arc<SeatService>,
    pub bookings: Arc<BookingService>,
    pub flights: Arc<FlightService>,
    pub quotes: Arc<QuoteEngine>,
    pub sweeper: Arc<ExpirySweeper>,
    /// Rate limiting is skipped without Redis
    pub redis: Option<Arc<RedisClient>>,
    pub seat_events: broadcast::Sender<DomainEvent>,
    pub metrics: Arc<Metrics>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
    pub rate_limit_per_minute: i64,
}

impl AppState {
    /// Wire the services over `store`. Events go to `publisher` and to the
    /// seat stream.
    pub fn new(
        store: Arc<dyn Store>,
        publisher: Arc<dyn EventPublisher>,
        redis: Option<Arc<RedisClient>>,
        auth: AuthConfig,
        business_rules: BusinessRules,
        rate_limit_per_minute: i64,
    ) -> Result<Self, prometheus::Error> {
        let (seat_events, _) = broadcast::channel(256);
        let events: Arc<dyn EventPublisher> =
            Arc::new(BroadcastEventPublisher::new(publisher, seat_events.clone()));

        let quotes = Arc::new(QuoteEngine::new(
            store.clone(),
            PricingEngine::default(),
            QuoteSettings {
                tax_rate: business_rules.tax_rate,
                service_fee_nuc: business_rules.service_fee_nuc,
                currency: business_rules.currency.clone(),
            },
        ));
        let bookings = Arc::new(BookingService::new(
            store.clone(),
            events.clone(),
            quotes.clone(),
            CancellationPolicy::default(),
            BookingSettings {
                booking_hold_minutes: business_rules.booking_hold_minutes,
            },
        ));

        Ok(Self {
            seats: Arc::new(SeatService::new(store.clone(), events.clone())),
            flights: Arc::new(FlightService::new(store.clone())),
            sweeper: Arc::new(ExpirySweeper::new(store.clone(), events, bookings.clone())),
            bookings,
            quotes,
            store,
            redis,
            seat_events,
            metrics: Arc::new(Metrics::new()?),
            auth,
            business_rules,
            rate_limit_per_minute,
        })
    }
}
