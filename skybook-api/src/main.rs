use anyhow::Context;
use skybook_api::{app, worker, AppState, AuthConfig};
use skybook_core::events::TracingEventPublisher;
use skybook_core::{EventPublisher, Store};
use skybook_store::fixtures::demo_store;
use skybook_store::{Config, DbClient, PostgresStore, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skybook_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Skybook API on port {}", config.server.port);

    let mut business_rules = config.business_rules.clone();
    let store: Arc<dyn Store> = if config.database.is_configured() {
        let db = DbClient::new(&config.database.url, config.database.max_connections)
            .await
            .context("Failed to connect to Postgres")?;
        db.migrate().await.context("Failed to run migrations")?;

        match db.fetch_business_rules(business_rules.clone()).await {
            Ok(rules) => business_rules = rules,
            Err(e) => tracing::warn!("Using configured business rules, table read failed: {}", e),
        }
        Arc::new(PostgresStore::new(db.pool.clone()))
    } else {
        let (store, fixtures) = demo_store(&business_rules.currency);
        for fixture in &fixtures {
            tracing::info!(
                "Demo flight {} ({}) with {} seats",
                fixture.flight.flight_number,
                fixture.flight.id,
                fixture.flight_seats.len()
            );
        }
        tracing::warn!("DATABASE_URL not set, running on the in-memory demo store");
        Arc::new(store)
    };

    let redis = match config.redis.url.as_deref() {
        Some(url) => match connect_redis(url).await {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::warn!("Redis unavailable, rate limiting disabled: {}", e);
                None
            }
        },
        None => None,
    };

    let publisher = event_publisher(&config)?;

    let state = AppState::new(
        store,
        publisher,
        redis,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        business_rules.clone(),
        config.server.rate_limit_per_minute,
    )?;

    worker::start_expiry_worker(state.sweeper.clone(), business_rules.expiry_sweep_seconds);

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

async fn connect_redis(url: &str) -> anyhow::Result<RedisClient> {
    let client = RedisClient::new(url).await?;
    client.ping().await?;
    Ok(client)
}

#[cfg(feature = "kafka")]
fn event_publisher(config: &Config) -> anyhow::Result<Arc<dyn EventPublisher>> {
    match config.kafka.brokers.as_deref() {
        Some(brokers) => {
            let producer = skybook_store::KafkaEventPublisher::new(brokers)
                .context("Failed to create Kafka producer")?;
            Ok(Arc::new(producer))
        }
        None => Ok(Arc::new(TracingEventPublisher)),
    }
}

#[cfg(not(feature = "kafka"))]
fn event_publisher(config: &Config) -> anyhow::Result<Arc<dyn EventPublisher>> {
    if config.kafka.brokers.is_some() {
        tracing::warn!("kafka.brokers is set but the kafka feature is disabled; events are only logged");
    }
    Ok(Arc::new(TracingEventPublisher))
}
