pub mod app_config;
pub mod database;
pub mod fixtures;
pub mod memory;
pub mod pg_store;
pub mod redis_repo;

#[cfg(feature = "kafka")]
pub mod events;

pub use app_config::Config;
pub use database::DbClient;
pub use memory::InMemoryStore;
pub use pg_store::PostgresStore;
pub use redis_repo::RedisClient;

#[cfg(feature = "kafka")]
pub use events::KafkaEventPublisher;
