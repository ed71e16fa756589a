//! Infrastructure layer: Redis, Postgres, config, boot wiring.

pub mod bootstrap;
pub mod config;
pub mod identity_store;
pub mod ttl_store;

pub use bootstrap::AuthStack;
pub use config::{AppConfig, ConfigError, RedisConfig};
pub use identity_store::PostgresIdentityStore;
#[cfg(feature = "redis")]
pub use ttl_store::RedisTtlStore;
