//! Durable identity storage.

pub mod postgres;

pub use postgres::PostgresIdentityStore;
