//! `passage-store`: storage contracts consumed by the authentication layer.
//!
//! Only the contracts and in-memory implementations live here; production
//! backends are in `passage-infra`.

pub mod error;
pub mod identity;
pub mod ttl;

pub use error::StoreError;
pub use identity::{
    IdentityFilter, IdentityKey, IdentityPatch, IdentityStore, InMemoryIdentityStore, NewIdentity,
};
pub use ttl::{InMemoryTtlStore, TtlStore};
