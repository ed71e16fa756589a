//! `passage-core`: shared identity model, error taxonomy and time source.
//!
//! This crate contains no I/O; stores and providers build on these types.

pub mod clock;
pub mod error;
pub mod id;
pub mod identity;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AuthError, AuthResult};
pub use id::{IdentityId, SessionId};
pub use identity::{Identity, JsonMap, ProviderIdentity, UserData};
