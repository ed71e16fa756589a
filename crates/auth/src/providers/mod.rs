//! Built-in identity providers.

pub mod debug;
pub mod local;

pub use debug::{DEBUG_PROVIDER, DebugProvider};
pub use local::{LOCAL_PROVIDER, LocalProvider, LocalTokens};
