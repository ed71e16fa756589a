//! Process-wide tracing setup.

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::Format::Json);
}

/// Tracing configuration (filters, layers).
pub mod tracing;
