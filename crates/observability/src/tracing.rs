//! Tracing/logging initialization.
//!
//! Filtering follows `RUST_LOG` (default `info`). Token values are never logged
//! by the auth crates, only session ids, user ids and provider names.

use tracing_subscriber::EnvFilter;

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    /// One JSON object per event, for log shippers.
    #[default]
    Json,
    /// Human-readable, for terminals.
    Pretty,
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing/logging for the process.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init(format: Format) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_writer(std::io::stderr);

    match format {
        Format::Json => builder.json().with_target(false).try_init().is_ok(),
        Format::Pretty => builder.with_target(true).try_init().is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        let _ = init(Format::Json);
        assert!(!init(Format::Pretty));
    }
}
