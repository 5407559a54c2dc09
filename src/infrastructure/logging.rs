//! Logging configuration
//!
//! Initializes tracing for the engine. `FLOWLINE_LOG` (or the standard
//! `RUST_LOG`) overrides the configured level.

/// Initializes logging with the specified default level.
///
/// Safe to call more than once; only the first call installs the
/// subscriber.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = std::env::var("FLOWLINE_LOG")
        .ok()
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_line_number(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_reentrant() {
        init_logging("debug");
        init_logging("info");
    }
}
