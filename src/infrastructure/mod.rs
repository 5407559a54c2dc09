//! Infrastructure concerns: configuration, loading, logging, metrics

pub mod config;
pub mod loader;
pub mod logging;
pub mod metrics;

pub use config::EngineConfig;
pub use logging::init_logging;
pub use metrics::{MetricsCollector, RunMetrics};
