//! Infrastructure - configuration and metrics
//!
//! - `config` - Station configuration (TOML loading, defaults)
//! - `metrics` - Lock-free station counters and pipeline latency

pub mod config;
pub mod metrics;

// Re-export commonly used types
pub use config::Config;
pub use metrics::Metrics;
