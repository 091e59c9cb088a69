//! # Observability
//!
//! Structured logging for the sensor via the `tracing` ecosystem. The
//! detection path emits events at these levels:
//!
//! - `debug`: per-cycle statistics when `debug_stats` is enabled
//! - `info`: configuration snapshots taking effect
//! - `warn`: skipped cycles and detection-probability shortfalls
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use specsense_core::observe::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::default());
//! tracing::info!(nsub_bands = 15, "Sensor ready");
//! ```

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
