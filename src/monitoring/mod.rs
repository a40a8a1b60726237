//! Monitoring Module
//!
//! Provides log configuration and subscriber installation for the
//! `tracing` events the store emits.

pub mod logging;

pub use logging::{init_logging, LogFormat, LogLevel, LoggerConfig};
