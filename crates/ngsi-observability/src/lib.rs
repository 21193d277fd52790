//! # ngsi-observability
//!
//! Structured logging for the NGSI-LD mapping engine.
//!
//! The mapping crates only emit `tracing` events and spans; this crate wires
//! them to a subscriber for binaries and test harnesses.

pub mod logging;

pub use logging::{init_logging, init_logging_with_config, LoggingConfig};
