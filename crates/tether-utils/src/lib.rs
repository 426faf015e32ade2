//! # Tether Utilities
//!
//! Shared utilities and logging for Tether.
//!
//! This crate provides the logging setup used by the `tether` binary, built
//! on `tracing`. Library crates only emit events; installing a subscriber is
//! left to the binary.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{LogFormat, LogLevel, LoggingError, LoggingGuard, init_logging, init_logging_with_level};
pub use tracing::{debug, error, info, trace, warn};
