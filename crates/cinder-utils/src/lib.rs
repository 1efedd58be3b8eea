//! # Cinder Utilities
//!
//! Shared helpers for the Cinder workspace.
//!
//! For now this is the logging setup: a `tracing` subscriber that writes to
//! stderr (so it never mixes with debugger output on stdout) and optionally to
//! a file.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{LogFormat, LogLevel, LoggingConfig, LoggingError, init_logging, init_logging_with_level};
pub use tracing::{debug, error, info, trace, warn};
