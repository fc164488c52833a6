//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!
//! Consumers (logging.rs):
//!     → stderr (human readable)
//!     → <logdir>/<network>/litd.log (rolling, non-blocking)
//! ```
//!
//! # Design Decisions
//! - The subscriber is installed only after configuration resolved, since
//!   the log directory depends on the mode and network
//! - Warnings deferred during resolution are emitted right after install

pub mod logging;

pub use logging::{init, parse_debug_level, LogGuard, LoggingError};
