//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! DeferredListener (bind on first accept)
//!     → TlsListener (handshake, ALPN h2 / http/1.1)
//!     → server.rs (Axum router, tracing, timeout)
//!     → handlers (/health, /v1/status)
//! ```

pub mod server;

pub use server::{AppState, GatewayServer};
