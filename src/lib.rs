//! litd gateway library: mode resolution and trust bootstrap for the
//! Lightning Terminal daemon.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::{load_and_validate, ConfigError, Defaults, RuntimeConfig};
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
