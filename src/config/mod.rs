//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! Defaults::detect()
//!     → RawConfig::from_defaults      (compiled-in values)
//!     → overlay(config file layer)    (loader.rs, lit.conf)
//!     → overlay(command line layer)   (layer.rs, clap)
//!     → resolve_mode                  (validation.rs: integrated | remote)
//!     → credentials, listeners, TLS strategy, sub-daemons (resolver.rs)
//!     → RuntimeConfig (validated, immutable)
//!     → shared read-only with the server and the TLS provisioner
//! ```
//!
//! # Design Decisions
//! - Each pipeline stage returns a new snapshot; later stages win
//! - The inactive mode's parameters do not survive into `RuntimeConfig`
//! - A missing config file is reported only after everything else passed

pub mod credentials;
pub mod defaults;
pub mod error;
pub mod integrated;
pub mod layer;
pub mod loader;
pub mod macaroon;
pub mod paths;
pub mod resolver;
pub mod schema;
pub mod subdaemons;
pub mod validation;

pub use defaults::Defaults;
pub use error::{ConfigError, ConfigResult};
pub use integrated::{LndValidator, NodeValidator};
pub use resolver::{load_and_validate, Resolved, Validators};
pub use schema::{LndConnectParams, LndMode, Network, RuntimeConfig, TlsStrategy};
pub use subdaemons::{BuiltinSubDaemons, SubDaemonValidator};
