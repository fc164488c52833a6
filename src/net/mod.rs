//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Configured address string
//!     → addr.rs (normalize, classify tcp4 / tcp6 / unix)
//!     → listener.rs (bind on first accept)
//!     → tls.rs (certificate strategy, HTTP/2 config, handshake)
//!         → certgen.rs (self-signed pair, PEM loading)
//!         → acme.rs (Let's Encrypt resolver, challenge responder)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Listeners report their address before binding; the bind happens on
//!   the first accept
//! - Wildcard listen addresses are rewritten to loopback before dialing

pub mod acme;
pub mod addr;
pub mod certgen;
pub mod listener;
pub mod tls;

pub use addr::{dial_address, ListenAddress};
pub use listener::{DeferredListener, ListenerFailure, ObservedListener};
pub use tls::{provision, ProvisionedTls, TlsError, TlsListener};
