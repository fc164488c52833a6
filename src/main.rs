//! litd gateway daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   argv ──▶ config (defaults → lit.conf → flags)
//!                │
//!                ▼
//!          resolve_mode ──▶ integrated: validate embedded node config
//!                │          remote:     network, macaroon dir, lit-dir rebase
//!                ▼
//!          credentials, listeners, TLS strategy, sub-daemons
//!                │
//!                ▼
//!   logging ──▶ TLS provisioning (self-signed | Let's Encrypt | node's pair)
//!                │
//!                ▼
//!          HTTPS listener (bound on first accept) ──▶ axum router
//! ```

use std::process::ExitCode;

use litd_gateway::config::ConfigError;
use litd_gateway::lifecycle::{self, StartupError};

#[tokio::main]
async fn main() -> ExitCode {
    match lifecycle::run(std::env::args_os()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(StartupError::Config(ConfigError::RequestedExit(text))) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
