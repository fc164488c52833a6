//! Startup orchestration.
//!
//! # Responsibilities
//! - Resolve and validate configuration
//! - Install logging, then report the deferred config file warning
//! - Provision TLS and start the HTTPS (and optional plaintext) server
//! - Run until a shutdown signal arrives
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners bind lazily, on the first accept

use std::ffi::OsString;

use thiserror::Error;
use tokio::task::JoinSet;

use crate::config::credentials::process_env;
use crate::config::{load_and_validate, ConfigError, Defaults, RuntimeConfig, Validators};
use crate::http::GatewayServer;
use crate::lifecycle::{signals, Shutdown};
use crate::net::{provision, DeferredListener, TlsError, TlsListener};
use crate::observability::{self, LoggingError};

/// Error that stops the daemon from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Resolve the configuration from `argv` and run the gateway.
pub async fn run<I, T>(argv: I) -> Result<(), StartupError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let defaults = Defaults::detect();
    let resolved = load_and_validate(&defaults, argv, Validators::builtin(), process_env)?;

    let _log_guard = observability::init(&resolved.config.logging)?;
    resolved.log_deferred();

    serve(resolved.config, Shutdown::new()).await
}

/// Serve `config` until a signal arrives or `shutdown` is triggered.
pub async fn serve(config: RuntimeConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    tracing::info!(
        mode = config.mode.name(),
        network = %config.network,
        lit_dir = %config.lit_dir.display(),
        "litd starting"
    );

    let tls = provision(&config.tls, shutdown.sender())?;
    let server = GatewayServer::new(&config);
    let mut servers = JoinSet::new();

    let https = TlsListener::new(
        DeferredListener::new(config.https_listen.clone()),
        tls.server_config.clone(),
    );
    tracing::info!(address = %config.https_listen, "HTTPS listener configured");
    servers.spawn(server.clone().serve(https, shutdown.subscribe()));

    if let Some(addr) = &config.insecure_listen {
        tracing::warn!(
            address = %addr,
            "Insecure HTTP listener enabled, credentials are sent unencrypted"
        );
        servers.spawn(server.serve(DeferredListener::new(addr.clone()), shutdown.subscribe()));
    }

    let mut result = Ok(());
    tokio::select! {
        _ = signals::shutdown_signal() => {}
        Some(done) = servers.join_next() => {
            result = flatten(done);
        }
    }
    shutdown.trigger();
    tracing::info!(tasks = shutdown.receiver_count(), "Waiting for tasks to drain");

    while let Some(done) = servers.join_next().await {
        if result.is_ok() {
            result = flatten(done);
        }
    }
    if let Some(acme) = tls.acme {
        let _ = acme.issuer.await;
        let _ = acme.challenge.wait().await;
    }

    tracing::info!("Shutdown complete");
    result
}

fn flatten(
    done: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), StartupError> {
    done.map_err(std::io::Error::other)?.map_err(StartupError::from)
}
