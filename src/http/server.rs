//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router for the gateway endpoint
//! - Wire up middleware (tracing, request timeout)
//! - Serve on any `axum::serve::Listener`: the TLS listener or the
//!   plaintext deferred listener
//! - Stop accepting on the shutdown broadcast

use std::fmt::Debug;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::schema::{LndConnectParams, Network, RuntimeConfig};
use crate::net::listener::ObservedListener;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub mode: &'static str,
    pub network: Network,
    pub lnd: Arc<LndConnectParams>,
    pub started: Instant,
}

/// The gateway's external endpoint.
#[derive(Clone)]
pub struct GatewayServer {
    router: Router,
}

impl GatewayServer {
    pub fn new(config: &RuntimeConfig) -> Self {
        let state = AppState {
            mode: config.mode.name(),
            network: config.network,
            lnd: Arc::new(config.lnd_connect_params()),
            started: Instant::now(),
        };
        Self {
            router: Self::build_router(state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/v1/status", get(status))
            .with_state(state)
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
            .layer(TraceLayer::new_for_http())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires.
    ///
    /// Returns an error as soon as the listener fails for good, e.g. when
    /// its address cannot be bound.
    pub async fn serve<L>(self, listener: L, mut shutdown: broadcast::Receiver<()>) -> std::io::Result<()>
    where
        L: ObservedListener,
        L::Addr: Debug,
    {
        let addr = listener.local_addr()?;
        let failure = listener.failure();
        tracing::info!(address = ?addr, "HTTP server starting");

        let serving = axum::serve(listener, self.router).with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        });

        tokio::select! {
            served = serving.into_future() => served?,
            error = failure.wait() => {
                tracing::error!(address = ?addr, error = %error, "HTTP server failed");
                return Err(error);
            }
        }

        tracing::info!(address = ?addr, "HTTP server stopped");
        Ok(())
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "mode": state.mode,
        "network": state.network.as_str(),
        "lnd_rpc_server": state.lnd.rpc_server,
        "uptime_secs": state.started.elapsed().as_secs(),
    }))
}
