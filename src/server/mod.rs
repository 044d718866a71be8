//! HTTP serve surface.
//!
//! One axum router exposes health, the gated model listing and the chat
//! stream. Endpoints are constructed once at startup from the model
//! configuration; the feature gate is resolved once and injected so every
//! request sees the same view.

mod chat;
pub mod routes;

pub use chat::ChatRequest;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::info;

use crate::cli::ServeOpts;
use crate::config::Config;
use crate::endpoints::OpenAiEndpoint;
use crate::features::{FeatureGate, GateMode};

/// Shared state for the serve surface.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gate: Arc<FeatureGate>,
    pub endpoints: HashMap<String, Arc<OpenAiEndpoint>>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub start_time: std::time::Instant,
    pub version: String,
}

/// The gateway server.
pub struct Server {
    state: AppState,
    addr: SocketAddr,
}

impl Server {
    /// Build endpoints and state from the configuration. Does not bind yet.
    pub async fn start(config: Config, gate: FeatureGate, opts: &ServeOpts) -> Result<Self> {
        let port = opts.port.unwrap_or(config.server.port);
        let bind = opts.bind.as_deref().unwrap_or(&config.server.bind);
        let addr: SocketAddr = format!("{bind}:{port}")
            .parse()
            .with_context(|| format!("Invalid bind address '{bind}:{port}'"))?;

        let mut endpoints = HashMap::new();
        for model in &config.models {
            let endpoint = OpenAiEndpoint::from_config(model)
                .with_context(|| format!("Failed to build endpoint for model '{}'", model.id))?;
            endpoints.insert(model.id.clone(), Arc::new(endpoint));
        }
        info!(models = endpoints.len(), "endpoints ready");

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = AppState {
            config: Arc::new(config),
            gate: Arc::new(gate),
            endpoints,
            shutdown_tx,
            start_time: std::time::Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };

        info!("Server binding to {}", addr);

        Ok(Self { state, addr })
    }

    /// Run the server until shutdown signal is received.
    pub async fn run_until_shutdown(self) -> Result<()> {
        let state = self.state.clone();
        let app = build_router(state.clone());

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!("reefchat v{} listening on {}", state.version, self.addr);

        print_startup_banner(&state, &self.addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(self.state.shutdown_tx.clone()))
            .await?;

        info!("Server shut down gracefully");
        Ok(())
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        let _ = self.state.shutdown_tx.send(());
    }
}

/// Build the Axum router with all routes.
fn build_router(state: AppState) -> Router {
    routes::build_routes(state)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }

    let _ = shutdown_tx.send(());
}

/// Print startup banner with server info.
fn print_startup_banner(state: &AppState, addr: &SocketAddr) {
    let gate_mode = match state.gate.mode() {
        GateMode::Open => "open (all models allowed)",
        GateMode::Strict => "strict (feature config active)",
    };

    info!("-------------------------------------------");
    info!("  reefchat v{}", state.version);
    info!("  Listening on: http://{}", addr);
    info!("  Models: {}", state.endpoints.len());
    info!("  Gate mode: {}", gate_mode);
    info!("  Health: http://{}/api/health", addr);
    info!("  Chat: http://{}/api/chat", addr);
    info!("-------------------------------------------");
}
