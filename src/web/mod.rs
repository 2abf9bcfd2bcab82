//! Web layer module
//!
//! Thin HTTP surface over the [`Orchestrator`]: handlers turn path and query
//! parameters into an [`ImageRequest`](crate::orchestrator::ImageRequest) and
//! hand the outcome to [`responses`], which owns status and header mapping.

use anyhow::Result;
use axum::{Router, routing::get};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::orchestrator::Orchestrator;

pub mod extractors;
pub mod handlers;
pub mod responses;

pub use responses::CachePolicy;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub cache_policy: CachePolicy,
}

impl AppState {
    pub fn new(config: &Config, orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            cache_policy: CachePolicy {
                max_age: config.cache.max_age,
                error_max_age: config.cache.error_max_age,
            },
        }
    }
}

/// Build the router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            "/image/{template}/{*path}",
            get(handlers::images::serve_image),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(config: &Config, state: AppState) -> Result<Self> {
        Ok(Self {
            app: create_router(state),
            addr: config.socket_addr()?,
        })
    }

    /// Serve until SIGTERM/SIGINT or until `cancellation_token` fires.
    ///
    /// `ready_signal` reports whether the listener could be bound.
    pub async fn serve_with_cancellation(
        self,
        ready_signal: tokio::sync::oneshot::Sender<Result<()>>,
        cancellation_token: Option<CancellationToken>,
    ) -> Result<()> {
        let listener = match tokio::net::TcpListener::bind(&self.addr).await {
            Ok(listener) => listener,
            Err(bind_error) => {
                let message = format!("Failed to bind to {}: {}", self.addr, bind_error);
                let _ = ready_signal.send(Err(anyhow::anyhow!("{}", message)));
                return Err(anyhow::anyhow!("{}", message));
            }
        };
        let _ = ready_signal.send(Ok(()));

        let shutdown_signal = async move {
            match cancellation_token {
                Some(token) => {
                    token.cancelled().await;
                    tracing::info!("Web server received cancellation signal, shutting down gracefully");
                }
                None => wait_for_signal().await,
            }
        };

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal)
            .await?;
        Ok(())
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down gracefully");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT (Ctrl+C), shutting down gracefully");
                }
            }
        }
        _ => {
            tracing::warn!("Unable to install signal handlers, falling back to Ctrl+C");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Received Ctrl+C, shutting down gracefully");
}
