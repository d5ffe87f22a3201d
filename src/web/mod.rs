//! Web layer module
//!
//! Status and control endpoints for the refresh scheduler, plus static
//! serving of the published guide documents from the output directory.

use anyhow::Result;
use axum::{
    http::{header, HeaderValue},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer};
use tracing::info;

use crate::config::Config;
use crate::ingestor::RefreshScheduler;

pub mod handlers;
pub mod responses;

pub use responses::{handle_error, ApiResponse, RefreshResponse, StatusResponse};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub scheduler: Arc<RefreshScheduler>,
}

impl AppState {
    pub fn new(config: Arc<Config>, scheduler: Arc<RefreshScheduler>) -> Self {
        Self { config, scheduler }
    }
}

/// Build the router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    let output_dir = state.config.output.directory.clone();

    Router::new()
        .route("/", get(handlers::status::get_status))
        .route("/api/status", get(handlers::status::get_status))
        .route(
            "/api/refresh",
            get(handlers::refresh::trigger_refresh).post(handlers::refresh::trigger_refresh),
        )
        .route(
            "/api/schedule",
            get(handlers::schedule::get_schedule).put(handlers::schedule::update_schedule),
        )
        .route("/health", get(handlers::health::health_check))
        // Published documents
        .fallback_service(ServeDir::new(output_dir))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(config: &Config, state: AppState) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.web.host, config.web.port).parse()?;
        Ok(Self {
            app: create_router(state),
            addr,
        })
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Serve until the token is cancelled, reporting bind success or failure first
    pub async fn serve_with_cancellation(
        self,
        ready_signal: tokio::sync::oneshot::Sender<Result<()>>,
        cancellation_token: CancellationToken,
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

        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move {
                cancellation_token.cancelled().await;
                info!("Web server received cancellation signal, shutting down gracefully");
            })
            .await?;
        Ok(())
    }
}
