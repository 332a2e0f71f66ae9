//! HTTP API server for the RPA gateway

pub mod apps;
pub mod broadcast;
pub mod devices;
pub mod health;
pub mod response;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::config::{AppNamespace, ServerConfig};
use crate::devices::DeviceRegistry;

pub use response::{ApiError, Envelope};

/// Shared state for API handlers
#[derive(Debug, Clone)]
pub struct ApiState {
    pub registry: Arc<DeviceRegistry>,
    pub apps: Vec<AppNamespace>,
}

/// Build the full gateway router
///
/// Fixed routes (`/api/health`, `/api/devices/...`, `/api/broadcast`,
/// `/api/apps`) plus one route group per app namespace.
#[must_use]
pub fn build_router(state: Arc<ApiState>) -> Router {
    let mut api = Router::new()
        .merge(health::router(state.clone()))
        .merge(apps::listing_router(state.clone()))
        .merge(broadcast::router(state.clone()))
        .nest("/devices", devices::router(state.clone()));

    for app in &state.apps {
        api = api.nest(
            &format!("/{}", app.prefix),
            apps::router(state.registry.clone(), app.clone()),
        );
    }

    // CORS layer for cross-origin requests from dashboards
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    registry: Arc<DeviceRegistry>,
    apps: Vec<AppNamespace>,
    server: ServerConfig,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    #[must_use]
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self {
            registry,
            apps: AppNamespace::defaults(),
            server: ServerConfig::default(),
        }
    }

    /// Set the app namespaces to expose
    #[must_use]
    pub fn apps(mut self, apps: Vec<AppNamespace>) -> Self {
        self.apps = apps;
        self
    }

    /// Set bind address and port
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = server;
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        ApiServer {
            state: Arc::new(ApiState {
                registry: self.registry,
                apps: self.apps,
            }),
            server: self.server,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    server: ServerConfig,
}

impl ApiServer {
    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.server.host, self.server.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            crate::Error::Config(format!("failed to bind API server on {addr}: {e}"))
        })?;

        let device_count = self.state.registry.len().await;
        let prefixes: Vec<&str> = self.state.apps.iter().map(|a| a.prefix.as_str()).collect();
        tracing::info!(
            addr = %addr,
            devices = device_count,
            apps = ?prefixes,
            "API server listening"
        );

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
