//! Relay server implementation
//!
//! Binds the listener, writes the pid file, and serves the API router
//! until the shutdown signal fires.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::error::Result;
use crate::site::SiteRegistry;

use super::api::create_router;
use super::config::ServerConfig;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Site registry
    pub registry: Arc<SiteRegistry>,

    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    pub fn new(registry: Arc<SiteRegistry>) -> Self {
        Self {
            registry,
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// Relay Server
// ============================================================================

/// Main relay server
pub struct RelayServer {
    config: ServerConfig,
    state: AppState,
}

impl RelayServer {
    /// Create a new relay server
    pub fn new(config: ServerConfig, registry: Arc<SiteRegistry>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            state: AppState::new(registry),
        })
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let router = create_router(self.state.clone());

        if self.config.enable_request_logging {
            router.layer(TraceLayer::new_for_http())
        } else {
            router
        }
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.bind_address).await?;
        tracing::info!("Listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Serve on an already bound listener until `shutdown_signal` resolves
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(shutdown_signal)
            .await?;

        tracing::info!("Relay server shutdown complete");
        Ok(())
    }

    /// Bind, write the pid file, and serve with graceful shutdown
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let listener = self.bind().await?;

        if let Some(pid_file) = &self.config.pid_file {
            tokio::fs::write(pid_file, format!("{}\n", std::process::id())).await?;
            tracing::debug!(path = %pid_file, "Wrote pid file");
        }

        self.serve(listener, shutdown_signal).await
    }

    /// Get server info
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            bind_address: self.config.bind_address,
            request_logging_enabled: self.config.enable_request_logging,
            sites: self.state.registry.len(),
        }
    }
}

/// Server information
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub bind_address: SocketAddr,
    pub request_logging_enabled: bool,
    pub sites: usize,
}

impl ServerInfo {
    /// Format as display string
    pub fn display(&self) -> String {
        format!(
            "Tracker Status Relay\n\
             {:-<40}\n\
             Bind Address: {}\n\
             Request Logging: {}\n\
             Known Sites: {}",
            "",
            self.bind_address,
            if self.request_logging_enabled { "enabled" } else { "disabled" },
            self.sites
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
