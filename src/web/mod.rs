//! HTTP interface
//!
//! Thin handlers over [`GuideService`]: two trigger endpoints that run the
//! pipeline and a set of file endpoints that serve the rendered artifacts
//! with conditional-GET and gzip support.

use anyhow::Result;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::services::GuideService;

pub mod handlers;

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(config: &Config, service: GuideService) -> Result<Self> {
        let app = Self::create_router(AppState::new(service));
        let addr: SocketAddr = format!("{}:{}", config.web.host, config.web.port).parse()?;
        Ok(Self { app, addr })
    }

    /// Create the router with all routes and middleware
    pub fn create_router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(handlers::health))
            // Pipeline triggers
            .route("/update", get(handlers::update))
            .route("/epg-filter", get(handlers::epg_filter))
            // Rendered artifacts
            .route("/epg", get(handlers::epg))
            .route("/epg2", get(handlers::epg_plain))
            .route("/epg.gz", get(handlers::epg_gz))
            .route("/ttv", get(handlers::ttv))
            .route("/ttv.gz", get(handlers::ttv_gz))
            .route("/xmltv.dtd", get(handlers::xmltv_dtd))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Start the web server
    pub async fn serve(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        axum::serve(listener, self.app).await?;
        Ok(())
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub service: GuideService,
}

impl AppState {
    pub fn new(service: GuideService) -> Self {
        Self { service }
    }
}
