//! autoblog-server: HTTP backend.
//!
//! Provides:
//! - post CRUD and stored generation settings
//! - autopilot control: start, stop, run once, status
//! - autopilot state as Server-Sent Events
//! - Bearer token authentication for mutating and autopilot routes
//! - CORS for the browser dashboard, request tracing and a body size cap
//! - Boot recovery of a running autopilot

pub mod auth;
pub mod error;
pub mod handlers;
pub mod sse;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use autoblog_autopilot::{AutopilotDeps, SchedulerHandle};
use autoblog_config::{AutoBlogConfig, ServerConfig};
use autoblog_genai::GeminiClient;
use autoblog_storage::BlogStorage;

/// Shared server state.
pub struct AppState {
    pub storage: Arc<BlogStorage>,
    pub autopilot: Arc<SchedulerHandle>,
    pub auth_token: Option<String>,
}

/// Build the axum router over `state`.
///
/// Fails when a configured CORS origin is not a valid header value.
pub fn router(state: Arc<AppState>, config: &ServerConfig) -> anyhow::Result<Router> {
    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/posts", get(handlers::list_posts).post(handlers::create_post))
        .route(
            "/posts/{id}",
            get(handlers::get_post)
                .put(handlers::update_post)
                .delete(handlers::delete_post),
        )
        .route(
            "/settings",
            get(handlers::get_settings).post(handlers::save_settings),
        )
        .route("/autopilot/start", post(handlers::start_autopilot))
        .route("/autopilot/stop", post(handlers::stop_autopilot))
        .route("/autopilot/run", post(handlers::run_autopilot))
        .route("/autopilot/status", get(handlers::autopilot_status))
        .route("/autopilot/events", get(sse::autopilot_events))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(cors_layer(&config.cors_origins)?)
        .layer(TraceLayer::new_for_http());
    Ok(app)
}

/// Any origin when none are configured, otherwise exactly the listed ones.
fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    if origins.is_empty() {
        return Ok(CorsLayer::permissive());
    }
    let origins = origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any))
}

/// Start the HTTP server.
///
/// Opens storage, resumes the durable autopilot if it was running when the
/// process last exited, then serves until Ctrl-C.
pub async fn start_server(config: AutoBlogConfig, port_override: Option<u16>) -> anyhow::Result<()> {
    let port = port_override.unwrap_or(config.server.port);
    let host = config.server.host.clone();

    let db_path = config.db_path()?;
    let storage = Arc::new(BlogStorage::open(&db_path)?);
    info!("Storage initialized: {}", db_path.display());

    let generator = GeminiClient::new(&config.gemini)?;
    if !generator.has_api_key() {
        warn!("No Gemini API key configured; generation jobs will fail until one is set");
    }

    let deps = AutopilotDeps {
        store: storage.clone(),
        content: storage.clone(),
        generator: Arc::new(generator),
    };
    let autopilot = Arc::new(SchedulerHandle::new(deps, config.autopilot.clone()));
    match autopilot.resume().await {
        Ok(true) => info!("Autopilot resumed from saved state"),
        Ok(false) => {}
        Err(e) => warn!("Autopilot resume failed: {e}"),
    }

    let state = Arc::new(AppState {
        storage,
        autopilot,
        auth_token: config.server.auth_token.clone(),
    });
    let app = router(state, &config.server)?;

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    info!("Server listening on {addr}");
    info!("  Health:    http://{addr}/health");
    info!("  Autopilot: http://{addr}/autopilot/status");
    if config.server.auth_token.is_some() {
        info!("  Auth:      bearer token required");
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}
