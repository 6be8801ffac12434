mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::jobs::JobQueue;
use crate::publish::PlatformPublisher;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub queue: JobQueue,
    pub publisher: PlatformPublisher,
    pub config: Arc<Config>,
}

/// Start the JSON API and serve until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the address is invalid or the listener cannot bind.
pub async fn serve(state: AppState, shutdown: CancellationToken) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.web_host, state.config.web_port)
        .parse()
        .context("Invalid web server address")?;

    let app = create_app(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind web server")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Web server error")?;

    Ok(())
}

/// Build the application router with its middleware.
pub fn create_app(state: AppState) -> Router {
    let mut app = routes::router().layer(TraceLayer::new_for_http());

    // The web front end lives at BASE_URL and calls this API from the browser
    match HeaderValue::from_str(&state.config.base_url) {
        Ok(origin) => {
            app = app.layer(
                CorsLayer::new()
                    .allow_origin(origin)
                    .allow_methods([Method::GET, Method::POST, Method::DELETE])
                    .allow_headers([header::CONTENT_TYPE]),
            );
        }
        Err(e) => warn!(base_url = %state.config.base_url, "BASE_URL is not a valid origin, CORS disabled: {e}"),
    }

    app.with_state(state)
}
