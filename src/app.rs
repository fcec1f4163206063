//! Combined HTTP server: registration page, users proxy and relay

use axum::{http::Method, response::Html, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::directory::DirectoryClient;
use crate::error::Result;
use crate::proxy::proxy_router;
use crate::realtime::{relay_router, RelayHub};

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Shared handles for the server's routes
#[derive(Clone)]
pub struct AppState {
    pub relay: RelayHub,
    pub directory: DirectoryClient,
}

impl AppState {
    /// Start a relay loop and build a directory client from `config`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            relay: RelayHub::start(),
            directory: DirectoryClient::new(&config.api_base_url)?,
        })
    }
}

/// All routes: `/`, `/api/users`, `/cable` and `/health`
pub fn app_router(state: AppState, config: &AppConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(index))
        .merge(proxy_router(state.directory, config.max_upload_bytes))
        .merge(relay_router(state.relay))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}
