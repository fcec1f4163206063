//! Pass-through proxy for `/api/users`
//!
//! Requests are forwarded to the directory API's `/users` unchanged. When the
//! upstream reply is JSON its status and body are relayed as-is; a network
//! failure or a non-JSON reply becomes a 500 with a fixed message.

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use reqwest::Method;

use crate::directory::{DirectoryClient, UpstreamResponse};
use crate::error::Result;

/// Proxied collection path
pub const USERS_PATH: &str = "/api/users";

pub const LIST_FAILED: &str = "Failed to fetch users";
pub const CREATE_FAILED: &str = "Failed to create user";

/// Routes for the users proxy
pub fn proxy_router(directory: DirectoryClient, max_upload_bytes: usize) -> Router {
    Router::new()
        .route(USERS_PATH, get(list_users).post(create_user))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(directory)
}

async fn list_users(State(directory): State<DirectoryClient>) -> Response {
    let result = directory.forward(Method::GET, None, Bytes::new()).await;
    relay(result, LIST_FAILED)
}

async fn create_user(
    State(directory): State<DirectoryClient>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let result = directory.forward(Method::POST, content_type, body).await;
    relay(result, CREATE_FAILED)
}

fn relay(result: Result<UpstreamResponse>, failure: &'static str) -> Response {
    match result {
        Ok(upstream) if upstream.is_json() => {
            let status =
                StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
            let content_type = upstream
                .content_type
                .unwrap_or_else(|| mime::APPLICATION_JSON.to_string());
            (
                status,
                [(header::CONTENT_TYPE, content_type)],
                Body::from(upstream.body),
            )
                .into_response()
        }
        Ok(upstream) => {
            tracing::error!(
                status = upstream.status,
                "{}: upstream reply is not JSON",
                failure
            );
            failure_response(failure)
        }
        Err(e) => {
            tracing::error!("{}: {}", failure, e);
            failure_response(failure)
        }
    }
}

fn failure_response(message: &'static str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "message": message })),
    )
        .into_response()
}
