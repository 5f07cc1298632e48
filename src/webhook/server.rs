//! HTTP surface: `POST /mirror`.

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::HeaderMap,
    middleware::{self, Next},
    response::Response,
    routing::post,
    Router,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::dispatch::Dispatcher;
use super::event::EventKind;
use crate::error::HookError;

pub const TOKEN_HEADER: &str = "X-Gitlab-Token";
pub const EVENT_HEADER: &str = "X-Gitlab-Event";

pub fn router(dispatcher: Arc<Dispatcher>, secret: impl Into<String>) -> Router {
    let secret: Arc<str> = Arc::from(secret.into());

    Router::new()
        .route("/mirror", post(receive))
        .route_layer(middleware::from_fn_with_state(secret, token_auth))
        .with_state(dispatcher)
}

/// Rejects the request before the body is read unless the shared secret matches
async fn token_auth(
    State(expected): State<Arc<str>>,
    request: Request,
    next: Next,
) -> Result<Response, HookError> {
    let Some(token) = request
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
    else {
        warn!("Webhook rejected: missing {} header", TOKEN_HEADER);
        return Err(HookError::Forbidden);
    };

    let expected_bytes = expected.as_bytes();
    let token_bytes = token.as_bytes();

    if expected_bytes.is_empty() || expected_bytes.len() != token_bytes.len() {
        warn!("Webhook rejected: token mismatch");
        return Err(HookError::Forbidden);
    }

    if expected_bytes.ct_eq(token_bytes).into() {
        Ok(next.run(request).await)
    } else {
        warn!("Webhook rejected: token mismatch");
        Err(HookError::Forbidden)
    }
}

async fn receive(
    State(dispatcher): State<Arc<Dispatcher>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<String, HookError> {
    let header = headers
        .get(EVENT_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    let kind = EventKind::from_header(header).ok_or_else(|| HookError::UnknownEvent(header.to_string()))?;

    let event = kind
        .decode(&body)
        .map_err(|e| HookError::BadPayload(e.to_string()))?;
    debug!(kind = ?kind, event = event.name(), "Received webhook");

    Ok(dispatcher.dispatch(event).await.to_string())
}
