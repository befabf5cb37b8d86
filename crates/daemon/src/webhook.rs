use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::any,
    Router,
};
use pushsync_common::outcome::SyncStatus;
use pushsync_common::signature::SIGNATURE_HEADER;
use tracing::error;

use crate::error::{ErrorCode, WebhookError};
use crate::git::worker::CommandExecutor;
use crate::sync::Synchronizer;

/// Webhook route. Every method reaches the handler so non-POST requests get
/// the plain-text 405 rather than axum's empty one.
pub fn router<E: CommandExecutor>(sync: Arc<Synchronizer<E>>, path: &str) -> Router {
    Router::new().route(path, any(handle_push::<E>)).with_state(sync)
}

async fn handle_push<E: CommandExecutor>(
    State(sync): State<Arc<Synchronizer<E>>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let token =
        headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok()).map(ToOwned::to_owned);

    // Detached so a client hanging up mid-sync cannot cancel git half-way.
    let task = tokio::spawn(async move {
        let mut log = sync.open_log();
        sync.handle(&method, token.as_deref(), &body, &mut log).await
    });

    match task.await {
        Ok(Ok(outcome)) if outcome.status == SyncStatus::Skipped => (
            StatusCode::OK,
            format!("Not the monitored branch: {}", outcome.branch),
        )
            .into_response(),
        Ok(Ok(outcome)) => (StatusCode::OK, Json(outcome)).into_response(),
        Ok(Err(reason)) => reason.into_response(),
        Err(join_error) => {
            error!(?join_error, "sync task failed");
            WebhookError::from_code(ErrorCode::ServerError).into_response()
        }
    }
}
