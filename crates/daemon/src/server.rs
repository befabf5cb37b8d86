use std::{sync::Arc, time::Instant};

use anyhow::Context;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::DaemonConfig;
use crate::error::{attach_request_id_header, request_id_from_headers_or_generate};
use crate::git::worker::CommandExecutor;
use crate::sync::Synchronizer;
use crate::webhook;

pub const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

pub fn build_router<E: CommandExecutor>(sync: Arc<Synchronizer<E>>, webhook_path: &str) -> Router {
    apply_middleware(
        Router::new().route("/healthz", get(healthz)).merge(webhook::router(sync, webhook_path)),
    )
}

pub fn apply_middleware(router: Router) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

/// Bind the configured address and serve until SIGINT/SIGTERM.
pub async fn serve(config: DaemonConfig) -> anyhow::Result<()> {
    let DaemonConfig { listen_addr, webhook_path, target, .. } = config;

    info!(
        repo = %target.repo_path.display(),
        branch = %target.branch,
        remote = %target.remote,
        log = %target.log_path.display(),
        "monitoring working tree"
    );
    let sync = Arc::new(Synchronizer::new(target));
    let app = build_router(sync, &webhook_path);

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind webhook listener on {listen_addr}"))?;

    info!(%listen_addr, path = %webhook_path, "starting webhook server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("webhook server exited unexpectedly")
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request_id_from_headers_or_generate(request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response = next.run(request).await;
    attach_request_id_header(&mut response, &request_id);

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started_at.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}
