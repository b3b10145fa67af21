//! HTTP trigger surface.
//!
//! - `GET /` service banner
//! - `GET /health` liveness probe
//! - `GET /trigger?key=…` performs one run and reports the outcome
//!
//! Only one run executes at a time; a trigger arriving while a run is active
//! gets `409 Conflict` instead of queueing.

use crate::pipeline::RunTrigger;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

pub const SERVICE_NAME: &str = "Global News Digest";

struct AppState<R> {
    runner: Arc<R>,
    secret: Option<Arc<str>>,
    active: Arc<Mutex<()>>,
}

impl<R> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            secret: self.secret.clone(),
            active: Arc::clone(&self.active),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TriggerQuery {
    #[serde(default)]
    key: String,
}

/// Build the router around `runner`.
///
/// # Arguments
///
/// * `runner` - What `/trigger` runs
/// * `secret` - Required `key` query value; `None` leaves `/trigger` open
pub fn router<R: RunTrigger>(runner: Arc<R>, secret: Option<String>) -> Router {
    if secret.is_none() {
        warn!("TRIGGER_SECRET_KEY is not set; /trigger accepts every request");
    }
    let state = AppState {
        runner,
        secret: secret.map(Arc::from),
        active: Arc::new(Mutex::new(())),
    };
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health))
        .route("/trigger", get(trigger::<R>))
        .with_state(state)
}

async fn banner() -> Json<Value> {
    Json(json!({
        "status": "running",
        "service": SERVICE_NAME,
        "message": "Service is running. Use /trigger endpoint to run the news digest.",
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

#[instrument(level = "info", skip_all)]
async fn trigger<R: RunTrigger>(
    State(state): State<AppState<R>>,
    Query(query): Query<TriggerQuery>,
) -> (StatusCode, Json<Value>) {
    if let Some(secret) = &state.secret {
        if query.key.as_str() != secret.as_ref() {
            warn!("Rejected trigger with a wrong key");
            return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" })));
        }
    }

    let Ok(_guard) = state.active.try_lock() else {
        warn!("Trigger ignored; a run is already active");
        return (
            StatusCode::CONFLICT,
            Json(json!({ "status": "busy", "message": "A run is already in progress" })),
        );
    };

    match state.runner.trigger().await {
        Ok(report) => {
            info!(subject = %report.subject, "Triggered run succeeded");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "success",
                    "message": "News digest sent successfully",
                    "report": report,
                })),
            )
        }
        Err(e) => {
            error!(error = %e, "Triggered run failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": e.to_string() })),
            )
        }
    }
}

/// Serve the router on `0.0.0.0:{port}` until Ctrl-C or `cancel` fires.
///
/// Ctrl-C also cancels `cancel`, which stops an in-flight run at its next
/// retry point.
pub async fn serve<R: RunTrigger>(
    runner: Arc<R>,
    secret: Option<String>,
    port: u16,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    info!(addr = %listener.local_addr()?, "HTTP trigger listening");
    axum::serve(listener, router(runner, secret))
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!(error = %e, "Failed to listen for Ctrl-C");
                return;
            }
            info!("Shutdown requested");
            cancel.cancel();
        }
        _ = cancel.cancelled() => {}
    }
}
