//! HTTP surface.
//!
//! - `POST /api/fetch-code` with `{"email": "…"}` runs the retrieval pipeline
//! - `GET /health` answers `{"status":"ok"}`

use crate::error::{Error, ErrorCategory};
use crate::response::{normalize, Normalized};
use crate::retriever::CodeRelay;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, instrument, warn};

/// Shared state for the routes.
#[derive(Clone)]
pub struct AppState {
    /// The pipeline.
    pub relay: Arc<CodeRelay>,
    /// Hide failure detail from callers.
    pub production: bool,
}

impl AppState {
    /// Builds route state, taking the production flag from the relay's config.
    #[must_use]
    pub fn new(relay: Arc<CodeRelay>) -> Self {
        let production = relay.config().production;
        Self { relay, production }
    }
}

#[derive(Debug, Deserialize)]
struct FetchCodeRequest {
    #[serde(default)]
    email: Option<String>,
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/fetch-code", post(fetch_code))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// POST /api/fetch-code
#[instrument(name = "server::fetch_code", skip_all)]
async fn fetch_code(
    State(state): State<AppState>,
    payload: Result<Json<FetchCodeRequest>, JsonRejection>,
) -> Normalized {
    let result = match payload {
        Ok(Json(request)) => {
            let email = request.email.unwrap_or_default();
            state.relay.fetch_code(&email).await
        }
        Err(rejection) => Err(Error::MalformedRequest {
            message: rejection.body_text(),
        }),
    };

    match &result {
        Ok(finding) => info!(id = %finding.message_id, rule = finding.rule, "Request served"),
        Err(e) => match e.category() {
            ErrorCategory::Validation | ErrorCategory::NotRegistered => {
                debug!(error = %e, "Request rejected");
            }
            ErrorCategory::NotFound | ErrorCategory::FetchTimeout => {
                info!("No code or link found");
            }
            ErrorCategory::Connection => error!(error = ?e, "Mailbox retrieval failed"),
        },
    }

    normalize(result, state.production)
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Resolves when the process receives Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
