//! HTTP surface: the admission endpoint and the health endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::admission::AdmissionReview;
use crate::config::WebhookConfig;
use crate::dispatcher::IpamAdmission;

/// State shared by the handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    admission: Arc<IpamAdmission>,
    request_timeout: Duration,
    shutdown: CancellationToken,
}

impl AppState {
    /// State for `admission`. Each request gets `request_timeout` and a
    /// child of `shutdown`.
    pub fn new(
        admission: Arc<IpamAdmission>,
        request_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            admission,
            request_timeout,
            shutdown,
        }
    }
}

/// Build the router: `POST {path}`, `GET /healthz`, `GET /readyz`.
pub fn router(state: AppState, path: &str, max_body_bytes: usize) -> Router {
    Router::new()
        .route(path, post(mutate))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router configured from `config`.
pub fn router_for(state: AppState, config: &WebhookConfig) -> Router {
    router(state, &config.path, config.max_body_bytes)
}

/// Serve `router` on `listener` until `shutdown` fires.
///
/// In-flight requests see the same cancellation and are answered before the
/// server returns.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn mutate(State(state): State<AppState>, body: Bytes) -> Response {
    let review: AdmissionReview = match serde_json::from_slice(&body) {
        Ok(review) => review,
        Err(e) => {
            tracing::warn!(error = %e, "body is not an AdmissionReview");
            return (
                StatusCode::BAD_REQUEST,
                format!("invalid AdmissionReview: {e}"),
            )
                .into_response();
        }
    };
    let Some(request) = review.request.clone() else {
        tracing::warn!("AdmissionReview without a request");
        return (StatusCode::BAD_REQUEST, "AdmissionReview has no request").into_response();
    };

    let deadline = Instant::now() + state.request_timeout;
    let response = state
        .admission
        .handle(&request, state.shutdown.child_token(), Some(deadline))
        .await;
    Json(review.reply(response)).into_response()
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn readyz(State(state): State<AppState>) -> StatusCode {
    if state.admission.registry().all_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
