//! HTTP surface over the ingress layer.

use axum::{
    body::Bytes,
    extract::State,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderMap, StatusCode,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::WebhookConfig;
use crate::directory::InMemoryDirectory;
use crate::error::{BridgeError, Result};
use crate::ingress::{self, IngressResponse, GENERIC_SIGNATURE_HEADER, SIGNATURE_HEADER};
use crate::processor::EventProcessor;
use crate::signature::constant_time_eq;

/// Service name reported by `/health`
pub const SERVICE_NAME: &str = "call-activity-bridge";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    /// Pipeline every webhook delivery goes through
    pub processor: Arc<EventProcessor>,
    /// Signature secrets and enforcement
    pub webhook: Arc<WebhookConfig>,
    /// Set when the in-memory directory stands in for the CRM
    pub test_directory: Option<Arc<InMemoryDirectory>>,
    /// Bearer token guarding administrative routes
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    /// State without an admin token
    pub fn new(
        processor: Arc<EventProcessor>,
        webhook: WebhookConfig,
        test_directory: Option<Arc<InMemoryDirectory>>,
    ) -> Self {
        Self {
            processor,
            webhook: Arc::new(webhook),
            test_directory,
            admin_token: None,
        }
    }

    /// Require `Authorization: Bearer <token>` on administrative routes
    #[must_use]
    pub fn with_admin_token(mut self, token: Option<&str>) -> Self {
        self.admin_token = token.filter(|t| !t.trim().is_empty()).map(Arc::from);
        self
    }

    /// Whether an administrative request may proceed.
    ///
    /// With a configured token the bearer must match. Without one, only test
    /// mode allows administration.
    fn authorize_admin(&self, headers: &HeaderMap) -> std::result::Result<(), JsonResponse> {
        match &self.admin_token {
            Some(token) => {
                let provided = header(headers, AUTHORIZATION.as_str())
                    .and_then(|h| h.strip_prefix("Bearer "))
                    .map(str::trim)
                    .unwrap_or_default();
                if constant_time_eq(token.as_bytes(), provided.as_bytes()) {
                    Ok(())
                } else {
                    warn!("Rejected administrative request with missing or wrong token");
                    Err((StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" }))))
                }
            },
            None if self.test_directory.is_some() => Ok(()),
            None => Err((
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "Ledger administration is disabled" })),
            )),
        }
    }
}

type JsonResponse = (StatusCode, Json<Value>);

fn respond(response: IngressResponse) -> JsonResponse {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response.body))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook/dialpad", post(provider_webhook))
        .route("/webhook/generic", post(generic_webhook))
        .route("/mock/stats", get(mock_stats))
        .route("/mock/clear", post(mock_clear))
        .route("/admin/ledger/clear", post(clear_ledger))
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Webhook server listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| BridgeError::Other(format!("server error: {e}")))
}

async fn health(State(state): State<AppState>) -> JsonResponse {
    let mut body = json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "service": SERVICE_NAME,
        "mode": if state.test_directory.is_some() { "test" } else { "production" },
        "ledger_size": state.processor.ledger_size(),
    });
    if let (Some(directory), Value::Object(map)) = (&state.test_directory, &mut body) {
        map.insert("stats".into(), json!(directory.stats()));
    }
    (StatusCode::OK, Json(body))
}

async fn provider_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> JsonResponse {
    let response = ingress::handle_provider_webhook(
        &state.processor,
        &state.webhook,
        &body,
        header(&headers, CONTENT_TYPE.as_str()),
        header(&headers, SIGNATURE_HEADER),
    )
    .await;
    respond(response)
}

async fn generic_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> JsonResponse {
    respond(ingress::handle_generic_webhook(
        &state.webhook,
        &body,
        header(&headers, GENERIC_SIGNATURE_HEADER),
    ))
}

fn not_in_test_mode() -> JsonResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "Mock directory is not active" })),
    )
}

async fn mock_stats(State(state): State<AppState>) -> JsonResponse {
    match &state.test_directory {
        Some(directory) => (
            StatusCode::OK,
            Json(json!({
                "stats": directory.stats(),
                "contacts": directory.contacts(),
                "activities": directory.activities().len(),
            })),
        ),
        None => not_in_test_mode(),
    }
}

async fn mock_clear(State(state): State<AppState>) -> JsonResponse {
    match &state.test_directory {
        Some(directory) => {
            directory.clear();
            info!("Mock directory cleared");
            (
                StatusCode::OK,
                Json(json!({ "success": true, "message": "Mock data cleared" })),
            )
        },
        None => not_in_test_mode(),
    }
}

async fn clear_ledger(State(state): State<AppState>, headers: HeaderMap) -> JsonResponse {
    if let Err(rejection) = state.authorize_admin(&headers) {
        return rejection;
    }
    state.processor.clear_ledger();
    (
        StatusCode::OK,
        Json(json!({ "success": true, "message": "Ledger cleared" })),
    )
}
