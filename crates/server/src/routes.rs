use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tawar_core::domain::session::SessionId;
use tawar_core::errors::{ApplicationError, InterfaceError};

use crate::exchange::ExchangeService;
use crate::identity::IdentityResolver;

#[derive(Clone)]
pub struct AppState {
    pub exchange: Arc<ExchangeService>,
    pub identity: Arc<dyn IdentityResolver>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(post_chat))
        .route("/chat/inbox", get(get_inbox))
        .route("/chat/history/{session_id}", get(get_history))
        .route("/chat/{session_id}/abandon", post(post_abandon))
        .route("/checkout/{session_id}", get(get_checkout))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub product_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub reply: String,
    pub accepted: bool,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub speaker: &'static str,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct InboxEntry {
    pub session_id: String,
    pub product_id: String,
    pub state: &'static str,
    pub last_message: Option<String>,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct AbandonResponse {
    pub session_id: String,
    pub state: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub final_price: i64,
    pub created_at: DateTime<Utc>,
}

async fn post_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let correlation_id = new_correlation_id();
    let buyer_id = state
        .identity
        .resolve_buyer(&headers)
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;

    let outcome = state
        .exchange
        .post_message(&buyer_id, &request.product_id, &request.message)
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;

    Ok(Json(ChatResponse {
        session_id: outcome.session_id.0,
        reply: outcome.visible_text,
        accepted: outcome.accepted,
    }))
}

async fn get_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let correlation_id = new_correlation_id();
    let turns = state
        .exchange
        .history(&SessionId(session_id))
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;

    Ok(Json(
        turns
            .into_iter()
            .map(|turn| HistoryEntry {
                speaker: turn.speaker.as_str(),
                text: turn.text,
                timestamp: turn.created_at,
            })
            .collect(),
    ))
}

async fn get_inbox(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<InboxEntry>>, ApiError> {
    let correlation_id = new_correlation_id();
    let buyer_id = state
        .identity
        .resolve_buyer(&headers)
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;

    let summaries = state
        .exchange
        .inbox(&buyer_id)
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;

    Ok(Json(
        summaries
            .into_iter()
            .map(|summary| InboxEntry {
                session_id: summary.session.id.0,
                product_id: summary.session.product_id.0,
                state: summary.session.state.as_str(),
                last_message: summary.last_message,
                last_activity: summary.last_activity,
            })
            .collect(),
    ))
}

async fn post_abandon(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<AbandonResponse>, ApiError> {
    let correlation_id = new_correlation_id();
    let session = state
        .exchange
        .abandon(&SessionId(session_id))
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;

    Ok(Json(AbandonResponse { session_id: session.id.0, state: session.state.as_str() }))
}

async fn get_checkout(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let correlation_id = new_correlation_id();
    let agreement = state
        .exchange
        .checkout(&SessionId(session_id))
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;

    Ok(Json(CheckoutResponse {
        session_id: agreement.session_id.0,
        final_price: agreement.final_price,
        created_at: agreement.created_at,
    }))
}

fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        tracing::warn!(
            event_name = "server.request_failed",
            correlation_id = correlation_id,
            error = %error,
            "request failed"
        );
        Self(error.into_interface(correlation_id))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: &'static str,
    correlation_id: String,
    retryable: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, correlation_id, retryable) = match &self.0 {
            InterfaceError::BadRequest { correlation_id, .. } => {
                (StatusCode::BAD_REQUEST, "bad_request", correlation_id.clone(), false)
            }
            InterfaceError::NotFound { correlation_id, .. } => {
                (StatusCode::NOT_FOUND, "not_found", correlation_id.clone(), false)
            }
            InterfaceError::Conflict { correlation_id, .. } => {
                (StatusCode::CONFLICT, "conflict", correlation_id.clone(), false)
            }
            InterfaceError::ServiceUnavailable { correlation_id, .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", correlation_id.clone(), true)
            }
            InterfaceError::Internal { correlation_id, .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", correlation_id.clone(), false)
            }
        };

        // Only the user-safe message crosses the wire; details stay in logs.
        let body = ErrorBody {
            error,
            message: self.0.user_message(),
            correlation_id,
            retryable,
        };
        (status, Json(body)).into_response()
    }
}
