// Copyright (c) 2026 Easel Labs
// SPDX-License-Identifier: AGPL-3.0

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::application::admission::{AdmissionError, AdmissionService, SubmitJob};
use crate::application::session::{DraftSession, DraftSessionStore};
use crate::application::status::StatusService;
use crate::domain::job::{JobId, UserId};

pub struct AppState {
    pub admission: Arc<AdmissionService>,
    pub status: Arc<StatusService>,
    pub drafts: Arc<DraftSessionStore>,
}

pub fn app(
    admission: Arc<AdmissionService>,
    status: Arc<StatusService>,
    drafts: Arc<DraftSessionStore>,
) -> Router {
    let state = Arc::new(AppState { admission, status, drafts });

    Router::new()
        .route("/jobs", post(submit_job))
        .route("/jobs/{id}", get(job_status))
        .route("/conversations/{id}/draft", get(get_draft).put(put_draft))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Deserialize)]
pub struct SubmitJobRequest {
    pub user_id: String,
    pub prompt: String,
    /// Optional when a conversation draft already carries a model.
    #[serde(default)]
    pub model_id: Option<String>,
    /// Conversation whose draft fills in unset fields.
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub configuration: JobConfiguration,
    #[serde(default)]
    pub source_files: Vec<String>,
}

#[derive(Deserialize, Default)]
pub struct JobConfiguration {
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub auxiliary_files: Vec<String>,
}

async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitJobRequest>,
) -> impl IntoResponse {
    let user_id = match Uuid::parse_str(&payload.user_id) {
        Ok(id) => UserId(id),
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "user_id must be a UUID"})),
            );
        }
    };

    let draft = payload
        .conversation_id
        .as_deref()
        .and_then(|c| state.drafts.get(c))
        .unwrap_or_default();

    let Some(model_id) = payload.model_id.or(draft.model_id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "model_id is required (none set on the draft either)"})),
        );
    };
    let source_files = if payload.source_files.is_empty() {
        draft.reference_files
    } else {
        payload.source_files
    };

    let cmd = SubmitJob {
        user_id,
        model_id,
        prompt: payload.prompt,
        source_files,
        auxiliary_files: payload.configuration.auxiliary_files,
        aspect_ratio: payload.configuration.aspect_ratio.or(draft.aspect_ratio),
    };

    match state.admission.submit(cmd).await {
        Ok(job_id) => {
            if let Some(conversation) = payload.conversation_id.as_deref() {
                state.drafts.clear(conversation);
            }
            (
                StatusCode::ACCEPTED,
                Json(json!({"job_id": job_id.to_string(), "status": "queued"})),
            )
        }
        Err(AdmissionError::Validation(message)) => {
            (StatusCode::BAD_REQUEST, Json(json!({"error": message})))
        }
        Err(AdmissionError::InsufficientFunds { balance, required }) => (
            StatusCode::PAYMENT_REQUIRED,
            Json(json!({
                "error": "insufficient funds",
                "balance": balance,
                "required": required,
            })),
        ),
        Err(AdmissionError::Internal(e)) => {
            tracing::error!(error = %e, "admission failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal error"})),
            )
        }
    }
}

async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let job_id = match Uuid::parse_str(&id) {
        Ok(id) => JobId(id),
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "job id must be a UUID"})),
            );
        }
    };

    match state.status.get_status(job_id).await {
        Ok(Some(view)) => match serde_json::to_value(&view) {
            Ok(body) => (StatusCode::OK, Json(body)),
            Err(e) => {
                tracing::error!(job = %job_id, error = %e, "failed to encode status");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "internal error"})),
                )
            }
        },
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({"error": "job not found"}))),
        Err(e) => {
            tracing::error!(job = %job_id, error = %e, "status query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal error"})),
            )
        }
    }
}

#[derive(Deserialize)]
pub struct DraftUpdate {
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    /// Appended to the draft's reference files.
    #[serde(default)]
    pub reference_files: Vec<String>,
}

async fn get_draft(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.drafts.get(&id) {
        Some(draft) => draft_response(StatusCode::OK, &draft),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "no draft for conversation"}))),
    }
}

async fn put_draft(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(update): Json<DraftUpdate>,
) -> impl IntoResponse {
    state.drafts.update(&id, |draft| {
        if let Some(model_id) = update.model_id {
            draft.model_id = Some(model_id);
        }
        if let Some(aspect_ratio) = update.aspect_ratio {
            draft.aspect_ratio = Some(aspect_ratio);
        }
        draft.reference_files.extend(update.reference_files);
    });

    match state.drafts.get(&id) {
        Some(draft) => draft_response(StatusCode::OK, &draft),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "internal error"})),
        ),
    }
}

fn draft_response(status: StatusCode, draft: &DraftSession) -> (StatusCode, Json<serde_json::Value>) {
    match serde_json::to_value(draft) {
        Ok(body) => (status, Json(body)),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode draft");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal error"})),
            )
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}
