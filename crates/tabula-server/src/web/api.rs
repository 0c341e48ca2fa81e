// crates/tabula-server/src/web/api.rs
// REST API handlers

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tabula_types::{ChatRequest, ErrorBody, FieldError};

use crate::assistant::validate_request;
use crate::error::TabulaError;
use crate::web::state::AppState;

fn error_response(status: StatusCode, error: impl Into<String>, fields: Vec<FieldError>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: error.into(),
            fields,
        }),
    )
        .into_response()
}

// ═══════════════════════════════════════
// HEALTH
// ═══════════════════════════════════════

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ═══════════════════════════════════════
// CHAT
// ═══════════════════════════════════════

pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid request body",
                vec![FieldError {
                    field: "body".into(),
                    message: rejection.body_text(),
                }],
            );
        }
    };

    let fields = validate_request(&request);
    if !fields.is_empty() {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "validation failed", fields);
    }

    match state.assistant.chat(request).await {
        Ok(response) => Json(response).into_response(),
        Err(TabulaError::InvalidInput(msg)) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, msg, Vec::new())
        }
        Err(e) => {
            tracing::error!(error = %e, "Chat request failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_user_string(), Vec::new())
        }
    }
}

// ═══════════════════════════════════════
// SESSIONS
// ═══════════════════════════════════════

pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.assistant.list_sessions())
}

pub async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.assistant.session(&id) {
        Some(detail) => Json(detail).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("session {id} not found"), Vec::new()),
    }
}

pub async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if state.assistant.delete_session(&id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, format!("session {id} not found"), Vec::new())
    }
}

pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.assistant.stats())
}
