//! Thread inspection and eviction handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use crate::llm::Turn;
use crate::response;
use crate::server::AppState;
use crate::session::ThreadSummary;

#[derive(Serialize)]
pub struct ListThreadsResponse {
    pub threads: Vec<ThreadSummary>,
}

#[derive(Serialize)]
pub struct GetThreadResponse {
    pub thread_id: String,
    pub created_at: String,
    pub last_activity: String,
    pub turns: Vec<Turn>,
}

/// GET /api/v1/threads
pub async fn list_threads(State(state): State<AppState>) -> Json<ListThreadsResponse> {
    Json(ListThreadsResponse {
        threads: state.orchestrator.sessions().list(),
    })
}

/// GET /api/v1/threads/{thread_id}
pub async fn get_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Response {
    let Some(thread) = state.orchestrator.sessions().get(&thread_id) else {
        return response::not_found("thread not found");
    };

    let body = GetThreadResponse {
        thread_id: thread.thread_id,
        created_at: thread.created_at.to_rfc3339(),
        last_activity: thread.last_activity.to_rfc3339(),
        turns: thread.turns,
    };

    (StatusCode::OK, Json(body)).into_response()
}

/// DELETE /api/v1/threads/{thread_id}
pub async fn delete_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Response {
    match state.orchestrator.sessions().remove(&thread_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => response::not_found("thread not found"),
        Err(e) => {
            error!(thread_id, error = %e, "failed to delete thread");
            response::internal_error("failed to delete thread")
        }
    }
}
