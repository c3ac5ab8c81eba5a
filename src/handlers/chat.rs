//! Chat submission handler.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::error;
use ulid::Ulid;

use crate::orchestrator::SubmitError;
use crate::response;
use crate::server::AppState;

/// ID prefix for assistant messages.
pub const MESSAGE_ID_PREFIX: &str = "msg_";

#[derive(Deserialize)]
pub struct ChatRequestBody {
    pub thread_id: String,
    pub content: String,
}

#[derive(Serialize)]
pub struct ChatResponseBody {
    pub thread_id: String,
    pub message_id: String,
    pub role: String,
    pub content: String,
}

/// POST /api/v1/chat
///
/// Submits one user turn and returns the assistant's reply. Axum drops this
/// future when the client disconnects, which cancels the submit before
/// anything is appended.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequestBody>,
) -> Response {
    let reply = match state.orchestrator.submit(&req.thread_id, &req.content).await {
        Ok(turn) => turn,
        Err(err) => return submit_error_response(&err),
    };

    let body = ChatResponseBody {
        thread_id: req.thread_id,
        message_id: format!("{}{}", MESSAGE_ID_PREFIX, Ulid::new()),
        role: reply.role.to_string(),
        content: reply.content,
    };

    (StatusCode::OK, Json(body)).into_response()
}

/// Map a typed submit failure to an HTTP response.
pub fn submit_error_response(err: &SubmitError) -> Response {
    match err {
        SubmitError::Validation(message) => response::bad_request(message.clone()),
        SubmitError::Busy => {
            response::conflict("another call for this thread is in flight")
        }
        SubmitError::Overloaded => {
            response::too_many_requests("no provider capacity, try again later")
        }
        SubmitError::UpstreamUnavailable { .. } => {
            response::service_unavailable("model provider unavailable")
        }
        SubmitError::UpstreamRejected(_) => {
            response::bad_gateway("model provider rejected the request")
        }
        SubmitError::Cancelled => response::request_timeout("request abandoned"),
        SubmitError::DeadlineExceeded => {
            response::gateway_timeout("request deadline exceeded")
        }
        SubmitError::Session(e) => {
            error!(error = %e, "session failure during submit");
            response::internal_error("internal session failure")
        }
    }
}
