//! JSON error responses shared by all handlers.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

fn error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: ErrorDetail {
                code,
                message: message.into(),
            },
        }),
    )
        .into_response()
}

pub fn bad_request(message: impl Into<String>) -> Response {
    error(StatusCode::BAD_REQUEST, "bad_request", message)
}

pub fn not_found(message: impl Into<String>) -> Response {
    error(StatusCode::NOT_FOUND, "not_found", message)
}

pub fn conflict(message: impl Into<String>) -> Response {
    error(StatusCode::CONFLICT, "conflict", message)
}

pub fn request_timeout(message: impl Into<String>) -> Response {
    error(StatusCode::REQUEST_TIMEOUT, "request_timeout", message)
}

pub fn too_many_requests(message: impl Into<String>) -> Response {
    error(StatusCode::TOO_MANY_REQUESTS, "too_many_requests", message)
}

pub fn bad_gateway(message: impl Into<String>) -> Response {
    error(StatusCode::BAD_GATEWAY, "bad_gateway", message)
}

pub fn service_unavailable(message: impl Into<String>) -> Response {
    error(StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", message)
}

pub fn gateway_timeout(message: impl Into<String>) -> Response {
    error(StatusCode::GATEWAY_TIMEOUT, "gateway_timeout", message)
}

pub fn internal_error(message: impl Into<String>) -> Response {
    error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
}
