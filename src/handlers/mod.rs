//! HTTP request handlers.

mod chat;
mod threads;

pub use chat::{ChatRequestBody, ChatResponseBody, chat};
pub use threads::{delete_thread, get_thread, list_threads};

use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

use crate::build_info;

pub async fn livez() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

pub async fn readyz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
}

pub async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: build_info::VERSION,
    })
}
