//! Axum application wiring.

use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use tower_http::timeout::TimeoutLayer;

use crate::handlers;
use crate::orchestrator::Orchestrator;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
}

pub fn build_app(state: AppState, request_timeout_seconds: u64) -> Router {
    let api_v1 = Router::new()
        .route("/chat", post(handlers::chat))
        .route("/threads", get(handlers::list_threads))
        .route(
            "/threads/{thread_id}",
            get(handlers::get_thread).delete(handlers::delete_thread),
        )
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )));

    Router::new()
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .route("/version", get(handlers::version))
        .nest("/api/v1", api_v1)
}
