//! Integration tests for the HTTP API.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

use common::{StubClient, test_app};

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ============================================================================
// Health Endpoints
// ============================================================================

#[tokio::test]
async fn test_livez() {
    let app = test_app(StubClient::echoing());

    let response = app
        .oneshot(Request::get("/livez").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn test_version() {
    let app = test_app(StubClient::echoing());

    let response = app
        .oneshot(Request::get("/version").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json.get("version").is_some());
}

// ============================================================================
// Chat API
// ============================================================================

#[tokio::test]
async fn test_chat_round_trip() {
    let app = test_app(StubClient::replies(&["hi there"]));

    let response = app
        .oneshot(post_json(
            "/api/v1/chat",
            json!({"thread_id": "t1", "content": "hello"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["thread_id"], "t1");
    assert_eq!(json["role"], "assistant");
    assert_eq!(json["content"], "hi there");
    assert!(
        json["message_id"]
            .as_str()
            .is_some_and(|id| id.starts_with("msg_"))
    );
}

#[tokio::test]
async fn test_chat_keeps_history_across_requests() {
    let app = test_app(StubClient::echoing());

    for content in ["one", "two"] {
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/v1/chat",
                json!({"thread_id": "t1", "content": content}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(Request::get("/api/v1/threads/t1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["turns"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_chat_rejects_empty_fields() {
    let app = test_app(StubClient::echoing());

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/chat",
            json!({"thread_id": "", "content": "hello"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_json(
            "/api/v1/chat",
            json!({"thread_id": "t1", "content": ""}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_maps_provider_rejection_to_bad_gateway() {
    let app = test_app(StubClient::scripted(vec![Err(
        parley::llm::LLMError::Api {
            status: 401,
            message: "bad key".to_string(),
        },
    )]));

    let response = app
        .oneshot(post_json(
            "/api/v1/chat",
            json!({"thread_id": "t1", "content": "hello"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"]["code"], "bad_gateway");
}

// ============================================================================
// Threads API
// ============================================================================

#[tokio::test]
async fn test_list_threads_empty() {
    let app = test_app(StubClient::echoing());

    let response = app
        .oneshot(Request::get("/api/v1/threads").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["threads"], json!([]));
}

#[tokio::test]
async fn test_get_thread_not_found() {
    let app = test_app(StubClient::echoing());

    let response = app
        .oneshot(
            Request::get("/api/v1/threads/unknown")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_delete_thread() {
    let app = test_app(StubClient::echoing());

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/chat",
            json!({"thread_id": "t1", "content": "hello"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::delete("/api/v1/threads/t1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(
            Request::delete("/api/v1/threads/t1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
