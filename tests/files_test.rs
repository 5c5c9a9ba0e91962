mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::*;
use compose_assets::models::BlobId;
use serde_json::{Value, json};
use tower::ServiceExt;

fn lookup_request(token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/files/lookup")
        .header("Authorization", format!("Bearer {}", token))
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete_request(token: Option<&str>, id: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("DELETE")
        .uri(format!("/files/{}", id));
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_lookup_mixed_ids() {
    let (app, state) = setup_app().await;
    let token = session_token(&state);

    let first = upload(&app, &token, "first.png", b"first").await;
    let second = upload(&app, &token, "second.pdf", b"second file").await;
    let unknown = BlobId::generate().to_hex();

    let response = app
        .oneshot(lookup_request(
            &token,
            json!({ "ids": [first, second, unknown, "garbage"] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    let map = json.as_object().unwrap();
    assert_eq!(map.len(), 4);

    assert_eq!(json[&first]["_id"], first.as_str());
    assert_eq!(json[&first]["filename"], "first.png");
    assert_eq!(json[&first]["size"], 5);
    assert!(json[&first]["uploadDate"].is_string());
    assert_eq!(json[&second]["filename"], "second.pdf");
    assert!(json[&unknown].is_null());
    assert!(json["garbage"].is_null());
}

#[tokio::test]
async fn test_lookup_limits_and_session() {
    let (app, state) = setup_app().await;
    let token = session_token(&state);

    let response = app
        .clone()
        .oneshot(lookup_request(&token, json!({ "ids": [] })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({}));

    let too_many: Vec<String> = (0..1001).map(|_| BlobId::generate().to_hex()).collect();
    let response = app
        .clone()
        .oneshot(lookup_request(&token, json!({ "ids": too_many })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"].is_string());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/files/lookup")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"ids": []}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_delete_flow() {
    let (app, state) = setup_app().await;
    let token = session_token(&state);
    let id = upload(&app, &token, "obsolete.gif", b"GIF89a").await;

    let response = app.clone().oneshot(delete_request(None, &id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(delete_request(Some(&token), &id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/files/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(delete_request(Some(&token), &id))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(delete_request(Some(&token), "zzz"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_and_docs() {
    let (app, _state) = setup_app().await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-request-id").is_some());

    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["database"], "connected");
    assert_eq!(json["storage"], "connected");
    assert_eq!(json["backend"], "chunked");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert!(json["paths"]["/upload"].is_object());
    assert!(json["paths"]["/files/{id}"]["get"].is_object());
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let (app, _state) = setup_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "trace-me-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "trace-me-123");
}
