#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use compose_assets::config::AppConfig;
use compose_assets::infrastructure::{database, storage};
use compose_assets::utils::auth::create_session_token;
use compose_assets::{AppState, create_app};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

pub const BOUNDARY: &str = "---------------------------123456789012345678901234567";

pub fn test_config() -> AppConfig {
    AppConfig {
        chunk_size: 16,
        ..AppConfig::development()
    }
}

pub async fn setup_state(config: AppConfig) -> AppState {
    let db = database::setup_database(&config).await.unwrap();
    let store = storage::setup_store(&config, db.clone()).await.unwrap();
    AppState::new(db, store, config)
}

pub async fn setup_app() -> (Router, AppState) {
    let state = setup_state(test_config()).await;
    (create_app(state.clone()), state)
}

pub fn session_token(state: &AppState) -> String {
    create_session_token("editor", &state.config.session_secret, 1).unwrap()
}

pub fn multipart_body(field: &str, filename: Option<&str>, content: &[u8]) -> Vec<u8> {
    let disposition = match filename {
        Some(name) => format!("form-data; name=\"{}\"; filename=\"{}\"", field, name),
        None => format!("form-data; name=\"{}\"", field),
    };

    let mut body = format!(
        "--{BOUNDARY}\r\n\
        Content-Disposition: {disposition}\r\n\
        Content-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(token: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header("Authorization", format!("Bearer {}", token))
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Uploads `content` as `filename` and returns the assigned id.
pub async fn upload(app: &Router, token: &str, filename: &str, content: &[u8]) -> String {
    let response = app
        .clone()
        .oneshot(upload_request(
            token,
            multipart_body("file", Some(filename), content),
        ))
        .await
        .unwrap();

    let status = response.status();
    let json = json_body(response).await;
    assert_eq!(status, 200, "upload failed: {}", json);
    json["_id"].as_str().unwrap().to_string()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let body = body_bytes(response).await;
    serde_json::from_slice(&body)
        .unwrap_or_else(|_| panic!("not json: {}", String::from_utf8_lossy(&body)))
}
