use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub storage: String,
    pub backend: String,
    pub version: String,
}

fn connectivity(ok: bool) -> String {
    if ok { "connected" } else { "disconnected" }.to_string()
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = connectivity(state.db.ping().await.is_ok());
    let storage = connectivity(state.store.ping().await.is_ok());

    Json(HealthResponse {
        status: "ok".to_string(),
        database,
        storage,
        backend: state.store.backend_name().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
