use crate::AppState;
use crate::api::error::AppError;
use crate::models::{BlobId, FileRecord};
use crate::utils::auth::Claims;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct LookupRequest {
    #[validate(length(max = 1000))]
    pub ids: Vec<String>,
}

/// Requested id mapped to its record, or `null` when it could not be resolved.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Object)]
pub struct LookupResponse(pub HashMap<String, Option<FileRecord>>);

#[utoipa::path(
    post,
    path = "/files/lookup",
    request_body = LookupRequest,
    responses(
        (status = 200, description = "Record or null for every requested id", body = LookupResponse),
        (status = 400, description = "More than 1000 ids"),
        (status = 401, description = "No valid session")
    ),
    security(
        ("session" = [])
    ),
    tag = "files"
)]
pub async fn lookup_files(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Json(req): Json<LookupRequest>,
) -> Result<Json<LookupResponse>, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let mut ids: Vec<BlobId> = req.ids.iter().filter_map(|raw| raw.parse().ok()).collect();
    ids.sort();
    ids.dedup();

    let resolved = state.file_service.resolve_many(&ids).await;

    let records = req
        .ids
        .into_iter()
        .map(|raw| {
            let record = raw
                .parse::<BlobId>()
                .ok()
                .and_then(|id| resolved.get(&id).cloned().flatten());
            (raw, record)
        })
        .collect();

    Ok(Json(LookupResponse(records)))
}

#[utoipa::path(
    delete,
    path = "/files/{id}",
    params(
        ("id" = String, Path, description = "Blob id (24 hex characters)")
    ),
    responses(
        (status = 204, description = "File deleted"),
        (status = 401, description = "No valid session"),
        (status = 404, description = "File not found")
    ),
    security(
        ("session" = [])
    ),
    tag = "files"
)]
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id: BlobId = raw_id
        .parse()
        .map_err(|_| AppError::NotFound(format!("file {} not found", raw_id)))?;

    state.file_service.delete(id).await?;

    tracing::info!("🗑️  {} deleted file {}", claims.sub, id);
    Ok(StatusCode::NO_CONTENT)
}
