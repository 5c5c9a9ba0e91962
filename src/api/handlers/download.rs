use crate::AppState;
use crate::api::error::AppError;
use crate::models::BlobId;
use crate::services::blob_store::BlobError;
use crate::utils::{http_date, mime_types};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;

#[utoipa::path(
    get,
    path = "/files/{id}",
    params(
        ("id" = String, Path, description = "Blob id (24 hex characters)"),
        ("If-Modified-Since" = Option<String>, Header, description = "HTTP date of the cached copy")
    ),
    responses(
        (status = 200, description = "File content stream"),
        (status = 304, description = "Cached copy is current"),
        (status = 404, description = "File not found")
    ),
    tag = "files"
)]
pub async fn download_file(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let Ok(id) = raw_id.parse::<BlobId>() else {
        tracing::debug!("Download of malformed id {:?}", raw_id);
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    let record = match state.file_service.resolve(id).await {
        Ok(record) => record,
        Err(BlobError::NotFound(_)) => return Ok(StatusCode::NOT_FOUND.into_response()),
        Err(e) => return Err(e.into()),
    };

    let last_modified = http_date::format(record.upload_date);
    let cache_control = state.config.cache_control();

    let since = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(http_date::parse);

    if since.is_some_and(|since| http_date::is_fresh(record.upload_date, since)) {
        return Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(header::LAST_MODIFIED, &last_modified)
            .header(header::CACHE_CONTROL, &cache_control)
            .body(Body::empty())
            .map_err(|e| AppError::Internal(e.to_string()));
    }

    // The blob may have been removed since the lookup above.
    let reader = match state.file_service.open(id).await {
        Ok(reader) => reader,
        Err(BlobError::NotFound(_)) => return Ok(StatusCode::NOT_FOUND.into_response()),
        Err(e) => return Err(e.into()),
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_LENGTH, reader.record.size)
        .header(header::LAST_MODIFIED, &last_modified)
        .header(header::CACHE_CONTROL, &cache_control);

    if let Some(content_type) = reader
        .record
        .extension()
        .and_then(|ext| mime_types::content_type_for(&ext))
    {
        builder = builder.header(header::CONTENT_TYPE, content_type.as_ref());
    }

    let body = reader.body.inspect_err(move |e| {
        tracing::error!("Stream of blob {} broke off: {}", id, e);
    });

    builder
        .body(Body::from_stream(body))
        .map_err(|e| AppError::Internal(e.to_string()))
}
