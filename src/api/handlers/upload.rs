use crate::AppState;
use crate::models::FileRecord;
use crate::services::file_service::UploadError;
use crate::utils::auth::Claims;
use axum::{
    Extension, Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Outcome of an upload, tagged by `status`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UploadResponse {
    Success {
        message: String,
        #[serde(rename = "_id")]
        id: String,
    },
    Error {
        message: String,
    },
}

impl UploadError {
    fn status(&self) -> StatusCode {
        match self {
            UploadError::MissingField | UploadError::Multipart(_) => StatusCode::BAD_REQUEST,
            UploadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            UploadError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        if self.is_client_error() {
            tracing::warn!("Upload rejected: {}", self);
        } else {
            tracing::error!("Upload failed: {}", self);
        }

        let body = UploadResponse::Error {
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

fn multipart_error(e: MultipartError, limit: usize) -> UploadError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::TooLarge { limit }
    } else {
        UploadError::Multipart(e.body_text())
    }
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = Multipart, description = "Multipart form with a `file` field"),
    responses(
        (status = 200, description = "File stored", body = UploadResponse),
        (status = 400, description = "Missing or malformed file field", body = UploadResponse),
        (status = 401, description = "No valid session"),
        (status = 408, description = "Upload timed out", body = UploadResponse),
        (status = 413, description = "File too large", body = UploadResponse),
        (status = 500, description = "Storage failure", body = UploadResponse)
    ),
    security(
        ("session" = [])
    ),
    tag = "files"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, UploadError> {
    let mut multipart = multipart.map_err(|e| UploadError::Multipart(e.body_text()))?;
    let record = receive_file(&state, &mut multipart).await?;

    tracing::info!(
        "📦 {} uploaded {} ({} bytes) as {}",
        claims.sub,
        record.filename,
        record.size,
        record.id
    );

    Ok(Json(UploadResponse::Success {
        message: "file uploaded successfully".to_string(),
        id: record.id.to_hex(),
    }))
}

async fn receive_file(
    state: &AppState,
    multipart: &mut Multipart,
) -> Result<FileRecord, UploadError> {
    let limit = state.config.max_upload_size;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or("unnamed")
            .to_string();

        let body = field.map_err(move |e| multipart_error(e, limit));
        return state.file_service.store_upload(&filename, body).await;
    }

    Err(UploadError::MissingField)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_shape() {
        let json = serde_json::to_value(UploadResponse::Success {
            message: "file uploaded successfully".to_string(),
            id: "507f1f77bcf86cd799439011".to_string(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "success",
                "message": "file uploaded successfully",
                "_id": "507f1f77bcf86cd799439011"
            })
        );
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(UploadError::MissingField.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            UploadError::TooLarge { limit: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            UploadError::Timeout(std::time::Duration::from_secs(1)).status(),
            StatusCode::REQUEST_TIMEOUT
        );
    }
}
