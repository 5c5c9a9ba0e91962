pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::blob_store::BlobStore;
use crate::services::file_service::FileService;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::upload::upload_file,
        api::handlers::download::download_file,
        api::handlers::files::lookup_files,
        api::handlers::files::delete_file,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::upload::UploadResponse,
            api::handlers::files::LookupRequest,
            api::handlers::files::LookupResponse,
            api::handlers::health::HealthResponse,
            models::FileRecord,
        )
    ),
    modifiers(&SessionSecurity),
    tags(
        (name = "files", description = "Blob upload, download and lookup"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

struct SessionSecurity;

impl Modify for SessionSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
            components.add_security_scheme(
                "session_cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("session"))),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub store: Arc<dyn BlobStore>,
    pub file_service: Arc<FileService>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(db: DatabaseConnection, store: Arc<dyn BlobStore>, config: AppConfig) -> Self {
        let file_service = Arc::new(FileService::new(store.clone(), config.clone()));
        Self {
            db,
            store,
            file_service,
            config,
        }
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    let allow_origin = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any)
}

pub fn create_app(state: AppState) -> Router {
    let session = from_fn_with_state(state.clone(), api::middleware::auth::require_session);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/upload",
            post(api::handlers::upload::upload_file)
                .route_layer(session.clone())
                .route_layer(DefaultBodyLimit::max(
                    state.config.max_upload_size + MULTIPART_OVERHEAD,
                )),
        )
        .route(
            "/files/lookup",
            post(api::handlers::files::lookup_files).route_layer(session.clone()),
        )
        .route(
            "/files/:id",
            get(api::handlers::download::download_file)
                .merge(axum::routing::delete(api::handlers::files::delete_file).route_layer(session)),
        )
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors_layer(&state.config))
        .with_state(state)
}
