use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Which backend holds blob content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobBackend {
    /// Content split into rows of `blob_chunks` in the main database
    Chunked,
    /// Content stored as objects in an S3-compatible bucket
    S3,
}

impl FromStr for BlobBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chunked" | "database" | "db" => Ok(BlobBackend::Chunked),
            "s3" | "minio" => Ok(BlobBackend::S3),
            other => Err(format!("unknown blob backend '{}'", other)),
        }
    }
}

/// Connection settings for the S3 backend
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
}

/// Runtime configuration for the asset server
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Database URL (default: "sqlite::memory:")
    pub database_url: String,

    /// Blob content backend (default: chunked)
    pub blob_backend: BlobBackend,

    /// Only read when `blob_backend` is S3
    pub s3: Option<S3Config>,

    /// Bytes per stored chunk row, or per multipart part for S3 (default: 255 KB)
    pub chunk_size: usize,

    /// Largest accepted upload in bytes (default: 64 MB)
    pub max_upload_size: usize,

    /// Deadline for streaming one upload into the store (default: 300s)
    pub upload_timeout_secs: u64,

    /// `max-age` sent with downloaded assets (default: 3600)
    pub cache_max_age: u64,

    /// HMAC secret for session tokens
    pub session_secret: String,

    /// Parallel lookups during batch metadata resolution (default: 8)
    pub batch_concurrency: usize,

    /// How often the orphan sweeper runs (default: 900s)
    pub sweep_interval_secs: u64,

    /// Minimum age of an unreferenced chunk before it is swept (default: 3600s)
    pub orphan_grace_secs: u64,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            blob_backend: BlobBackend::Chunked,
            s3: None,
            chunk_size: 255 * 1024,
            max_upload_size: 64 * 1024 * 1024, // 64 MB
            upload_timeout_secs: 300,
            cache_max_age: 3600,
            session_secret: "secret".to_string(),
            batch_concurrency: 8,
            sweep_interval_secs: 900,
            orphan_grace_secs: 3600,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        let blob_backend = match env::var("BLOB_BACKEND") {
            Ok(v) => v.parse().unwrap_or_else(|e| {
                tracing::warn!("{}, falling back to chunked storage", e);
                BlobBackend::Chunked
            }),
            Err(_) => default.blob_backend,
        };

        let config = Self {
            database_url: env::var("DATABASE_URL").unwrap_or(default.database_url),
            blob_backend,
            s3: S3Config::from_env(),
            chunk_size: parsed("CHUNK_SIZE").unwrap_or(default.chunk_size),
            max_upload_size: parsed("MAX_UPLOAD_SIZE").unwrap_or(default.max_upload_size),
            upload_timeout_secs: parsed("UPLOAD_TIMEOUT_SECS")
                .unwrap_or(default.upload_timeout_secs),
            cache_max_age: parsed("CACHE_MAX_AGE").unwrap_or(default.cache_max_age),
            session_secret: env::var("SESSION_SECRET").unwrap_or(default.session_secret),
            batch_concurrency: parsed("BATCH_CONCURRENCY").unwrap_or(default.batch_concurrency),
            sweep_interval_secs: parsed("SWEEP_INTERVAL_SECS")
                .unwrap_or(default.sweep_interval_secs),
            orphan_grace_secs: parsed("ORPHAN_GRACE_SECS").unwrap_or(default.orphan_grace_secs),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),
        };
        config.with_safe_orphan_grace()
    }

    /// Chunks of an upload still inside its deadline must never look orphaned, so the
    /// sweeper's grace period is raised to twice the upload timeout when set lower.
    pub fn with_safe_orphan_grace(mut self) -> Self {
        if self.orphan_grace_secs <= self.upload_timeout_secs {
            let raised = self.upload_timeout_secs.saturating_mul(2).max(1);
            tracing::warn!(
                "ORPHAN_GRACE_SECS={} does not exceed UPLOAD_TIMEOUT_SECS={}, using {}s",
                self.orphan_grace_secs,
                self.upload_timeout_secs,
                raised
            );
            self.orphan_grace_secs = raised;
        }
        self
    }

    /// Create config for development and tests (in-memory database, small chunks)
    pub fn development() -> Self {
        Self {
            chunk_size: 64 * 1024,
            sweep_interval_secs: 60,
            ..Self::default()
        }
    }

    /// Create config for production. Refuses to run on the development session secret.
    pub fn production() -> anyhow::Result<Self> {
        let config = Self::from_env();
        if env::var("SESSION_SECRET").is_err() {
            anyhow::bail!("SESSION_SECRET must be set in production");
        }
        if config.database_url.starts_with("sqlite::memory") {
            anyhow::bail!("DATABASE_URL must point at persistent storage in production");
        }
        Ok(config)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn cache_control(&self) -> String {
        format!("public, max-age={}", self.cache_max_age)
    }
}

impl S3Config {
    fn from_env() -> Option<Self> {
        Some(Self {
            endpoint: env::var("MINIO_ENDPOINT").ok()?,
            access_key: env::var("MINIO_ACCESS_KEY").ok()?,
            secret_key: env::var("MINIO_SECRET_KEY").ok()?,
            bucket: env::var("MINIO_BUCKET").ok()?,
            region: env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        })
    }
}
