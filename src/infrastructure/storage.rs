use crate::config::{AppConfig, BlobBackend};
use crate::services::blob_store::{BlobStore, ChunkedBlobStore, S3BlobStore};
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::info;

pub async fn setup_store(
    config: &AppConfig,
    db: DatabaseConnection,
) -> anyhow::Result<Arc<dyn BlobStore>> {
    match config.blob_backend {
        BlobBackend::Chunked => {
            info!(
                "🗄️  Blob Storage: database chunks ({} KB per chunk)",
                config.chunk_size / 1024
            );
            Ok(Arc::new(ChunkedBlobStore::new(db, config.chunk_size)))
        }
        BlobBackend::S3 => {
            let s3 = config.s3.as_ref().ok_or_else(|| {
                anyhow::anyhow!(
                    "BLOB_BACKEND=s3 needs MINIO_ENDPOINT, MINIO_ACCESS_KEY, MINIO_SECRET_KEY and MINIO_BUCKET"
                )
            })?;

            info!("☁️  S3 Storage: {} (Bucket: {})", s3.endpoint, s3.bucket);

            let aws_config = aws_config::from_env()
                .endpoint_url(&s3.endpoint)
                .region(Region::new(s3.region.clone()))
                .credentials_provider(aws_sdk_s3::config::Credentials::new(
                    s3.access_key.clone(),
                    s3.secret_key.clone(),
                    None,
                    None,
                    "static",
                ))
                .load()
                .await;

            let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(true)
                .build();

            let client = aws_sdk_s3::Client::from_conf(s3_config);
            ensure_bucket(&client, &s3.bucket).await?;

            Ok(Arc::new(S3BlobStore::new(
                db,
                client,
                s3.bucket.clone(),
                config.chunk_size,
            )))
        }
    }
}

async fn ensure_bucket(client: &aws_sdk_s3::Client, bucket: &str) -> anyhow::Result<()> {
    if client.head_bucket().bucket(bucket).send().await.is_ok() {
        return Ok(());
    }

    info!("🪣 Creating bucket {}", bucket);
    client
        .create_bucket()
        .bucket(bucket)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("bucket {} unavailable: {}", bucket, DisplayErrorContext(e)))?;
    Ok(())
}
