use super::{BlobError, BlobReader, BlobStore, BlobWriter, find_file, to_record};
use crate::entities::prelude::*;
use crate::models::{BlobId, FileRecord};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use chrono::{SubsecRound, Utc};
use sea_orm::{DatabaseConnection, EntityTrait, TransactionTrait};
use sha2::{Digest, Sha256};
use tokio_util::io::ReaderStream;

/// S3 rejects non-final multipart parts smaller than this.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

fn object_key(id: BlobId) -> String {
    format!("blobs/{}", id)
}

fn storage_err<E: std::error::Error>(e: E) -> BlobError {
    BlobError::Storage(DisplayErrorContext(e).to_string())
}

/// Keeps content in an S3-compatible bucket, metadata in `blob_files`.
pub struct S3BlobStore {
    db: DatabaseConnection,
    client: Client,
    bucket: String,
    part_size: usize,
}

impl S3BlobStore {
    pub fn new(db: DatabaseConnection, client: Client, bucket: String, part_size: usize) -> Self {
        Self {
            db,
            client,
            bucket,
            part_size: part_size.max(MIN_PART_SIZE),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn create(&self, filename: &str) -> Result<Box<dyn BlobWriter>, BlobError> {
        let id = BlobId::generate();
        let key = object_key(id);

        let multipart_upload_res = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(storage_err)?;

        let upload_id = multipart_upload_res
            .upload_id()
            .ok_or_else(|| BlobError::Storage("No upload ID".to_string()))?
            .to_string();

        Ok(Box::new(S3BlobWriter {
            db: self.db.clone(),
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key,
            upload_id,
            id,
            filename: filename.to_string(),
            part_size: self.part_size,
            buffer: Vec::new(),
            parts: Vec::new(),
            written: 0,
            hasher: Sha256::new(),
            settled: false,
        }))
    }

    async fn open(&self, id: BlobId) -> Result<BlobReader, BlobError> {
        let model = find_file(&self.db, id).await?;

        let res = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(object_key(id))
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    tracing::error!("Blob {} has metadata but no object", id);
                    BlobError::NotFound(id)
                } else {
                    storage_err(service_error)
                }
            })?;

        Ok(BlobReader {
            record: to_record(model)?,
            body: Box::pin(ReaderStream::new(res.body.into_async_read())),
        })
    }

    async fn stat(&self, id: BlobId) -> Result<FileRecord, BlobError> {
        to_record(find_file(&self.db, id).await?)
    }

    async fn remove(&self, id: BlobId) -> Result<(), BlobError> {
        let txn = self.db.begin().await?;

        let res = BlobFiles::delete_by_id(id.to_hex()).exec(&txn).await?;
        if res.rows_affected == 0 {
            txn.rollback().await?;
            return Err(BlobError::NotFound(id));
        }

        // Metadata delete stays uncommitted until the object is gone.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(object_key(id))
            .send()
            .await
            .map_err(storage_err)?;

        txn.commit().await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), BlobError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

pub struct S3BlobWriter {
    db: DatabaseConnection,
    client: Client,
    bucket: String,
    key: String,
    upload_id: String,
    id: BlobId,
    filename: String,
    part_size: usize,
    buffer: Vec<u8>,
    parts: Vec<CompletedPart>,
    written: u64,
    hasher: Sha256,
    settled: bool,
}

impl S3BlobWriter {
    async fn upload_part(&mut self, data: Vec<u8>) -> Result<(), BlobError> {
        let part_number = self.parts.len() as i32 + 1;
        let upload_part_res = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .body(ByteStream::from(data))
            .part_number(part_number)
            .send()
            .await
            .map_err(storage_err)?;

        self.parts.push(
            CompletedPart::builder()
                .e_tag(upload_part_res.e_tag().unwrap_or_default())
                .part_number(part_number)
                .build(),
        );
        Ok(())
    }

    async fn delete_object(&self) {
        if let Err(e) = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await
        {
            tracing::warn!("Failed to delete unpublished object {}: {}", self.key, DisplayErrorContext(e));
        }
    }
}

#[async_trait]
impl BlobWriter for S3BlobWriter {
    fn id(&self) -> BlobId {
        self.id
    }

    fn written(&self) -> u64 {
        self.written
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), BlobError> {
        self.hasher.update(data);
        self.written += data.len() as u64;
        self.buffer.extend_from_slice(data);

        if self.buffer.len() >= self.part_size {
            let part = std::mem::take(&mut self.buffer);
            self.upload_part(part).await?;
        }
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<FileRecord, BlobError> {
        // A multipart upload needs at least one part, even when empty.
        if !self.buffer.is_empty() || self.parts.is_empty() {
            let last = std::mem::take(&mut self.buffer);
            self.upload_part(last).await?;
        }

        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(std::mem::take(&mut self.parts)))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await
            .map_err(storage_err)?;
        self.settled = true;

        let record = FileRecord {
            id: self.id,
            filename: self.filename.clone(),
            upload_date: Utc::now().trunc_subsecs(3),
            size: self.written as i64,
            sha256: hex::encode(std::mem::take(&mut self.hasher).finalize()),
        };

        if let Err(e) = BlobFiles::insert(record.clone().into_active_model(self.part_size as i32))
            .exec_without_returning(&self.db)
            .await
        {
            self.delete_object().await;
            return Err(e.into());
        }

        Ok(record)
    }

    async fn abort(mut self: Box<Self>) -> Result<(), BlobError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .send()
            .await
            .map_err(storage_err)?;
        self.settled = true;
        Ok(())
    }
}

impl Drop for S3BlobWriter {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let key = self.key.clone();
        let upload_id = self.upload_id.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = client
                    .abort_multipart_upload()
                    .bucket(&bucket)
                    .key(&key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!("Failed to abort multipart upload {}: {}", key, DisplayErrorContext(e));
                }
            });
        }
    }
}
