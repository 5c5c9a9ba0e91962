use crate::config::AppConfig;
use crate::models::{BlobId, FileRecord};
use crate::services::blob_store::{BlobError, BlobReader, BlobStore, BlobWriter};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("request has no file field named 'file'")]
    MissingField,

    #[error("malformed multipart body: {0}")]
    Multipart(String),

    #[error("file exceeds the maximum upload size of {limit} bytes")]
    TooLarge { limit: usize },

    #[error("upload did not complete within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Store(#[from] BlobError),
}

impl UploadError {
    /// Faults of the uploader rather than of the server.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, UploadError::Store(_))
    }
}

/// Upload, lookup and delete operations on top of a blob store.
pub struct FileService {
    store: Arc<dyn BlobStore>,
    config: AppConfig,
}

impl FileService {
    pub fn new(store: Arc<dyn BlobStore>, config: AppConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Streams `body` into a new blob named `filename`.
    ///
    /// The blob only becomes readable when the whole body was copied within the size
    /// limit and the deadline. On any failure the partial blob is discarded.
    pub async fn store_upload<S>(&self, filename: &str, body: S) -> Result<FileRecord, UploadError>
    where
        S: Stream<Item = Result<Bytes, UploadError>> + Send,
    {
        let mut writer = self.store.create(filename).await?;
        let deadline = self.config.upload_timeout();

        let copied = tokio::time::timeout(
            deadline,
            copy_into(&mut *writer, body, self.config.max_upload_size),
        )
        .await
        .unwrap_or(Err(UploadError::Timeout(deadline)));

        if let Err(e) = copied {
            let id = writer.id();
            let written = writer.written();
            if let Err(abort_err) = writer.abort().await {
                tracing::warn!("Failed to discard partial blob {}: {}", id, abort_err);
            } else {
                tracing::debug!("Discarded partial blob {} after {} bytes", id, written);
            }
            return Err(e);
        }

        Ok(writer.finish().await?)
    }

    pub async fn resolve(&self, id: BlobId) -> Result<FileRecord, BlobError> {
        self.store.stat(id).await
    }

    /// Resolves every id independently. Each id appears in the result; ids that are
    /// missing or could not be read map to `None`.
    pub async fn resolve_many(&self, ids: &[BlobId]) -> HashMap<BlobId, Option<FileRecord>> {
        futures::stream::iter(ids.iter().copied())
            .map(|id| async move {
                let record = match self.store.stat(id).await {
                    Ok(record) => Some(record),
                    Err(BlobError::NotFound(_)) => None,
                    Err(e) => {
                        tracing::warn!("Failed to resolve blob {}: {}", id, e);
                        None
                    }
                };
                (id, record)
            })
            .buffer_unordered(self.config.batch_concurrency.max(1))
            .collect()
            .await
    }

    pub async fn open(&self, id: BlobId) -> Result<BlobReader, BlobError> {
        self.store.open(id).await
    }

    pub async fn delete(&self, id: BlobId) -> Result<(), BlobError> {
        self.store.remove(id).await
    }
}

async fn copy_into<S>(writer: &mut dyn BlobWriter, body: S, limit: usize) -> Result<(), UploadError>
where
    S: Stream<Item = Result<Bytes, UploadError>> + Send,
{
    let mut body = std::pin::pin!(body);
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        if writer.written() + chunk.len() as u64 > limit as u64 {
            return Err(UploadError::TooLarge { limit });
        }
        writer.write(&chunk).await?;
    }
    Ok(())
}
