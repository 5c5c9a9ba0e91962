//! Blob store adapter.
//!
//! A store hands out writers for new blobs and readers for finished ones. Metadata for
//! every backend lives in the `blob_files` table; only the location of the content
//! differs between backends.

use crate::entities::{blob_files, prelude::*};
use crate::models::{BlobId, FileRecord};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use sea_orm::{ConnectionTrait, DbErr, EntityTrait};
use thiserror::Error;

pub mod chunked;
pub mod s3;

pub use chunked::ChunkedBlobStore;
pub use s3::S3BlobStore;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("blob {0} not found")]
    NotFound(BlobId),

    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl BlobError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BlobError::NotFound(_))
    }
}

/// Byte stream of a blob's content. Lazily fetched from the store while polled.
pub type BlobStream = BoxStream<'static, std::io::Result<Bytes>>;

/// An open, finished blob.
pub struct BlobReader {
    pub record: FileRecord,
    pub body: BlobStream,
}

/// Write handle for a blob that is not readable yet.
///
/// Exactly one of `finish` or `abort` should be called. A writer dropped without either
/// (early return, panic, cancelled task) cleans up whatever it already stored in the
/// background, so no partially written blob ever becomes readable.
#[async_trait]
pub trait BlobWriter: Send {
    /// Identifier the blob will be readable under once finished
    fn id(&self) -> BlobId;

    /// Bytes accepted so far
    fn written(&self) -> u64;

    async fn write(&mut self, data: &[u8]) -> Result<(), BlobError>;

    /// Flush remaining bytes and publish the blob's metadata.
    async fn finish(self: Box<Self>) -> Result<FileRecord, BlobError>;

    /// Discard everything written so far.
    async fn abort(self: Box<Self>) -> Result<(), BlobError>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Allocates a new blob under a display name. The id is assigned immediately.
    async fn create(&self, filename: &str) -> Result<Box<dyn BlobWriter>, BlobError>;

    /// Opens a finished blob for reading.
    async fn open(&self, id: BlobId) -> Result<BlobReader, BlobError>;

    /// Metadata of a finished blob, without touching its content.
    async fn stat(&self, id: BlobId) -> Result<FileRecord, BlobError>;

    /// Deletes metadata and content. Fails with `NotFound` when absent.
    async fn remove(&self, id: BlobId) -> Result<(), BlobError>;

    /// Checks the backend is reachable.
    async fn ping(&self) -> Result<(), BlobError>;

    fn backend_name(&self) -> &'static str;
}

pub(crate) async fn find_file<C: ConnectionTrait>(
    db: &C,
    id: BlobId,
) -> Result<blob_files::Model, BlobError> {
    BlobFiles::find_by_id(id.to_hex())
        .one(db)
        .await?
        .ok_or(BlobError::NotFound(id))
}

pub(crate) fn to_record(model: blob_files::Model) -> Result<FileRecord, BlobError> {
    FileRecord::try_from(model).map_err(|e| BlobError::Storage(e.to_string()))
}
