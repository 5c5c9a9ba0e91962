use super::{BlobError, BlobReader, BlobStore, BlobStream, BlobWriter, find_file, to_record};
use crate::entities::{blob_chunks, prelude::*};
use crate::models::{BlobId, FileRecord};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{SubsecRound, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, Set, TransactionTrait,
};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;

/// Keeps content in the database as numbered chunk rows next to the `blob_files` row.
pub struct ChunkedBlobStore {
    db: DatabaseConnection,
    chunk_size: usize,
}

impl ChunkedBlobStore {
    pub fn new(db: DatabaseConnection, chunk_size: usize) -> Self {
        Self {
            db,
            chunk_size: chunk_size.clamp(1, i32::MAX as usize),
        }
    }
}

pub(crate) async fn delete_chunks<C: ConnectionTrait>(db: &C, file_id: &str) -> Result<u64, DbErr> {
    let res = BlobChunks::delete_many()
        .filter(blob_chunks::Column::FileId.eq(file_id))
        .exec(db)
        .await?;
    Ok(res.rows_affected)
}

fn chunk_stream(db: DatabaseConnection, file_id: String, chunks: i32) -> BlobStream {
    Box::pin(async_stream::try_stream! {
        for n in 0..chunks {
            let chunk = BlobChunks::find_by_id((file_id.clone(), n))
                .one(&db)
                .await
                .map_err(std::io::Error::other)?
                .ok_or_else(|| {
                    std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        format!("blob {} is missing chunk {}", file_id, n),
                    )
                })?;
            yield Bytes::from(chunk.data);
        }
    })
}

#[async_trait]
impl BlobStore for ChunkedBlobStore {
    async fn create(&self, filename: &str) -> Result<Box<dyn BlobWriter>, BlobError> {
        Ok(Box::new(ChunkedBlobWriter {
            db: self.db.clone(),
            id: BlobId::generate(),
            filename: filename.to_string(),
            chunk_size: self.chunk_size,
            buffer: Vec::with_capacity(self.chunk_size.min(1024 * 1024)),
            next_chunk: 0,
            written: 0,
            hasher: Sha256::new(),
            settled: false,
        }))
    }

    async fn open(&self, id: BlobId) -> Result<BlobReader, BlobError> {
        let model = find_file(&self.db, id).await?;
        let chunk_size = i64::from(model.chunk_size.max(1));
        let chunks = ((model.length + chunk_size - 1) / chunk_size) as i32;
        let body = chunk_stream(self.db.clone(), model.id.clone(), chunks);

        Ok(BlobReader {
            record: to_record(model)?,
            body,
        })
    }

    async fn stat(&self, id: BlobId) -> Result<FileRecord, BlobError> {
        to_record(find_file(&self.db, id).await?)
    }

    async fn remove(&self, id: BlobId) -> Result<(), BlobError> {
        let file_id = id.to_hex();
        let txn = self.db.begin().await?;

        let res = BlobFiles::delete_by_id(file_id.clone()).exec(&txn).await?;
        if res.rows_affected == 0 {
            txn.rollback().await?;
            return Err(BlobError::NotFound(id));
        }
        let chunks = delete_chunks(&txn, &file_id).await?;
        txn.commit().await?;

        tracing::debug!("Removed blob {} ({} chunks)", id, chunks);
        Ok(())
    }

    async fn ping(&self) -> Result<(), BlobError> {
        self.db.ping().await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "chunked"
    }
}

pub struct ChunkedBlobWriter {
    db: DatabaseConnection,
    id: BlobId,
    filename: String,
    chunk_size: usize,
    buffer: Vec<u8>,
    next_chunk: i32,
    written: u64,
    hasher: Sha256,
    // finished or aborted
    settled: bool,
}

impl ChunkedBlobWriter {
    async fn flush_chunk(&mut self, data: Vec<u8>) -> Result<(), BlobError> {
        let chunk = blob_chunks::ActiveModel {
            file_id: Set(self.id.to_hex()),
            n: Set(self.next_chunk),
            data: Set(data),
            created_at: Set(Utc::now()),
        };
        BlobChunks::insert(chunk)
            .exec_without_returning(&self.db)
            .await?;
        self.next_chunk += 1;
        Ok(())
    }
}

#[async_trait]
impl BlobWriter for ChunkedBlobWriter {
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

        while self.buffer.len() >= self.chunk_size {
            let rest = self.buffer.split_off(self.chunk_size);
            let full = std::mem::replace(&mut self.buffer, rest);
            self.flush_chunk(full).await?;
        }
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<FileRecord, BlobError> {
        if !self.buffer.is_empty() {
            let last = std::mem::take(&mut self.buffer);
            self.flush_chunk(last).await?;
        }

        let record = FileRecord {
            id: self.id,
            filename: self.filename.clone(),
            upload_date: Utc::now().trunc_subsecs(3),
            size: self.written as i64,
            sha256: hex::encode(std::mem::take(&mut self.hasher).finalize()),
        };

        let txn = self.db.begin().await?;
        let stored = BlobChunks::find()
            .filter(blob_chunks::Column::FileId.eq(self.id.to_hex()))
            .count(&txn)
            .await?;
        if stored != self.next_chunk as u64 {
            txn.rollback().await?;
            delete_chunks(&self.db, &self.id.to_hex()).await?;
            self.settled = true;
            return Err(BlobError::Storage(format!(
                "blob {} lost chunks before it was finished ({} of {} left)",
                self.id, stored, self.next_chunk
            )));
        }

        BlobFiles::insert(record.clone().into_active_model(self.chunk_size as i32))
            .exec_without_returning(&txn)
            .await?;
        txn.commit().await?;

        self.settled = true;
        Ok(record)
    }

    async fn abort(mut self: Box<Self>) -> Result<(), BlobError> {
        delete_chunks(&self.db, &self.id.to_hex()).await?;
        self.settled = true;
        Ok(())
    }
}

impl Drop for ChunkedBlobWriter {
    fn drop(&mut self) {
        if self.settled || self.next_chunk == 0 {
            return;
        }

        let db = self.db.clone();
        let file_id = self.id.to_hex();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match delete_chunks(&db, &file_id).await {
                        Ok(n) => tracing::info!("🧹 Dropped {} chunks of abandoned blob {}", n, file_id),
                        Err(e) => tracing::warn!("Failed to clean up abandoned blob {}: {}", file_id, e),
                    }
                });
            }
            Err(_) => tracing::warn!(
                "Abandoned blob {} outside a runtime, leaving its chunks to the sweeper",
                file_id
            ),
        }
    }
}
