use compose_assets::config::AppConfig;
use chrono::Utc;
use compose_assets::entities::{blob_chunks, prelude::*};
use compose_assets::infrastructure::database;
use compose_assets::models::BlobId;
use compose_assets::services::blob_store::{BlobError, BlobStore, ChunkedBlobStore};
use compose_assets::services::worker::BackgroundWorker;
use futures::TryStreamExt;
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait};
use std::time::Duration;

async fn setup_store(chunk_size: usize) -> (DatabaseConnection, ChunkedBlobStore) {
    let db = database::setup_database(&AppConfig::development())
        .await
        .unwrap();
    (db.clone(), ChunkedBlobStore::new(db, chunk_size))
}

async fn write_blob(store: &ChunkedBlobStore, name: &str, content: &[u8]) -> BlobId {
    let mut writer = store.create(name).await.unwrap();
    for part in content.chunks(5) {
        writer.write(part).await.unwrap();
    }
    writer.finish().await.unwrap().id
}

async fn chunk_count(db: &DatabaseConnection) -> u64 {
    BlobChunks::find().count(db).await.unwrap()
}

#[tokio::test]
async fn test_write_and_read_back() {
    let (db, store) = setup_store(8).await;
    let content = b"the quick brown fox jumps over the lazy dog";

    let id = write_blob(&store, "fox.txt", content).await;
    assert_eq!(chunk_count(&db).await, 6);

    let reader = store.open(id).await.unwrap();
    assert_eq!(reader.record.size, content.len() as i64);
    assert_eq!(reader.record.filename, "fox.txt");
    assert_eq!(
        reader.record.sha256,
        "05c6e08f1d9fdafa03147fcb8f82f124c76d2f70e3d989dc8aadb5e7d7450bec"
    );

    let data: Vec<u8> = reader
        .body
        .try_fold(Vec::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await
        .unwrap();
    assert_eq!(data, content.to_vec());
}

#[tokio::test]
async fn test_unfinished_blob_is_not_readable() {
    let (_db, store) = setup_store(4).await;

    let mut writer = store.create("draft.md").await.unwrap();
    let id = writer.id();
    writer.write(b"half written").await.unwrap();

    assert!(matches!(store.open(id).await, Err(BlobError::NotFound(_))));
    assert!(store.stat(id).await.unwrap_err().is_not_found());

    writer.finish().await.unwrap();
    assert!(store.open(id).await.is_ok());
}

#[tokio::test]
async fn test_remove_then_open() {
    let (db, store) = setup_store(4).await;
    let id = write_blob(&store, "gone.txt", b"short lived").await;

    store.remove(id).await.unwrap();
    assert_eq!(chunk_count(&db).await, 0);
    assert!(matches!(store.open(id).await, Err(BlobError::NotFound(_))));

    let err = store.remove(id).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_abort_discards_chunks() {
    let (db, store) = setup_store(4).await;

    let mut writer = store.create("aborted.bin").await.unwrap();
    let id = writer.id();
    writer.write(b"some bytes that span chunks").await.unwrap();
    assert!(chunk_count(&db).await > 0);

    writer.abort().await.unwrap();
    assert_eq!(chunk_count(&db).await, 0);
    assert!(store.stat(id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_dropped_writer_cleans_up() {
    let (db, store) = setup_store(4).await;

    let mut writer = store.create("dropped.bin").await.unwrap();
    writer.write(b"abandoned halfway").await.unwrap();
    drop(writer);

    for _ in 0..50 {
        if chunk_count(&db).await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(chunk_count(&db).await, 0);
}

#[tokio::test]
async fn test_finish_fails_when_chunks_were_swept() {
    let (db, store) = setup_store(4).await;

    let mut writer = store.create("slow.bin").await.unwrap();
    writer.write(b"12345678").await.unwrap();
    let id = writer.id();
    assert_eq!(chunk_count(&db).await, 2);

    BlobChunks::update_many()
        .col_expr(
            blob_chunks::Column::CreatedAt,
            sea_orm::sea_query::Expr::value(Utc::now() - chrono::Duration::days(2)),
        )
        .exec(&db)
        .await
        .unwrap();
    let (_tx, rx) = tokio::sync::watch::channel(false);
    let worker = BackgroundWorker::new(db.clone(), 60, 3600, rx);
    assert_eq!(worker.sweep_orphans().await.unwrap(), 2);

    writer.write(b"9").await.unwrap();
    let err = writer.finish().await.unwrap_err();
    assert!(matches!(err, BlobError::Storage(_)));

    assert!(store.stat(id).await.unwrap_err().is_not_found());
    assert_eq!(chunk_count(&db).await, 0);
    assert_eq!(BlobFiles::find().count(&db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_ids_are_distinct() {
    let (_db, store) = setup_store(4).await;
    let a = write_blob(&store, "same.txt", b"one").await;
    let b = write_blob(&store, "same.txt", b"two").await;
    assert_ne!(a, b);
}
