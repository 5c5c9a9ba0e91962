use crate::entities::{blob_chunks, blob_files, prelude::*};
use chrono::Utc;
use sea_orm::sea_query::Query;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Periodically removes chunks of blobs that never completed.
pub struct BackgroundWorker {
    db: DatabaseConnection,
    interval: Duration,
    grace: chrono::Duration,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(
        db: DatabaseConnection,
        interval_secs: u64,
        grace_secs: u64,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            db,
            interval: Duration::from_secs(interval_secs.max(1)),
            grace: chrono::Duration::seconds(grace_secs as i64),
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Background worker started");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Background worker shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.perform_cleanup().await;
                }
            }
        }
    }

    async fn perform_cleanup(&self) {
        tracing::debug!("🧹 Sweeping orphaned chunks...");

        match self.sweep_orphans().await {
            Ok(0) => {}
            Ok(n) => tracing::info!("🧹 Removed {} orphaned chunks", n),
            Err(e) => tracing::error!("Orphan sweep failed: {}", e),
        }
    }

    /// Deletes chunk rows older than the grace period that belong to no finished blob.
    /// Returns the number of rows removed.
    pub async fn sweep_orphans(&self) -> Result<u64, DbErr> {
        let cutoff = Utc::now() - self.grace;

        let res = BlobChunks::delete_many()
            .filter(blob_chunks::Column::CreatedAt.lt(cutoff))
            .filter(
                blob_chunks::Column::FileId.not_in_subquery(
                    Query::select()
                        .column(blob_files::Column::Id)
                        .from(BlobFiles)
                        .to_owned(),
                ),
            )
            .exec(&self.db)
            .await?;

        Ok(res.rows_affected)
    }
}
