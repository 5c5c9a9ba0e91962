use crate::config::AppConfig;
use crate::entities::{blob_chunks, blob_files};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema, Statement};
use std::time::Duration;
use tracing::info;

pub async fn setup_database(config: &AppConfig) -> anyhow::Result<DatabaseConnection> {
    let db_url = &config.database_url;

    info!("📂 Database: {}", db_url);

    let mut opt = ConnectOptions::new(db_url);
    opt.connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    if db_url.starts_with("sqlite::memory") {
        // The database lives exactly as long as its single connection.
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(100)
            .min_connections(5)
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800));
    }

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    run_migrations(&db).await?;

    Ok(db)
}

pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    info!("🔄 Running auto-migrations...");

    let stmts = vec![
        (
            "blob_files",
            schema
                .create_table_from_entity(blob_files::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "blob_chunks",
            schema
                .create_table_from_entity(blob_chunks::Entity)
                .if_not_exists()
                .to_owned(),
        ),
    ];

    for (name, stmt) in stmts {
        db.execute(builder.build(&stmt)).await?;
        info!("   - Table '{}' checked/created", name);
    }

    // The sweeper scans chunks by age.
    db.execute(Statement::from_string(
        builder,
        "CREATE INDEX IF NOT EXISTS idx_blob_chunks_created_at ON blob_chunks(created_at)",
    ))
    .await?;

    Ok(())
}
