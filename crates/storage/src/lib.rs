//! Storage layer: the persistent per-file record store.
//!
//! Holds DB pool setup, the migration runner and the [`FileStore`] trait with
//! its SQLite and in-memory implementations.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use thiserror::Error;

pub mod memory;
pub mod models;
pub mod sqlite;

pub use memory::MemoryFileStore;
pub use models::FileRecord;
pub use sqlite::SqliteFileStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable key-value store keyed by file path.
///
/// `bulk_load` returns records in insertion order; a path keeps its original
/// position when it is overwritten.
#[async_trait::async_trait]
pub trait FileStore: Send + Sync {
    async fn bulk_load(&self) -> Result<Vec<(String, FileRecord)>, StoreError>;
    async fn get(&self, path: &str) -> Result<Option<FileRecord>, StoreError>;
    async fn put(&self, path: &str, record: &FileRecord) -> Result<(), StoreError>;
    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    async fn put_many(&self, records: &[(String, FileRecord)]) -> Result<(), StoreError> {
        for (path, record) in records {
            self.put(path, record).await?;
        }
        Ok(())
    }

    async fn delete_many(&self, paths: &[String]) -> Result<(), StoreError> {
        for path in paths {
            self.delete(path).await?;
        }
        Ok(())
    }
}

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let mut url = database_url.to_string();
    if !database_url.starts_with("sqlite:") {
        let path = std::path::PathBuf::from(database_url);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let norm = path.to_string_lossy().replace('\\', "/");
        if path.is_absolute() {
            url = format!("sqlite:///{}?mode=rwc", norm.trim_start_matches('/'));
        } else {
            url = format!("sqlite://{}?mode=rwc", norm);
        }
    }
    let mut opts = SqlitePoolOptions::new();
    if url.contains("memory") {
        // Every connection to a plain in-memory database is a fresh database.
        opts = opts
            .max_connections(1)
            .idle_timeout(None::<std::time::Duration>)
            .max_lifetime(None::<std::time::Duration>);
    } else {
        opts = opts.max_connections(5);
    }
    let pool = opts.connect(&url).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    // Applies SQLx migrations located in crates/storage/migrations.
    // Safe to run multiple times (idempotent).
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
