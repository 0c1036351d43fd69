use crate::models::FileRecord;
use crate::{connect, migrate, FileStore, StoreError};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

const UPSERT_SQL: &str = r#"
    INSERT INTO file_records (path, mtime, preview, feature_image, tags_json, metadata_json, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, strftime('%s','now'))
    ON CONFLICT(path) DO UPDATE SET
        mtime=excluded.mtime,
        preview=excluded.preview,
        feature_image=excluded.feature_image,
        tags_json=excluded.tags_json,
        metadata_json=excluded.metadata_json,
        updated_at=strftime('%s','now')
"#;

/// [`FileStore`] backed by the `file_records` table.
#[derive(Clone)]
pub struct SqliteFileStore {
    pool: SqlitePool,
}

struct EncodedRecord {
    tags_json: Option<String>,
    metadata_json: Option<String>,
}

impl SqliteFileStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects and runs migrations.
    pub async fn open(database_url: &str) -> anyhow::Result<Self> {
        let pool = connect(database_url).await?;
        migrate(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn encode(record: &FileRecord) -> Result<EncodedRecord, StoreError> {
    let tags_json = record
        .tags
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let metadata_json = record
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    Ok(EncodedRecord {
        tags_json,
        metadata_json,
    })
}

fn decode(row: &SqliteRow) -> Result<(String, FileRecord), StoreError> {
    let path: String = row.try_get("path")?;
    let tags_json: Option<String> = row.try_get("tags_json")?;
    let metadata_json: Option<String> = row.try_get("metadata_json")?;
    let record = FileRecord {
        mtime: row.try_get("mtime")?,
        preview: row.try_get("preview")?,
        feature_image: row.try_get("feature_image")?,
        tags: tags_json.as_deref().map(serde_json::from_str).transpose()?,
        metadata: metadata_json.as_deref().map(serde_json::from_str).transpose()?,
    };
    Ok((path, record))
}

#[async_trait::async_trait]
impl FileStore for SqliteFileStore {
    async fn bulk_load(&self) -> Result<Vec<(String, FileRecord)>, StoreError> {
        let rows = sqlx::query(
            "SELECT path, mtime, preview, feature_image, tags_json, metadata_json FROM file_records ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        let records = rows.iter().map(decode).collect::<Result<Vec<_>, _>>()?;
        debug!("bulk loaded {} file records", records.len());
        Ok(records)
    }

    async fn get(&self, path: &str) -> Result<Option<FileRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT path, mtime, preview, feature_image, tags_json, metadata_json FROM file_records WHERE path = ?1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref()
            .map(decode)
            .transpose()
            .map(|found| found.map(|(_, record)| record))
    }

    async fn put(&self, path: &str, record: &FileRecord) -> Result<(), StoreError> {
        let encoded = encode(record)?;
        sqlx::query(UPSERT_SQL)
            .bind(path)
            .bind(record.mtime)
            .bind(record.preview.as_deref())
            .bind(record.feature_image.as_deref())
            .bind(encoded.tags_json)
            .bind(encoded.metadata_json)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM file_records WHERE path = ?1")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn put_many(&self, records: &[(String, FileRecord)]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for (path, record) in records {
            let encoded = encode(record)?;
            sqlx::query(UPSERT_SQL)
                .bind(path)
                .bind(record.mtime)
                .bind(record.preview.as_deref())
                .bind(record.feature_image.as_deref())
                .bind(encoded.tags_json)
                .bind(encoded.metadata_json)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_many(&self, paths: &[String]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for path in paths {
            sqlx::query("DELETE FROM file_records WHERE path = ?1")
                .bind(path)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
