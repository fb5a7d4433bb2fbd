use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::db::models::*;

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Initialize database connection and create tables
    pub async fn new(database_path: &str) -> Result<Self, sqlx::Error> {
        // Use sqlite:// with ?mode=rwc to create if it doesn't exist
        let database_url = format!("sqlite://{}?mode=rwc", database_path);
        info!("Connecting to {}", database_url);
        let pool = SqlitePool::connect(&database_url).await?;

        let db = Database { pool };
        db.create_tables().await?;
        Ok(db)
    }

    /// In-memory database for tests.
    ///
    /// Capped to a single connection: each sqlite `:memory:` connection is
    /// its own database, so a larger pool would scatter the tables.
    pub async fn new_in_memory() -> Result<Self, sqlx::Error> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Database { pool };
        db.create_tables().await?;
        Ok(db)
    }

    /// Create all necessary tables
    async fn create_tables(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS archive_entries (
                identity TEXT PRIMARY KEY,
                archive_path TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                collection_id TEXT NOT NULL,
                imported_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Look up the archive entry holding an identity, if any.
    pub async fn lookup_entry(&self, identity: &str) -> Result<Option<DbArchiveEntry>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT identity, archive_path, size_bytes, collection_id, imported_at
            FROM archive_entries WHERE identity = ?
            "#,
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| Self::entry_from_row(&row)).transpose()
    }

    /// Insert an entry iff its identity is absent.
    ///
    /// `INSERT OR IGNORE` makes the present-or-absent decision atomic inside
    /// SQLite, which closes the race where two files with identical content
    /// are both judged new: exactly one insert wins, the other observes
    /// `AlreadyExists`.
    pub async fn insert_entry(&self, entry: &DbArchiveEntry) -> Result<InsertOutcome, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO archive_entries (identity, archive_path, size_bytes, collection_id, imported_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(identity) DO NOTHING
            "#,
        )
        .bind(&entry.identity)
        .bind(&entry.archive_path)
        .bind(entry.size_bytes)
        .bind(&entry.collection_id)
        .bind(entry.imported_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::AlreadyExists)
        }
    }

    /// All entries in a collection, newest first. Read-only view for
    /// downstream collaborators.
    pub async fn entries_for_collection(
        &self,
        collection_id: &str,
    ) -> Result<Vec<DbArchiveEntry>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT identity, archive_path, size_bytes, collection_id, imported_at
            FROM archive_entries WHERE collection_id = ?
            ORDER BY imported_at DESC
            "#,
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::entry_from_row).collect()
    }

    fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<DbArchiveEntry, sqlx::Error> {
        let imported_at: String = row.get("imported_at");
        let imported_at = DateTime::parse_from_rfc3339(&imported_at)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
            .with_timezone(&Utc);

        Ok(DbArchiveEntry {
            identity: row.get("identity"),
            archive_path: row.get("archive_path"),
            size_bytes: row.get("size_bytes"),
            collection_id: row.get("collection_id"),
            imported_at,
        })
    }
}
