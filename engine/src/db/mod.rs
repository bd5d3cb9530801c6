/// Memory index persistence
///
/// The memory index is a directory holding a single SQLite database in WAL
/// mode. Documents live in a plain table; an FTS5 external-content table
/// with the porter stemmer mirrors the searchable fields through triggers,
/// so every committed write is immediately visible to searches.
///
/// A fresh directory gets a fresh index. An existing directory is reused
/// as-is, and a schema that does not match the expected one is a fatal
/// startup error rather than something to repair in place.
use sdk::errors::EngineError;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::ConnectOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub mod documents;

// Re-export commonly used types
pub use documents::{DocumentStore, MatchMode, SearchField};

/// File name of the database inside the index directory
pub const DB_FILE_NAME: &str = "memory.db";

/// Schema version stamped into `PRAGMA user_version` by the migrations
pub const SCHEMA_VERSION: i64 = 1;

/// Columns of the `documents` table, in declaration order
const DOCUMENT_COLUMNS: [&str; 7] = [
    "seq",
    "id",
    "content",
    "created_at",
    "user_id",
    "privacy",
    "access_list",
];

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the memory index
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Cannot open memory index: {0}")]
    Init(String),

    #[error("Memory write failed: {0}")]
    Write(String),

    #[error("Memory read failed: {0}")]
    Read(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Init(msg) => EngineError::StoreInit(msg),
            StoreError::Write(msg) => EngineError::StoreWrite(msg),
            StoreError::Read(msg) => EngineError::StoreRead(msg),
            StoreError::InvalidDocument(msg) => EngineError::InvalidDocument(msg),
        }
    }
}

/// Directory-backed memory index
pub struct Database {
    pool: SqlitePool,
    path: PathBuf,
}

impl Database {
    /// Open the memory index stored in `index_dir`
    ///
    /// This will:
    /// 1. Create the directory if it doesn't exist
    /// 2. Create or open `memory.db` in WAL mode
    /// 3. Run migrations on a fresh database
    /// 4. Verify the schema of an existing one
    ///
    /// Any failure here is a `StoreError::Init`; callers treat it as fatal.
    pub async fn open(index_dir: &Path) -> Result<Self> {
        info!("Opening memory index at: {}", index_dir.display());

        tokio::fs::create_dir_all(index_dir).await.map_err(|e| {
            StoreError::Init(format!(
                "failed to create index directory {}: {}",
                index_dir.display(),
                e
            ))
        })?;

        let db_path = index_dir.join(DB_FILE_NAME);

        // WAL lets searches proceed while a single-document commit is in flight
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Init(format!("failed to open {}: {}", db_path.display(), e)))?;

        debug!("Memory index connection established");

        let db = Self {
            pool,
            path: db_path,
        };

        db.run_migrations().await?;
        db.verify_schema().await?;

        Ok(db)
    }

    /// Bring a fresh database up to the current schema
    ///
    /// An unversioned database that already has a `documents` table was not
    /// created by us; it is verified before anything is written to it.
    async fn run_migrations(&self) -> Result<()> {
        let version = self.schema_version().await?;

        if version == SCHEMA_VERSION {
            debug!("Memory index schema is current (v{})", version);
            return Ok(());
        }

        if version > SCHEMA_VERSION {
            return Err(StoreError::Init(format!(
                "index schema version {} is newer than supported version {}",
                version, SCHEMA_VERSION
            )));
        }

        if self.table_exists("documents").await? {
            self.verify_schema().await?;
        }

        info!("Running memory index migrations");

        sqlx::raw_sql(include_str!("../../migrations/001_documents.sql"))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                StoreError::Init(format!("failed to execute migration 001_documents.sql: {}", e))
            })?;

        info!("Memory index migrations completed successfully");
        Ok(())
    }

    /// Check the on-disk layout against the fixed document schema
    async fn verify_schema(&self) -> Result<()> {
        let columns: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info('documents') ORDER BY cid")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::Init(format!("failed to inspect schema: {}", e)))?;

        if columns != DOCUMENT_COLUMNS {
            return Err(StoreError::Init(format!(
                "schema mismatch: documents has columns [{}], expected [{}]",
                columns.join(", "),
                DOCUMENT_COLUMNS.join(", ")
            )));
        }

        if !self.table_exists("documents_fts").await? {
            return Err(StoreError::Init(
                "schema mismatch: full-text index documents_fts is missing".to_string(),
            ));
        }

        Ok(())
    }

    async fn schema_version(&self) -> Result<i64> {
        sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Init(format!("failed to read schema version: {}", e)))
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Init(format!("failed to inspect schema: {}", e)))?;
        Ok(count > 0)
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Path of the database file inside the index directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush the WAL to disk
    ///
    /// Called during shutdown so the database file alone holds every
    /// committed memory.
    pub async fn flush_wal(&self) -> Result<()> {
        info!("Flushing WAL to disk");

        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Write(format!("failed to flush WAL: {}", e)))?;

        debug!("WAL flushed successfully");
        Ok(())
    }

    /// Close the database connection
    ///
    /// This flushes the WAL and closes all connections in the pool.
    pub async fn close(self) -> Result<()> {
        info!("Closing memory index");

        self.flush_wal().await?;
        self.pool.close().await;

        info!("Memory index closed");
        Ok(())
    }

    /// Create a document store over this index
    pub fn documents(&self) -> DocumentStore {
        DocumentStore::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn raw_pool(path: &Path) -> SqlitePool {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_creates_directory_and_schema() {
        let temp_dir = TempDir::new().unwrap();
        let index_dir = temp_dir.path().join("ltm_data");

        let db = Database::open(&index_dir).await.unwrap();

        assert!(index_dir.is_dir());
        assert!(index_dir.join(DB_FILE_NAME).exists());

        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(db.pool())
                .await
                .unwrap();
        assert!(tables.contains(&"documents".to_string()));
        assert!(tables.contains(&"documents_fts".to_string()));

        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_wal_mode_enabled() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open(temp_dir.path()).await.unwrap();

        let journal_mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(db.pool())
            .await
            .unwrap();

        assert_eq!(journal_mode.to_lowercase(), "wal");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_reopen_reuses_existing_index() {
        let temp_dir = TempDir::new().unwrap();

        let db = Database::open(temp_dir.path()).await.unwrap();
        let id = db
            .documents()
            .add_private_note("u1", "prefers dark roast coffee")
            .await
            .unwrap();
        db.close().await.unwrap();

        let db = Database::open(temp_dir.path()).await.unwrap();
        let doc = db.documents().get(&id).await.unwrap();
        assert!(doc.is_some());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_foreign_schema_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join(DB_FILE_NAME);

        let pool = raw_pool(&db_path).await;
        sqlx::query("CREATE TABLE documents (id TEXT PRIMARY KEY, body TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let result = Database::open(temp_dir.path()).await;
        assert!(matches!(result, Err(StoreError::Init(_))));
    }

    #[tokio::test]
    async fn test_newer_schema_version_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join(DB_FILE_NAME);

        let pool = raw_pool(&db_path).await;
        sqlx::query("PRAGMA user_version = 99")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let result = Database::open(temp_dir.path()).await;
        assert!(matches!(result, Err(StoreError::Init(_))));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(DB_FILE_NAME),
            b"this is definitely not a sqlite database file, just some text padding it out",
        )
        .unwrap();

        let result = Database::open(temp_dir.path()).await;
        assert!(matches!(result, Err(StoreError::Init(_))));
    }

    #[test]
    fn test_store_error_maps_to_engine_error() {
        let err: EngineError = StoreError::Init("bad".to_string()).into();
        assert!(matches!(err, EngineError::StoreInit(_)));

        let err: EngineError = StoreError::Read("busy".to_string()).into();
        assert!(matches!(err, EngineError::StoreRead(_)));
    }
}
