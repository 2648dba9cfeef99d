//! Database Connection Management
//!
//! Connection and schema management on top of libsql (embedded SQLite).
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf
//! - **WAL mode**: Write-Ahead Logging so readers never block the writer
//! - **Idempotent schema**: `CREATE TABLE IF NOT EXISTS`, safe on every start
//! - **Immediate transactions**: every cascade takes the write lock up front
//!   (`BEGIN IMMEDIATE`) so the subtree it computes cannot change before commit
//!
//! # Storage formats
//!
//! - UUIDs are stored as hyphenated lowercase text
//! - Timestamps are fixed-width RFC 3339 text with microseconds and a `Z`
//!   suffix, so string comparison in SQL equals chronological comparison
//!
//! # Connection pattern
//!
//! Always use `connect_with_timeout()` in async code. Each call opens a fresh
//! connection with the configured busy timeout, so concurrent writers wait
//! instead of failing with `SQLITE_BUSY`.
//!
//! ```no_run
//! # use pagetree_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db_service = DatabaseService::new(PathBuf::from("./data/pagetree.db")).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{PageTreeConfig, DEFAULT_BUSY_TIMEOUT_MS};
use crate::db::error::{DatabaseError, SqlContext};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use libsql::{Builder, Connection, Database};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

const SCHEMA: &[(&str, &str)] = &[
    (
        "projects",
        "CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
    ),
    (
        "pages",
        // parent_id carries no foreign key: the tree walker tolerates dangling
        // parents and hard deletes clean up explicitly
        "CREATE TABLE IF NOT EXISTS pages (
            id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL,
            parent_id TEXT,
            name TEXT NOT NULL DEFAULT '',
            description_html TEXT NOT NULL DEFAULT '<p></p>',
            description_binary BLOB,
            description_json TEXT NOT NULL DEFAULT '{}',
            description_stripped TEXT,
            owned_by TEXT NOT NULL,
            is_locked INTEGER NOT NULL DEFAULT 0,
            access INTEGER NOT NULL DEFAULT 0,
            archived_at TEXT,
            deleted_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    ),
    (
        "page_projects",
        "CREATE TABLE IF NOT EXISTS page_projects (
            page_id TEXT NOT NULL,
            project_id TEXT NOT NULL,
            workspace_id TEXT NOT NULL,
            PRIMARY KEY (page_id, project_id)
        )",
    ),
    (
        "page_versions",
        "CREATE TABLE IF NOT EXISTS page_versions (
            id TEXT PRIMARY KEY,
            page_id TEXT NOT NULL,
            workspace_id TEXT NOT NULL,
            owned_by TEXT NOT NULL,
            description_html TEXT NOT NULL,
            description_binary BLOB,
            description_json TEXT NOT NULL DEFAULT '{}',
            description_stripped TEXT,
            sub_pages_data TEXT NOT NULL DEFAULT '[]',
            last_saved_at TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT
        )",
    ),
    (
        "user_favorites",
        "CREATE TABLE IF NOT EXISTS user_favorites (
            id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_identifier TEXT NOT NULL,
            project_id TEXT,
            created_at TEXT NOT NULL,
            UNIQUE (user_id, entity_type, entity_identifier)
        )",
    ),
    (
        "user_recent_visits",
        "CREATE TABLE IF NOT EXISTS user_recent_visits (
            id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            entity_name TEXT NOT NULL,
            entity_identifier TEXT NOT NULL,
            project_id TEXT,
            visited_at TEXT NOT NULL,
            UNIQUE (user_id, entity_name, entity_identifier)
        )",
    ),
];

const INDEXES: &[(&str, &str)] = &[
    (
        "idx_pages_parent",
        "CREATE INDEX IF NOT EXISTS idx_pages_parent ON pages(workspace_id, parent_id)",
    ),
    (
        "idx_pages_deleted",
        "CREATE INDEX IF NOT EXISTS idx_pages_deleted ON pages(workspace_id, deleted_at)",
    ),
    (
        "idx_page_projects_project",
        "CREATE INDEX IF NOT EXISTS idx_page_projects_project ON page_projects(project_id)",
    ),
    (
        "idx_page_versions_page",
        "CREATE INDEX IF NOT EXISTS idx_page_versions_page ON page_versions(page_id, last_saved_at)",
    ),
    (
        "idx_favorites_user",
        "CREATE INDEX IF NOT EXISTS idx_favorites_user ON user_favorites(workspace_id, user_id)",
    ),
    (
        "idx_favorites_entity",
        "CREATE INDEX IF NOT EXISTS idx_favorites_entity ON user_favorites(entity_identifier)",
    ),
    (
        "idx_recent_visits_user",
        "CREATE INDEX IF NOT EXISTS idx_recent_visits_user ON user_recent_visits(workspace_id, user_id, visited_at)",
    ),
    (
        "idx_recent_visits_entity",
        "CREATE INDEX IF NOT EXISTS idx_recent_visits_entity ON user_recent_visits(entity_identifier)",
    ),
];

/// Database service for managing the libsql connection and schema
///
/// # Examples
///
/// ```no_run
/// use pagetree_core::db::DatabaseService;
/// use std::path::PathBuf;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db_service = DatabaseService::new(PathBuf::from("/path/to/pagetree.db")).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,

    busy_timeout_ms: u64,
}

impl DatabaseService {
    /// Open (or create) the database at `db_path` with default settings
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        Self::open(db_path, DEFAULT_BUSY_TIMEOUT_MS).await
    }

    /// Open the database described by `config`
    pub async fn from_config(config: &PageTreeConfig) -> Result<Self, DatabaseError> {
        Self::open(config.database_path.clone(), config.busy_timeout_ms).await
    }

    async fn open(db_path: PathBuf, busy_timeout_ms: u64) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
            busy_timeout_ms,
        };

        service.initialize_schema().await?;
        tracing::debug!("Opened page database at {}", service.db_path.display());

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so they go through query() rather than execute().
    async fn execute_pragma(&self, conn: &Connection, pragma: &str) -> Result<(), DatabaseError> {
        let _ = conn
            .query(pragma, ())
            .await
            .sql_context(&format!("Failed to execute '{}'", pragma))?;
        Ok(())
    }

    async fn initialize_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        for (table, ddl) in SCHEMA {
            conn.execute(ddl, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create {} table: {}",
                    table, e
                ))
            })?;
        }

        for (index, ddl) in INDEXES {
            conn.execute(ddl, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create index '{}': {}",
                    index, e
                ))
            })?;
        }

        Ok(())
    }

    /// Get a raw connection without the busy timeout
    ///
    /// Prefer `connect_with_timeout()` anywhere a write may contend.
    pub fn connect(&self) -> Result<Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get a connection with the configured busy timeout
    pub async fn connect_with_timeout(&self) -> Result<Connection, DatabaseError> {
        let conn = self.connect()?;
        self.execute_pragma(&conn, &format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms))
            .await?;
        Ok(conn)
    }

    /// Start a write transaction that holds the database write lock until commit
    pub async fn begin_immediate(conn: &Connection) -> Result<(), DatabaseError> {
        conn.execute("BEGIN IMMEDIATE", ())
            .await
            .sql_context("Failed to begin transaction")?;
        Ok(())
    }

    /// Commit on `Ok`, roll back on `Err`, and hand the result back
    ///
    /// A failed commit is reported as a storage error after a best-effort rollback.
    pub async fn commit_or_rollback<T, E>(conn: &Connection, result: Result<T, E>) -> Result<T, E>
    where
        E: From<DatabaseError>,
    {
        match result {
            Ok(value) => {
                if let Err(e) = conn.execute("COMMIT", ()).await {
                    let _ = conn.execute("ROLLBACK", ()).await;
                    return Err(DatabaseError::sql_execution(format!(
                        "Failed to commit transaction: {}",
                        e
                    ))
                    .into());
                }
                Ok(value)
            }
            Err(err) => {
                if let Err(e) = conn.execute("ROLLBACK", ()).await {
                    tracing::warn!("Failed to roll back transaction: {}", e);
                }
                Err(err)
            }
        }
    }

    /// Flush the WAL before shutdown
    pub async fn close(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
            .await
    }
}

/// Encode a timestamp in the fixed-width storage format
pub(crate) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn format_optional_timestamp(value: &Option<DateTime<Utc>>) -> Option<String> {
    value.as_ref().map(format_timestamp)
}

/// Parse a stored timestamp - accepts RFC 3339 and SQLite's `YYYY-MM-DD HH:MM:SS`
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }

    Err(DatabaseError::invalid_row(format!(
        "Unable to parse timestamp '{}'",
        raw
    )))
}

pub(crate) fn parse_optional_timestamp(
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    raw.as_deref().map(parse_timestamp).transpose()
}

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw)
        .map_err(|e| DatabaseError::invalid_row(format!("Invalid UUID '{}': {}", raw, e)))
}

pub(crate) fn parse_optional_uuid(raw: Option<String>) -> Result<Option<Uuid>, DatabaseError> {
    raw.as_deref().map(parse_uuid).transpose()
}
