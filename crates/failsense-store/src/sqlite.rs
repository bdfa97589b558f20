use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::BlobStore;

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS blobs (
  key TEXT PRIMARY KEY CHECK (length(key) > 0),
  value TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
";

/// Blob port backed by a single `SQLite` table.
pub struct SqliteBlobStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

impl SqliteBlobStore {
    /// Open a `SQLite` database and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Open a database and bring it to the latest schema in one step.
    ///
    /// # Errors
    /// Returns an error when opening or migrating fails.
    pub fn open_migrated(path: &Path) -> Result<Self> {
        let store = Self::open(path)?;
        store.migrate()?;
        Ok(store)
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
        })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when a migration step fails or the database was written
    /// by a newer schema.
    pub fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut version = current_schema_version(&self.conn)?;

        if version < 1 {
            self.conn.execute_batch(MIGRATION_001_SQL).context("failed to apply migration 1")?;
            record_schema_version(&self.conn, 1)?;
            version = current_schema_version(&self.conn)?;
        }

        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        Ok(())
    }
}

impl BlobStore for SqliteBlobStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM blobs WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .with_context(|| format!("failed to read blob {key}"))
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "INSERT INTO blobs(key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .with_context(|| format!("failed to write blob {key}"))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM blobs WHERE key = ?1", params![key])
            .with_context(|| format!("failed to remove blob {key}"))?;
        Ok(())
    }
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    let now = now_rfc3339()?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

pub(crate) fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc().format(&Rfc3339).context("failed to format RFC3339 timestamp")
}
