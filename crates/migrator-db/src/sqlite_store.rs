use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use migrator_common::{Error, Ledger, MigrationRecord, Result, SqlExecutor};
use rusqlite::{Connection, ErrorCode, InterruptHandle, OptionalExtension, Row, params};
use tracing::{debug, info, warn};

use crate::target::{DatabaseTarget, parse_dsn, validate_table_name};

/// SQLite connection acting as both the migration target and the ledger.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    table: String,
}

impl SqliteStore {
    pub fn connect(dsn: &str, table: &str) -> Result<Self> {
        match parse_dsn(dsn)? {
            DatabaseTarget::Memory => Self::in_memory(table),
            DatabaseTarget::File(path) => Self::open(&path, table),
            DatabaseTarget::Postgres(_) => Err(Error::Config(format!(
                "'{dsn}' is not a SQLite database"
            ))),
        }
    }

    pub fn open(db_path: &Path, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        info!("opening database at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;
        Self::with_connection(conn, table)
    }

    pub fn in_memory(table: &str) -> Result<Self> {
        validate_table_name(table)?;
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;
        Self::with_connection(conn, table)
    }

    fn with_connection(conn: Connection, table: &str) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Handle that aborts whatever statement is running on this connection.
    pub fn interrupt_handle(&self) -> Result<InterruptHandle> {
        Ok(self.connection()?.get_interrupt_handle())
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("database lock poisoned".into()))
    }

    fn table_exists(&self, conn: &Connection) -> Result<bool> {
        conn.query_row(
            "SELECT count(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![self.table],
            |row| row.get(0),
        )
        .map_err(|e| db_error("failed to check bookkeeping table", e))
    }
}

impl SqlExecutor for SqliteStore {
    fn execute(&self, sql: &str) -> Result<()> {
        if sql.trim().is_empty() {
            debug!("skipping empty migration script");
            return Ok(());
        }
        let conn = self.connection()?;
        conn.execute_batch(sql)
            .map_err(|e| db_error("migration script failed", e))
    }
}

impl Ledger for SqliteStore {
    fn ensure_table_exists(&self) -> Result<()> {
        let conn = self.connection()?;
        if self.table_exists(&conn)? {
            return Ok(());
        }

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                version INTEGER DEFAULT 0,
                created_at TEXT DEFAULT (datetime('now')),
                updated_at TEXT DEFAULT (datetime('now'))
            );",
            self.table
        ))
        .map_err(|e| db_error("failed to create bookkeeping table", e))?;

        info!("created migrations table '{}'", self.table);
        Ok(())
    }

    fn find_current(&self, name: &str) -> Result<Option<MigrationRecord>> {
        let conn = self.connection()?;
        conn.query_row(
            &format!(
                "SELECT id, name, fingerprint, version, created_at, updated_at FROM {}
                 WHERE name = ?1 ORDER BY id DESC LIMIT 1",
                self.table
            ),
            params![name],
            read_record,
        )
        .optional()
        .map_err(|e| db_error("failed to look up migration", e))
    }

    fn list_applied_desc(&self, min_version: i64) -> Result<Vec<MigrationRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT id, name, fingerprint, version, created_at, updated_at FROM {}
                 WHERE version >= ?1
                 ORDER BY version DESC, id DESC",
                self.table
            ))
            .map_err(|e| db_error("failed to prepare query", e))?;

        let rows = stmt
            .query_map(params![min_version], read_record)
            .map_err(|e| db_error("failed to query migrations", e))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|e| db_error("failed to read migration row", e))?);
        }
        Ok(records)
    }

    fn next_version(&self) -> Result<i64> {
        let conn = self.connection()?;
        let max: Option<i64> = conn
            .query_row(&format!("SELECT MAX(version) FROM {}", self.table), [], |row| {
                row.get(0)
            })
            .map_err(|e| db_error("failed to read max version", e))?;
        Ok(max.map_or(0, |v| v + 1))
    }

    fn insert(
        &self,
        name: &str,
        fingerprint: &str,
        version: i64,
        applied_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            &format!(
                "INSERT INTO {} (name, fingerprint, version, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                self.table
            ),
            params![name, fingerprint, version, applied_at.to_rfc3339()],
        )
        .map_err(|e| db_error("failed to record migration", e))?;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            &format!("DELETE FROM {} WHERE name = ?1", self.table),
            params![name],
        )
        .map_err(|e| db_error("failed to delete migration record", e))?;
        Ok(())
    }
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<MigrationRecord> {
    Ok(MigrationRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        fingerprint: row.get(2)?,
        version: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
        created_at: parse_datetime(row.get::<_, Option<String>>(4)?),
        updated_at: parse_datetime(row.get::<_, Option<String>>(5)?),
    })
}

fn db_error(what: &str, e: rusqlite::Error) -> Error {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::OperationInterrupted => {
            Error::Cancelled
        }
        _ => Error::Database(format!("{what}: {e}")),
    }
}

fn parse_datetime(s: Option<String>) -> DateTime<Utc> {
    let Some(s) = s else {
        return DateTime::<Utc>::UNIX_EPOCH;
    };
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            // SQLite datetime('now') produces "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
                .unwrap_or_else(|_| {
                    warn!("unparseable timestamp '{s}' in bookkeeping table");
                    DateTime::<Utc>::UNIX_EPOCH
                })
        })
}
