use chrono::{DateTime, Utc};
use migrator_common::{Ledger, MigrationRecord, Result, SqlExecutor};
use rusqlite::InterruptHandle;
use tokio_postgres::{CancelToken, NoTls};
use tracing::warn;

use crate::postgres_store::PostgresStore;
use crate::sqlite_store::SqliteStore;
use crate::target::{DatabaseTarget, parse_dsn};

/// A store for whichever backend the DSN names.
pub enum AnyStore {
    Sqlite(SqliteStore),
    Postgres(PostgresStore),
}

trait Backend: Ledger + SqlExecutor {}

impl<T: Ledger + SqlExecutor> Backend for T {}

impl AnyStore {
    pub async fn connect(dsn: &str, table: &str) -> Result<Self> {
        match parse_dsn(dsn)? {
            DatabaseTarget::Postgres(url) => {
                Ok(Self::Postgres(PostgresStore::connect(&url, table).await?))
            }
            DatabaseTarget::Memory => Ok(Self::Sqlite(SqliteStore::in_memory(table)?)),
            DatabaseTarget::File(path) => Ok(Self::Sqlite(SqliteStore::open(&path, table)?)),
        }
    }

    pub fn interrupter(&self) -> Result<Interrupter> {
        match self {
            Self::Sqlite(store) => Ok(Interrupter::Sqlite(store.interrupt_handle()?)),
            Self::Postgres(store) => Ok(Interrupter::Postgres(store.cancel_token())),
        }
    }

    fn backend(&self) -> &dyn Backend {
        match self {
            Self::Sqlite(store) => store,
            Self::Postgres(store) => store,
        }
    }
}

impl SqlExecutor for AnyStore {
    fn execute(&self, sql: &str) -> Result<()> {
        self.backend().execute(sql)
    }
}

impl Ledger for AnyStore {
    fn ensure_table_exists(&self) -> Result<()> {
        self.backend().ensure_table_exists()
    }

    fn find_current(&self, name: &str) -> Result<Option<MigrationRecord>> {
        self.backend().find_current(name)
    }

    fn list_applied_desc(&self, min_version: i64) -> Result<Vec<MigrationRecord>> {
        self.backend().list_applied_desc(min_version)
    }

    fn next_version(&self) -> Result<i64> {
        self.backend().next_version()
    }

    fn insert(
        &self,
        name: &str,
        fingerprint: &str,
        version: i64,
        applied_at: DateTime<Utc>,
    ) -> Result<()> {
        self.backend().insert(name, fingerprint, version, applied_at)
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.backend().delete(name)
    }
}

/// Aborts the statement a store is running, from outside the thread running it.
pub enum Interrupter {
    Sqlite(InterruptHandle),
    Postgres(CancelToken),
}

impl Interrupter {
    pub async fn interrupt(&self) {
        match self {
            Self::Sqlite(handle) => handle.interrupt(),
            Self::Postgres(token) => {
                if let Err(e) = token.cancel_query(NoTls).await {
                    warn!("failed to cancel running statement: {e}");
                }
            }
        }
    }
}
