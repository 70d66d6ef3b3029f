//! PostgreSQL migration target and ledger on `tokio-postgres`.
//!
//! The engine is synchronous, so every [`Ledger`] and [`SqlExecutor`] call
//! blocks on the runtime the store was connected from. Call them from a
//! blocking context (`tokio::task::spawn_blocking`), never from inside an
//! async task.

use std::future::Future;

use chrono::{DateTime, Utc};
use migrator_common::{Error, Ledger, MigrationRecord, Result, SqlExecutor};
use tokio::runtime::Handle;
use tokio_postgres::config::SslMode;
use tokio_postgres::error::SqlState;
use tokio_postgres::{CancelToken, Client, Config, NoTls, Row};
use tracing::{debug, info, warn};

use crate::target::validate_table_name;

pub struct PostgresStore {
    client: Client,
    runtime: Handle,
    table: String,
}

impl PostgresStore {
    /// Connect with a `postgres://` URL and spawn the connection driver on
    /// the current runtime.
    pub async fn connect(dsn: &str, table: &str) -> Result<Self> {
        validate_table_name(table)?;

        let config: Config = dsn
            .parse()
            .map_err(|e| Error::Config(format!("invalid postgres DSN: {e}")))?;
        if matches!(config.get_ssl_mode(), SslMode::Require) {
            return Err(Error::Config(
                "sslmode=require is not supported, connect with sslmode=disable or prefer".into(),
            ));
        }

        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| db_error("failed to connect to postgres", e))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("postgres connection closed: {e}");
            }
        });

        info!("connected to postgres database {:?}", config.get_dbname());
        Ok(Self {
            client,
            runtime: Handle::current(),
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Token that asks the server to abort the statement in flight.
    pub fn cancel_token(&self) -> CancelToken {
        self.client.cancel_token()
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

impl SqlExecutor for PostgresStore {
    fn execute(&self, sql: &str) -> Result<()> {
        if sql.trim().is_empty() {
            debug!("skipping empty migration script");
            return Ok(());
        }
        self.block_on(self.client.batch_execute(sql))
            .map_err(|e| db_error("migration script failed", e))
    }
}

impl Ledger for PostgresStore {
    fn ensure_table_exists(&self) -> Result<()> {
        let exists: bool = self
            .block_on(self.client.query_one(
                "SELECT EXISTS (
                    SELECT FROM information_schema.tables
                    WHERE table_schema = current_schema() AND table_name = lower($1)
                )",
                &[&self.table],
            ))
            .map_err(|e| db_error("failed to check bookkeeping table", e))?
            .get(0);
        if exists {
            return Ok(());
        }

        self.block_on(self.client.batch_execute(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                name VARCHAR NOT NULL,
                fingerprint VARCHAR NOT NULL,
                version BIGINT DEFAULT 0,
                created_at TIMESTAMPTZ DEFAULT now(),
                updated_at TIMESTAMPTZ DEFAULT now()
            )",
            self.table
        )))
        .map_err(|e| db_error("failed to create bookkeeping table", e))?;

        info!("created migrations table '{}'", self.table);
        Ok(())
    }

    fn find_current(&self, name: &str) -> Result<Option<MigrationRecord>> {
        let row = self
            .block_on(self.client.query_opt(
                &format!(
                    "SELECT id, name, fingerprint, version, created_at, updated_at FROM {}
                     WHERE name = $1 ORDER BY id DESC LIMIT 1",
                    self.table
                ),
                &[&name],
            ))
            .map_err(|e| db_error("failed to look up migration", e))?;
        row.as_ref().map(read_record).transpose()
    }

    fn list_applied_desc(&self, min_version: i64) -> Result<Vec<MigrationRecord>> {
        let rows = self
            .block_on(self.client.query(
                &format!(
                    "SELECT id, name, fingerprint, version, created_at, updated_at FROM {}
                     WHERE version >= $1
                     ORDER BY version DESC, id DESC",
                    self.table
                ),
                &[&min_version],
            ))
            .map_err(|e| db_error("failed to query migrations", e))?;
        rows.iter().map(read_record).collect()
    }

    fn next_version(&self) -> Result<i64> {
        let max: Option<i64> = self
            .block_on(
                self.client
                    .query_one(&format!("SELECT MAX(version) FROM {}", self.table), &[]),
            )
            .map_err(|e| db_error("failed to read max version", e))?
            .get(0);
        Ok(max.map_or(0, |v| v + 1))
    }

    fn insert(
        &self,
        name: &str,
        fingerprint: &str,
        version: i64,
        applied_at: DateTime<Utc>,
    ) -> Result<()> {
        self.block_on(self.client.execute(
            &format!(
                "INSERT INTO {} (name, fingerprint, version, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $4)",
                self.table
            ),
            &[&name, &fingerprint, &version, &applied_at],
        ))
        .map_err(|e| db_error("failed to record migration", e))?;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.block_on(self.client.execute(
            &format!("DELETE FROM {} WHERE name = $1", self.table),
            &[&name],
        ))
        .map_err(|e| db_error("failed to delete migration record", e))?;
        Ok(())
    }
}

fn read_record(row: &Row) -> Result<MigrationRecord> {
    let read = || -> std::result::Result<MigrationRecord, tokio_postgres::Error> {
        Ok(MigrationRecord {
            id: row.try_get(0)?,
            name: row.try_get(1)?,
            fingerprint: row.try_get(2)?,
            version: row.try_get::<_, Option<i64>>(3)?.unwrap_or(0),
            created_at: row
                .try_get::<_, Option<DateTime<Utc>>>(4)?
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            updated_at: row
                .try_get::<_, Option<DateTime<Utc>>>(5)?
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        })
    };
    read().map_err(|e| db_error("failed to read migration row", e))
}

fn db_error(what: &str, e: tokio_postgres::Error) -> Error {
    if e.code() == Some(&SqlState::QUERY_CANCELED) {
        return Error::Cancelled;
    }
    Error::Database(format!("{what}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refuses_unsafe_table_before_connecting() {
        let err = PostgresStore::connect("postgres://u:p@127.0.0.1:1/db", "x; DROP")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn refuses_required_tls() {
        let err = PostgresStore::connect(
            "postgres://u:p@127.0.0.1:1/db?sslmode=require",
            "migrations",
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("sslmode")));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_database_error() {
        let err = PostgresStore::connect(
            "postgres://u:p@127.0.0.1:1/db?sslmode=disable&connect_timeout=2",
            "migrations",
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, Error::Database(ref msg) if msg.starts_with("failed to connect")));
    }
}
