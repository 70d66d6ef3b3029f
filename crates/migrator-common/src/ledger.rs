use chrono::{DateTime, Utc};

use crate::Result;

/// `min_version` value that selects every applied migration.
pub const NO_LOWER_BOUND: i64 = -1;

/// One row of the bookkeeping table: the fact that a migration was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub id: i64,
    pub name: String,
    pub fingerprint: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persistent record of applied migrations.
///
/// Every call is scoped to the connection the implementation owns. Records are
/// never updated in place: applying inserts, reverting deletes.
pub trait Ledger {
    /// Create the bookkeeping table if it is missing.
    fn ensure_table_exists(&self) -> Result<()>;

    /// Latest record for `name` by id, if any.
    fn find_current(&self, name: &str) -> Result<Option<MigrationRecord>>;

    /// Records with `version >= min_version`, ordered by `(version desc, id desc)`.
    fn list_applied_desc(&self, min_version: i64) -> Result<Vec<MigrationRecord>>;

    /// `1 + max(version)`, or `0` when nothing has been applied.
    fn next_version(&self) -> Result<i64>;

    fn insert(
        &self,
        name: &str,
        fingerprint: &str,
        version: i64,
        applied_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Remove every record for `name`. No-op when there is none.
    fn delete(&self, name: &str) -> Result<()>;
}

/// Runs migration SQL against the target database.
pub trait SqlExecutor {
    /// Execute a script of zero or more statements.
    fn execute(&self, sql: &str) -> Result<()>;
}
