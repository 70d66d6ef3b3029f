use std::path::PathBuf;

use migrator_common::{Error, Result};

// PostgreSQL's identifier limit; SQLite has none but shares the check.
const MAX_TABLE_NAME_LEN: usize = 63;

/// Where a DSN points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    Memory,
    File(PathBuf),
    /// A `postgres://` or `postgresql://` connection URL, passed through as is.
    Postgres(String),
}

/// Parse a DSN.
///
/// Accepted forms are `postgres://...` / `postgresql://...`, a plain SQLite
/// path, `sqlite://<path>`, `sqlite:<path>`, and `:memory:` /
/// `sqlite::memory:`. Any other scheme is a configuration error.
pub fn parse_dsn(dsn: &str) -> Result<DatabaseTarget> {
    let dsn = dsn.trim();
    if dsn.is_empty() {
        return Err(Error::Config("database DSN is empty".into()));
    }

    if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
        return Ok(DatabaseTarget::Postgres(dsn.to_string()));
    }

    let rest = dsn
        .strip_prefix("sqlite://")
        .or_else(|| dsn.strip_prefix("sqlite:"))
        .unwrap_or(dsn);

    if rest == ":memory:" {
        return Ok(DatabaseTarget::Memory);
    }
    if let Some((scheme, _)) = rest.split_once("://") {
        return Err(Error::Config(format!(
            "unsupported database scheme '{scheme}', expected postgres or sqlite"
        )));
    }
    if rest.is_empty() {
        return Err(Error::Config(format!("DSN '{dsn}' has no database path")));
    }
    Ok(DatabaseTarget::File(PathBuf::from(rest)))
}

/// The bookkeeping table name is spliced into SQL, so only plain identifiers pass.
pub fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_start || !valid_rest || name.len() > MAX_TABLE_NAME_LEN {
        return Err(Error::Config(format!("invalid table name '{name}'")));
    }
    Ok(())
}
