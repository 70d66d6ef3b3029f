use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed migration {name}: {reason}")]
    MalformedMigration { name: String, reason: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("not found migration file: {0}")]
    MigrationFileNotFound(String),

    #[error("nothing for down migrate")]
    NothingToMigrate,

    #[error("no migrations recorded, nothing to redo")]
    NoHistoryToRedo,

    #[error("no migrations have been applied yet")]
    NoMigrationsApplied,

    #[error("stopped on duplicate migration name: {0}")]
    DuplicateCancelled(String),

    #[error("invalid migration name: '{0}'")]
    InvalidName(String),

    #[error("migration file already exists: {}", .0.display())]
    FileExists(PathBuf),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{context}: {source}")]
    Context {
        context: &'static str,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error with the name of the operation that produced it.
    pub fn context(self, context: &'static str) -> Self {
        Error::Context {
            context,
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any operation context.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn error_display_includes_context() {
        let e = Error::Database("disk full".into());
        assert_eq!(e.to_string(), "database error: disk full");

        let e = Error::MigrationFileNotFound("2024_01_01_000000_init.sql".into());
        assert_eq!(
            e.to_string(),
            "not found migration file: 2024_01_01_000000_init.sql"
        );

        let e = Error::NothingToMigrate.context("down");
        assert_eq!(e.to_string(), "down: nothing for down migrate");
    }

    #[test]
    fn root_skips_nested_context() {
        let e = Error::NoHistoryToRedo.context("redo").context("cli");
        assert!(matches!(e.root(), Error::NoHistoryToRedo));

        let e = Error::Cancelled;
        assert!(matches!(e.root(), Error::Cancelled));
    }
}
