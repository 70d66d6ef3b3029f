pub mod error;
pub mod ledger;

pub use error::{Error, Result};
pub use ledger::{Ledger, MigrationRecord, NO_LOWER_BOUND, SqlExecutor};
