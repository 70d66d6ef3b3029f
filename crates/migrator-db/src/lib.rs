pub mod postgres_store;
pub mod sqlite_store;
pub mod store;
pub mod target;

pub use postgres_store::PostgresStore;
pub use sqlite_store::SqliteStore;
pub use store::{AnyStore, Interrupter};
pub use target::{DatabaseTarget, parse_dsn, validate_table_name};
