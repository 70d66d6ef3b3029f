pub mod cancel;
pub mod creator;
pub mod engine;
pub mod files;
pub mod outcome;

pub use cancel::CancelToken;
pub use creator::{Confirm, FileCreator, to_snake_case};
pub use engine::{Migrator, RunOptions};
pub use files::{DirFileStore, FileStore, FilesByName, MigrationFile, fingerprint};
pub use outcome::{Outcome, OutcomeStatus};
