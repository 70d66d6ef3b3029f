//! Migration engine.
//!
//! [`Migrator`] reconciles the files a [`FileStore`] finds with the records a
//! [`Ledger`] holds, runs the SQL it decides on through a [`SqlExecutor`] and
//! returns the per-migration [`Outcome`]s in processing order.
//!
//! Nothing spans more than one migration: work committed before a failure or
//! a cancellation stays committed.

use chrono::Utc;
use migrator_common::{Error, Ledger, MigrationRecord, NO_LOWER_BOUND, Result, SqlExecutor};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::files::{FileStore, FilesByName, MigrationFile};
use crate::outcome::{Outcome, OutcomeStatus};

/// Selects which applied migrations `down` and `redo` act on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Act on every selected record instead of only the most recent one.
    pub all: bool,
    /// When positive, select the batches with `version >= next_version - step`.
    pub step: u32,
}

impl RunOptions {
    pub fn latest() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            all: true,
            step: 0,
        }
    }

    pub fn step(step: u32) -> Self {
        Self { all: false, step }
    }

    // A positive step widens the target set the same way `all` does.
    fn takes_every_record(&self) -> bool {
        self.all || self.step > 0
    }
}

pub struct Migrator<F, D> {
    files: F,
    db: D,
    cancel: CancelToken,
}

impl<F, D> Migrator<F, D>
where
    F: FileStore,
    D: Ledger + SqlExecutor,
{
    pub fn new(files: F, db: D) -> Self {
        Self {
            files,
            db,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn files(&self) -> &F {
        &self.files
    }

    pub fn db(&self) -> &D {
        &self.db
    }

    /// Apply every file without a ledger record as one new batch.
    pub fn up(&self) -> Result<Vec<Outcome>> {
        self.run_up().map_err(|e| e.context("up"))
    }

    /// Revert applied migrations, most recent first.
    pub fn down(&self, options: RunOptions) -> Result<Vec<Outcome>> {
        self.run_down(options).map_err(|e| e.context("down"))
    }

    /// Revert and re-apply the selected migrations, keeping their batch versions.
    pub fn redo(&self, options: RunOptions) -> Result<Vec<Outcome>> {
        self.run_redo(options).map_err(|e| e.context("redo"))
    }

    /// One row per file on disk. Lookup failures degrade to "No migrate".
    pub fn status(&self) -> Result<Vec<Outcome>> {
        let files = self.files.list_files().map_err(|e| e.context("status"))?;

        let outcomes = files
            .into_iter()
            .map(|file| match self.db.find_current(&file.name) {
                Ok(Some(record)) => Outcome {
                    name: file.name,
                    status: OutcomeStatus::Applied,
                    version: Some(record.version),
                    applied_at: Some(record.created_at),
                },
                Ok(None) => Outcome::new(file.name, OutcomeStatus::Pending),
                Err(e) => {
                    warn!("status lookup for {} failed: {e}", file.name);
                    Outcome::new(file.name, OutcomeStatus::Pending)
                }
            })
            .collect();
        Ok(outcomes)
    }

    /// Version of the most recently applied migration.
    pub fn version(&self) -> Result<i64> {
        self.current_version().map_err(|e| e.context("dbversion"))
    }

    fn run_up(&self) -> Result<Vec<Outcome>> {
        let files = self.files.list_files()?;
        self.db.ensure_table_exists()?;
        let version = self.db.next_version()?;
        debug!("applying pending migrations as version {version}");

        let mut outcomes = Vec::new();
        for file in &files {
            if let Some(outcome) = self.apply_up(file, version)? {
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    fn run_down(&self, options: RunOptions) -> Result<Vec<Outcome>> {
        let files = self.files.list_files_by_name()?;
        let targets = self.select_targets(options)?;
        if targets.is_empty() {
            return Err(Error::NothingToMigrate);
        }

        targets
            .iter()
            .map(|record| self.apply_down(record, &files))
            .collect()
    }

    fn run_redo(&self, options: RunOptions) -> Result<Vec<Outcome>> {
        let files = self.files.list_files_by_name()?;
        let mut targets = self.select_targets(options)?;
        if targets.is_empty() {
            return Err(Error::NoHistoryToRedo);
        }

        let mut outcomes = Vec::with_capacity(targets.len() * 2);
        for record in &targets {
            outcomes.push(self.apply_down(record, &files)?);
        }

        targets.sort_by_key(|record| record.id);
        for record in &targets {
            let file = files
                .get(&record.name)
                .ok_or_else(|| Error::MigrationFileNotFound(record.name.clone()))?;
            if let Some(outcome) = self.apply_up(file, record.version)? {
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    fn current_version(&self) -> Result<i64> {
        self.db.ensure_table_exists()?;
        self.db
            .list_applied_desc(NO_LOWER_BOUND)?
            .first()
            .map(|record| record.version)
            .ok_or(Error::NoMigrationsApplied)
    }

    fn select_targets(&self, options: RunOptions) -> Result<Vec<MigrationRecord>> {
        self.db.ensure_table_exists()?;
        let min_version = if options.step == 0 {
            NO_LOWER_BOUND
        } else {
            self.db.next_version()? - i64::from(options.step)
        };

        let mut records = self.db.list_applied_desc(min_version)?;
        if !options.takes_every_record() {
            records.truncate(1);
        }
        Ok(records)
    }

    fn apply_up(&self, file: &MigrationFile, version: i64) -> Result<Option<Outcome>> {
        match self.db.find_current(&file.name)? {
            None => {
                let sql = self.files.extract_up_section(file)?;
                self.cancel.check()?;
                self.db.execute(&sql)?;
                let applied_at = Utc::now();
                record_after_script(|| {
                    self.db
                        .insert(&file.name, &file.fingerprint, version, applied_at)
                })?;
                info!("migrated {} (version {version})", file.name);
                Ok(Some(Outcome::new(&file.name, OutcomeStatus::Migrated)))
            }
            Some(record) if record.fingerprint != file.fingerprint => {
                warn!("{} changed after it was applied", file.name);
                Ok(Some(Outcome::new(&file.name, OutcomeStatus::Changed)))
            }
            Some(_) => Ok(None),
        }
    }

    fn apply_down(&self, record: &MigrationRecord, files: &FilesByName) -> Result<Outcome> {
        let file = files
            .get(&record.name)
            .ok_or_else(|| Error::MigrationFileNotFound(record.name.clone()))?;

        let sql = self.files.extract_down_section(file)?;
        self.cancel.check()?;
        self.db.execute(&sql)?;
        record_after_script(|| self.db.delete(&record.name))?;
        info!("reverted {} (version {})", record.name, record.version);
        Ok(Outcome::new(&record.name, OutcomeStatus::Reverted))
    }
}

/// Ledger write that follows an executed script. An interrupt that arrives
/// once the script is done lands here, so it is retried once.
fn record_after_script(write: impl Fn() -> Result<()>) -> Result<()> {
    match write() {
        Err(Error::Cancelled) => {
            warn!("interrupt arrived after the script ran, recording it anyway");
            write()
        }
        other => other,
    }
}
