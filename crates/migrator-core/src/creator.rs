use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{Local, NaiveDateTime};
use migrator_common::{Error, Result};
use regex::Regex;
use tracing::info;

use crate::files::{DOWN_MARKER, UP_MARKER};

const TIMESTAMP_FORMAT: &str = "%Y_%m_%d_%H%M%S";

static FIRST_CAP: LazyLock<Regex> = LazyLock::new(|| Regex::new("(.)([A-Z][a-z]+)").unwrap());
static ALL_CAP: LazyLock<Regex> = LazyLock::new(|| Regex::new("([a-z0-9])([A-Z])").unwrap());
static SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s\-]+").unwrap());

/// Body of a freshly created migration.
pub fn template() -> String {
    format!(
        "{UP_MARKER}\n--write your sql for migration...\n\n\n{DOWN_MARKER}\n--write your sql for rollback migration...\n\n"
    )
}

/// `CreateUsersTable` -> `create_users_table`. Spaces and dashes become `_`.
pub fn to_snake_case(name: &str) -> String {
    let joined = SEPARATORS.replace_all(name.trim(), "_");
    let snake = FIRST_CAP.replace_all(&joined, "${1}_${2}");
    let snake = ALL_CAP.replace_all(&snake, "${1}_${2}");
    snake.to_lowercase()
}

/// Asked whether to go on when an existing file already carries the name.
pub trait Confirm {
    fn confirm_duplicate(&mut self, existing: &str) -> Result<bool>;
}

impl<F> Confirm for F
where
    F: FnMut(&str) -> Result<bool>,
{
    fn confirm_duplicate(&mut self, existing: &str) -> Result<bool> {
        self(existing)
    }
}

/// Scaffolds timestamped migration files.
pub struct FileCreator {
    dir: PathBuf,
}

impl FileCreator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create `<timestamp>_<snake_name>.sql` stamped with the local time.
    pub fn create(&self, raw_name: &str, confirm: &mut impl Confirm) -> Result<PathBuf> {
        self.create_at(raw_name, Local::now().naive_local(), confirm)
    }

    pub fn create_at(
        &self,
        raw_name: &str,
        now: NaiveDateTime,
        confirm: &mut impl Confirm,
    ) -> Result<PathBuf> {
        let name = to_snake_case(raw_name);
        if name.is_empty() {
            return Err(Error::InvalidName(raw_name.to_string()));
        }

        std::fs::create_dir_all(&self.dir)?;

        if let Some(existing) = self.find_duplicate(&name)?
            && !confirm.confirm_duplicate(&existing)?
        {
            return Err(Error::DuplicateCancelled(existing));
        }

        let path = self
            .dir
            .join(format!("{}_{name}.sql", now.format(TIMESTAMP_FORMAT)));
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => Error::FileExists(path.clone()),
                _ => Error::Io(e),
            })?;
        file.write_all(template().as_bytes())?;

        info!("created migration file {}", path.display());
        Ok(path)
    }

    // Last match in name order, so the newest timestamp wins.
    fn find_duplicate(&self, name: &str) -> Result<Option<String>> {
        let mut matches = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let file_name = entry?.file_name().to_string_lossy().into_owned();
            if file_name.contains(name) {
                matches.push(file_name);
            }
        }
        matches.sort();
        Ok(matches.pop())
    }
}
