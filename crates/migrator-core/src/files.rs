//! Discovery and parsing of migration files.
//!
//! A migration file holds two sections:
//!
//! ```text
//! --migrate:UP
//! CREATE TABLE t(x int);
//!
//! --migrate:DOWN
//! DROP TABLE t;
//! ```
//!
//! The up-section is the text between the two markers, the down-section is
//! everything after `--migrate:DOWN`. Both are trimmed before execution.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use migrator_common::{Error, Result};
use ring::digest::{SHA256, digest};
use tracing::{debug, warn};

pub const UP_MARKER: &str = "--migrate:UP";
pub const DOWN_MARKER: &str = "--migrate:DOWN";

/// A migration discovered on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// File name including the timestamp prefix; the ledger key.
    pub name: String,
    pub path: PathBuf,
    /// SHA-256 of the full content, URL-safe base64.
    pub fingerprint: String,
}

pub type FilesByName = HashMap<String, MigrationFile>;

/// Source of migration files.
pub trait FileStore {
    /// Every migration file, in a stable enumeration order.
    fn list_files(&self) -> Result<Vec<MigrationFile>>;

    fn list_files_by_name(&self) -> Result<FilesByName> {
        Ok(self
            .list_files()?
            .into_iter()
            .map(|file| (file.name.clone(), file))
            .collect())
    }

    fn extract_up_section(&self, file: &MigrationFile) -> Result<String>;

    fn extract_down_section(&self, file: &MigrationFile) -> Result<String>;
}

/// SHA-256 over `bytes`, encoded as URL-safe base64 with padding.
pub fn fingerprint(bytes: &[u8]) -> String {
    URL_SAFE.encode(digest(&SHA256, bytes))
}

/// The two SQL sections of a migration, already trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sections<'a> {
    pub up: &'a str,
    pub down: &'a str,
}

/// Split migration content at its markers. `name` only feeds error messages.
pub fn split_sections<'a>(name: &str, content: &'a str) -> Result<Sections<'a>> {
    let malformed = |reason: &str| Error::MalformedMigration {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let up_start = content
        .find(UP_MARKER)
        .map(|i| i + UP_MARKER.len())
        .ok_or_else(|| malformed("missing --migrate:UP marker"))?;
    let down_offset = content[up_start..]
        .find(DOWN_MARKER)
        .ok_or_else(|| malformed("missing --migrate:DOWN marker after --migrate:UP"))?;
    let down_marker = up_start + down_offset;

    Ok(Sections {
        up: content[up_start..down_marker].trim(),
        down: content[down_marker + DOWN_MARKER.len()..].trim(),
    })
}

/// Migration files in a single, non-recursive directory.
pub struct DirFileStore {
    dir: PathBuf,
}

impl DirFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_content(&self, file: &MigrationFile) -> Result<String> {
        let bytes = std::fs::read(&file.path)?;
        String::from_utf8(bytes).map_err(|_| Error::MalformedMigration {
            name: file.name.clone(),
            reason: "content is not valid UTF-8".into(),
        })
    }
}

impl FileStore for DirFileStore {
    fn list_files(&self) -> Result<Vec<MigrationFile>> {
        if !self.dir.exists() {
            debug!("migrations folder {} does not exist", self.dir.display());
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            // Follows symlinks, so a linked migration counts as a file.
            let meta = match std::fs::metadata(&path) {
                Ok(meta) => meta,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!("skipping dangling symlink {}", path.display());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if !meta.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                warn!("skipping migration with non UTF-8 name: {:?}", path);
                continue;
            };

            let bytes = std::fs::read(&path)?;
            files.push(MigrationFile {
                name,
                path,
                fingerprint: fingerprint(&bytes),
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        debug!("found {} migration files in {}", files.len(), self.dir.display());
        Ok(files)
    }

    fn extract_up_section(&self, file: &MigrationFile) -> Result<String> {
        let content = self.read_content(file)?;
        Ok(split_sections(&file.name, &content)?.up.to_string())
    }

    fn extract_down_section(&self, file: &MigrationFile) -> Result<String> {
        let content = self.read_content(file)?;
        Ok(split_sections(&file.name, &content)?.down.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INIT: &str = "--migrate:UP\nCREATE TABLE t(x int);\n\n--migrate:DOWN\nDROP TABLE t;\n";

    #[test]
    fn fingerprint_of_empty_content() {
        assert_eq!(
            fingerprint(b""),
            "47DEQpj8HBSa-_TImW-5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn fingerprint_changes_with_single_byte() {
        assert_eq!(fingerprint(INIT.as_bytes()), fingerprint(INIT.as_bytes()));

        let mut edited = INIT.as_bytes().to_vec();
        edited[20] ^= 1;
        assert_ne!(fingerprint(INIT.as_bytes()), fingerprint(&edited));
    }

    #[test]
    fn splits_sections_and_trims() {
        let sections = split_sections("init.sql", INIT).unwrap();
        assert_eq!(sections.up, "CREATE TABLE t(x int);");
        assert_eq!(sections.down, "DROP TABLE t;");
    }

    #[test]
    fn sections_never_contain_markers() {
        let content = "-- header\n--migrate:UP\n  a;\n  b;\n--migrate:DOWN\n\n  c;  \n";
        let sections = split_sections("x.sql", content).unwrap();
        assert_eq!(sections.up, "a;\n  b;");
        assert_eq!(sections.down, "c;");
        for section in [sections.up, sections.down] {
            assert!(!section.contains(UP_MARKER));
            assert!(!section.contains(DOWN_MARKER));
        }
    }

    #[test]
    fn empty_sections_are_allowed() {
        let sections = split_sections("x.sql", "--migrate:UP\n--migrate:DOWN").unwrap();
        assert_eq!(sections.up, "");
        assert_eq!(sections.down, "");
    }

    #[test]
    fn missing_or_misordered_markers_are_malformed() {
        for content in [
            "CREATE TABLE t(x int);",
            "--migrate:UP\nCREATE TABLE t(x int);",
            "--migrate:DOWN\nDROP TABLE t;\n--migrate:UP\nCREATE TABLE t(x int);",
        ] {
            let err = split_sections("bad.sql", content).unwrap_err();
            assert!(
                matches!(err, Error::MalformedMigration { ref name, .. } if name == "bad.sql"),
                "unexpected error for {content:?}: {err}"
            );
        }
    }

    #[test]
    fn missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirFileStore::new(dir.path().join("absent"));
        assert!(store.list_files().unwrap().is_empty());
    }

    #[test]
    fn lists_regular_files_sorted_with_fingerprints() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("2024_01_02_000000_b.sql"), INIT).unwrap();
        std::fs::write(dir.path().join("2024_01_01_000000_a.sql"), "").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let store = DirFileStore::new(dir.path());
        let files = store.list_files().unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["2024_01_01_000000_a.sql", "2024_01_02_000000_b.sql"]);
        assert_eq!(
            files[0].fingerprint,
            "47DEQpj8HBSa-_TImW-5JCeuQeRkm5NMpJWZG3hSuFU="
        );

        let by_name = store.list_files_by_name().unwrap();
        assert_eq!(by_name.len(), 2);
        assert_eq!(by_name["2024_01_02_000000_b.sql"], files[1]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_migrations_are_listed() {
        let dir = tempfile::tempdir().unwrap();
        let shared = tempfile::tempdir().unwrap();
        let target = shared.path().join("init.sql");
        std::fs::write(&target, INIT).unwrap();
        std::os::unix::fs::symlink(&target, dir.path().join("2024_01_01_000000_init.sql"))
            .unwrap();
        std::os::unix::fs::symlink(shared.path(), dir.path().join("linked_dir")).unwrap();
        std::os::unix::fs::symlink(
            shared.path().join("missing.sql"),
            dir.path().join("2024_01_02_000000_dangling.sql"),
        )
        .unwrap();

        let store = DirFileStore::new(dir.path());
        let files = store.list_files().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "2024_01_01_000000_init.sql");
        assert_eq!(files[0].fingerprint, fingerprint(INIT.as_bytes()));
        assert_eq!(
            store.extract_up_section(&files[0]).unwrap(),
            "CREATE TABLE t(x int);"
        );
    }

    #[test]
    fn extracts_sections_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("init.sql"), INIT).unwrap();

        let store = DirFileStore::new(dir.path());
        let file = store.list_files().unwrap().remove(0);
        assert_eq!(
            store.extract_up_section(&file).unwrap(),
            "CREATE TABLE t(x int);"
        );
        assert_eq!(store.extract_down_section(&file).unwrap(), "DROP TABLE t;");
    }

    #[test]
    fn extracting_from_vanished_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.sql");
        std::fs::write(&path, INIT).unwrap();

        let store = DirFileStore::new(dir.path());
        let file = store.list_files().unwrap().remove(0);
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            store.extract_up_section(&file).unwrap_err(),
            Error::Io(_)
        ));
    }
}
