use std::path::{Path, PathBuf};

use migrator_common::{Error, Result};
use tracing::{debug, info};

use crate::model::MigratorConfig;

pub const ENV_DSN: &str = "MIGRATOR_DB_DSN";
pub const ENV_DIR: &str = "MIGRATOR_DIR";
pub const ENV_TABLE: &str = "MIGRATOR_TABLE";

const DEFAULT_FILE_NAMES: [&str; 3] = ["migrator.yml", "migrator.yaml", "migrator.toml"];

/// Resolves a `MigratorConfig` from an optional config file and the environment.
///
/// An explicitly requested file must exist. Without one, the first of
/// `migrator.yml`, `migrator.yaml`, `migrator.toml` found in the search
/// directory is used, and defaults apply when none exists. Environment
/// variables override whatever the file set.
pub struct ConfigLoader {
    explicit: Option<PathBuf>,
    search_dir: PathBuf,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            explicit: None,
            search_dir: PathBuf::from("."),
        }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit = Some(path.into());
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dir = dir.into();
        self
    }

    pub fn load(&self) -> Result<MigratorConfig> {
        let mut config = self.load_file()?;
        apply_env(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_file(&self) -> Result<MigratorConfig> {
        let path = match &self.explicit {
            Some(path) => {
                if !path.is_file() {
                    return Err(Error::Config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                path.clone()
            }
            None => match self.discover() {
                Some(path) => path,
                None => {
                    debug!("no config file found, using defaults");
                    return Ok(MigratorConfig::default());
                }
            },
        };

        let contents = std::fs::read_to_string(&path)?;
        let config = parse_config(&path, &contents)?;
        info!("config loaded from {}", path.display());
        Ok(config)
    }

    fn discover(&self) -> Option<PathBuf> {
        DEFAULT_FILE_NAMES
            .iter()
            .map(|name| self.search_dir.join(name))
            .find(|candidate| candidate.is_file())
    }
}

/// Parse config text, choosing the format from the file extension.
pub fn parse_config(path: &Path, contents: &str) -> Result<MigratorConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "yml" | "yaml" => serde_yaml::from_str(contents)
            .map_err(|e| Error::Config(format!("YAML parse error: {e}"))),
        "toml" => {
            toml::from_str(contents).map_err(|e| Error::Config(format!("TOML parse error: {e}")))
        }
        other => Err(Error::Config(format!(
            "unsupported config extension: {other}"
        ))),
    }
}

/// Overlay environment values onto `config`. Empty values are ignored.
pub fn apply_env(config: &mut MigratorConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(dsn) = get(ENV_DSN) {
        config.database.dsn = Some(dsn);
    }
    if let Some(dir) = get(ENV_DIR) {
        config.migrations_dir = PathBuf::from(dir);
    }
    if let Some(table) = get(ENV_TABLE) {
        config.table = table;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_when_no_file_present() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new().in_dir(dir.path());
        let config = loader.load_file().unwrap();
        assert_eq!(config, MigratorConfig::default());
        assert_eq!(config.table, "migrations");
        assert_eq!(config.migrations_dir, PathBuf::from("migrations"));
    }

    #[test]
    fn discovers_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("migrator.yml"),
            "migrations_dir: db/migrations\ntable: schema_history\ndatabase:\n  dsn: app.db\n",
        )
        .unwrap();

        let config = ConfigLoader::new().in_dir(dir.path()).load_file().unwrap();
        assert_eq!(config.migrations_dir, PathBuf::from("db/migrations"));
        assert_eq!(config.table, "schema_history");
        assert_eq!(config.database.dsn.as_deref(), Some("app.db"));
    }

    #[test]
    fn explicit_toml_file_with_partial_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "table = \"applied\"\n").unwrap();

        let config = ConfigLoader::new().with_file(&path).load_file().unwrap();
        assert_eq!(config.table, "applied");
        assert_eq!(config.migrations_dir, PathBuf::from("migrations"));
        assert!(config.database.dsn.is_none());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigLoader::new()
            .with_file(dir.path().join("nope.yml"))
            .load_file()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_unknown_extension() {
        let err = parse_config(Path::new("migrator.json"), "{}").unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: unsupported config extension: json"
        );
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = MigratorConfig::default();
        let env: HashMap<&str, &str> = [
            (ENV_DSN, "sqlite://prod.db"),
            (ENV_DIR, "sql"),
            (ENV_TABLE, ""),
        ]
        .into_iter()
        .collect();

        apply_env(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.dsn.as_deref(), Some("sqlite://prod.db"));
        assert_eq!(config.migrations_dir, PathBuf::from("sql"));
        assert_eq!(config.table, "migrations");
    }
}
