//! Daybook configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{DaybookError, DaybookResult};
use crate::retry::{DEFAULT_ATTEMPTS, RetryPolicy};
use crate::store::{ReconcileMode, StoreOptions};

static DEFAULT_DATA_DIR: &str = "~/.local/share/daybook";

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

fn default_load_attempts() -> u32 {
    DEFAULT_ATTEMPTS
}

fn default_load_backoff_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

/// Global configuration at ~/.config/daybook/config.toml
///
/// Every key can be overridden with a `DAYBOOK_`-prefixed environment
/// variable, e.g. `DAYBOOK_LOAD_ATTEMPTS=5`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DaybookConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_load_attempts")]
    pub load_attempts: u32,

    #[serde(default = "default_load_backoff_ms")]
    pub load_backoff_ms: u64,

    #[serde(default)]
    pub event_reconcile: ReconcileMode,

    #[serde(default)]
    pub todo_reconcile: ReconcileMode,

    #[serde(default = "default_true")]
    pub verify_ownership: bool,
}

impl Default for DaybookConfig {
    fn default() -> Self {
        DaybookConfig {
            data_dir: default_data_dir(),
            load_attempts: default_load_attempts(),
            load_backoff_ms: default_load_backoff_ms(),
            event_reconcile: ReconcileMode::default(),
            todo_reconcile: ReconcileMode::default(),
            verify_ownership: true,
        }
    }
}

impl DaybookConfig {
    pub fn config_path() -> DaybookResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| DaybookError::Config("Could not determine config directory".into()))?
            .join("daybook");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from the default location, creating a commented-out file first
    /// if there is none.
    pub fn load() -> DaybookResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> DaybookResult<Self> {
        Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(Environment::with_prefix("DAYBOOK").try_parsing(true))
            .build()
            .map_err(|e| DaybookError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| DaybookError::Config(e.to_string()))
    }

    /// `data_dir` with `~` expanded.
    pub fn data_path(&self) -> PathBuf {
        let full_path_str = shellexpand::tilde(&self.data_dir.to_string_lossy()).into_owned();

        PathBuf::from(full_path_str)
    }

    pub fn documents_path(&self) -> PathBuf {
        self.data_path().join("documents.json")
    }

    pub fn identity_path(&self) -> PathBuf {
        self.data_path().join("identity.json")
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.load_attempts, Duration::from_millis(self.load_backoff_ms))
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            events: self.event_reconcile,
            todos: self.todo_reconcile,
        }
    }

    /// The effective settings in config file syntax.
    pub fn to_toml(&self) -> DaybookResult<String> {
        toml::to_string_pretty(self).map_err(|e| DaybookError::Config(e.to_string()))
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> DaybookResult<()> {
        let contents = format!(
            "\
# daybook configuration

# Where accounts and documents are stored:
# data_dir = \"{DEFAULT_DATA_DIR}\"

# How many times to try loading each collection after sign-in,
# and how long to wait between attempts:
# load_attempts = {DEFAULT_ATTEMPTS}
# load_backoff_ms = 1000

# After a write, \"reload\" re-fetches the collection and
# \"local\" patches the cache with the known result:
# event_reconcile = \"reload\"
# todo_reconcile = \"reload\"

# Refuse to update or delete documents owned by someone else:
# verify_ownership = true
"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DaybookError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| DaybookError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commented_default_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daybook").join("config.toml");
        DaybookConfig::create_default_config(&path).unwrap();

        let config = DaybookConfig::load_from(&path).unwrap();
        assert_eq!(config, DaybookConfig::default());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn reads_overrides_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "load_attempts = 5\nevent_reconcile = \"local\"\nverify_ownership = false\n",
        )
        .unwrap();

        let config = DaybookConfig::load_from(&path).unwrap();
        assert_eq!(config.load_attempts, 5);
        assert_eq!(config.store_options().events, ReconcileMode::Local);
        assert_eq!(config.store_options().todos, ReconcileMode::Reload);
        assert!(!config.verify_ownership);
    }

    #[test]
    fn rejects_unknown_reconcile_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "todo_reconcile = \"sometimes\"\n").unwrap();
        assert!(matches!(
            DaybookConfig::load_from(&path),
            Err(DaybookError::Config(_))
        ));
    }

    #[test]
    fn effective_settings_read_back_as_a_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = DaybookConfig {
            data_dir: dir.path().join("data"),
            load_backoff_ms: 250,
            ..Default::default()
        };
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();
        assert_eq!(DaybookConfig::load_from(&path).unwrap(), config);
        assert_eq!(config.documents_path(), dir.path().join("data/documents.json"));
    }

    #[test]
    fn data_path_expands_tilde() {
        let config = DaybookConfig::default();
        assert!(!config.data_path().to_string_lossy().starts_with('~'));
        assert!(config.identity_path().ends_with("identity.json"));
    }
}
