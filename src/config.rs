use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::import::options::{ConflictStrategy, MissingDepStrategy};
use crate::orchestration::spawn::DEFAULT_CLAIM_ATTEMPTS;
use crate::{clog_debug, Error, Result};

const DEFAULT_TASK_FILE: &str = ".cairn/tasks.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub task_file: Option<String>,
    pub project: Option<String>,
    #[serde(default)]
    pub import: ImportDefaults,
    #[serde(default)]
    pub spawn: SpawnSettings,
}

/// Strategy defaults applied when the command line leaves them unset.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ImportDefaults {
    #[serde(default)]
    pub on_conflict: ConflictStrategy,
    #[serde(default)]
    pub on_missing_dep: MissingDepStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpawnSettings {
    #[serde(default = "default_claim_attempts")]
    pub max_claim_attempts: u32,
}

impl Default for SpawnSettings {
    fn default() -> Self {
        Self {
            max_claim_attempts: DEFAULT_CLAIM_ATTEMPTS,
        }
    }
}

fn default_claim_attempts() -> u32 {
    DEFAULT_CLAIM_ATTEMPTS
}

impl Config {
    pub fn cairn_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".cairn"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::cairn_dir()?.join("cairn.toml"))
    }

    /// Location of the task document, relative paths resolved against `cwd`.
    pub fn task_file_in(&self, cwd: &Path) -> PathBuf {
        match &self.task_file {
            Some(file) => {
                let expanded = expand_tilde(file);
                if expanded.is_absolute() {
                    expanded
                } else {
                    cwd.join(expanded)
                }
            }
            None => cwd.join(DEFAULT_TASK_FILE),
        }
    }

    pub fn project_name(&self) -> &str {
        self.project.as_deref().unwrap_or("cairn")
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        clog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            clog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        clog_debug!(
            "Config loaded: task_file={:?}, on_conflict={:?}, on_missing_dep={:?}",
            config.task_file,
            config.import.on_conflict,
            config.import.on_missing_dep
        );
        Ok(config)
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
