//! Layered configuration.
//!
//! Sources, later ones winning:
//! 1. built-in defaults,
//! 2. `driftsync.toml`, `driftsync.yaml` or `driftsync.json` in the platform
//!    config directory, or one explicitly given file,
//! 3. environment variables prefixed `DRIFTSYNC_`, with `__` separating
//!    nested keys (`DRIFTSYNC_SCAN__INCLUDE_ACCESS_TIME=true`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use driftsync_index::CaseSensitivity;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APPLICATION: &str = "driftsync";
const ENV_PREFIX: &str = "DRIFTSYNC_";
const CONFIG_FILES: [&str; 3] = ["driftsync.toml", "driftsync.yaml", "driftsync.json"];

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", APPLICATION, APPLICATION)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database holding change events and baselines.
    pub database: PathBuf,
    /// Directory monitored when the caller doesn't name one.
    pub root: Option<PathBuf>,
    pub case_sensitivity: CaseSensitivity,
    pub scan: ScanConfig,
}
impl Default for Config {
    fn default() -> Self {
        let database = project_dirs()
            .map(|dirs| dirs.data_dir().join("driftsync.db"))
            .unwrap_or_else(|| PathBuf::from("driftsync.db"));
        Self { database, root: None, case_sensitivity: CaseSensitivity::platform(), scan: ScanConfig::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Count access as modification. On by default only on Windows.
    pub include_access_time: bool,
}
impl Default for ScanConfig {
    fn default() -> Self {
        Self { include_access_time: cfg!(windows) }
    }
}

fn file_provider(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}

impl Config {
    /// All configuration sources, merged but not extracted yet.
    ///
    /// With `explicit`, that file replaces the platform config directory
    /// lookup and must exist.
    pub fn figment(explicit: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match explicit {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                figment = file_provider(figment, path)?;
            },
            None => {
                if let Some(dirs) = project_dirs() {
                    for name in CONFIG_FILES {
                        let path = dirs.config_dir().join(name);
                        if path.is_file() {
                            tracing::debug!(path = %path.display(), "loading config file");
                            figment = file_provider(figment, &path)?;
                        }
                    }
                }
            },
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extracts and validates a configuration.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Extract)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration from every source.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::from_figment(&Self::figment(explicit)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("database path is empty"));
        }
        if let Some(root) = &self.root
            && !root.is_absolute()
        {
            exn::bail!(ErrorKind::Invalid("root must be an absolute path"));
        }
        Ok(())
    }
}
