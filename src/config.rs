//! Repository configuration, `.evo/config/config.toml`.
//!
//! ```toml
//! verifySignatures = false
//!
//! [user]
//! name = "Ada"
//! email = "ada@example.com"
//!
//! [signing]
//! keyPath = "/home/ada/.config/evo/signing_key"
//!
//! [files]
//! largeThreshold = 1000000
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paths;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("configuration error in {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    #[error("unknown config key `{key}`")]
    UnknownKey { key: String },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub const DEFAULT_LARGE_THRESHOLD: u64 = 1_000_000;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "verifySignatures")]
    pub verify_signatures: bool,
    pub user: UserConfig,
    pub signing: SigningConfig,
    pub files: FilesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct UserConfig {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SigningConfig {
    #[serde(rename = "keyPath")]
    pub key_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    #[serde(rename = "largeThreshold")]
    pub large_threshold: u64,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            large_threshold: DEFAULT_LARGE_THRESHOLD,
        }
    }
}

impl Config {
    /// Load the repo config; a missing file yields the defaults.
    pub fn load(repo_root: &Path) -> Result<Self, ConfigError> {
        let path = paths::config_file(repo_root);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        toml::from_str(&contents).map_err(|e| ConfigError::Invalid {
            path,
            reason: e.to_string(),
        })
    }

    pub fn save(&self, repo_root: &Path) -> Result<(), ConfigError> {
        let path = paths::config_file(repo_root);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let rendered = toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        fs::write(&path, rendered).map_err(|source| ConfigError::Io { path, source })
    }

    /// Dotted-key read access for the adapter surface
    /// (`evo config <key>`). Unset string keys return `None`.
    pub fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let value = match key {
            "user.name" => non_empty(&self.user.name),
            "user.email" => non_empty(&self.user.email),
            "signing.keyPath" => non_empty(&self.signing.key_path),
            "files.largeThreshold" => Some(self.files.large_threshold.to_string()),
            "verifySignatures" => Some(self.verify_signatures.to_string()),
            _ => {
                return Err(ConfigError::UnknownKey {
                    key: key.to_string(),
                })
            }
        };
        Ok(value)
    }

    /// Dotted-key write access. Values are parsed to the key's type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let bad_value = |reason: String| ConfigError::Invalid {
            path: PathBuf::new(),
            reason,
        };
        match key {
            "user.name" => self.user.name = value.to_string(),
            "user.email" => self.user.email = value.to_string(),
            "signing.keyPath" => self.signing.key_path = value.to_string(),
            "files.largeThreshold" => {
                self.files.large_threshold = value
                    .parse()
                    .map_err(|e| bad_value(format!("files.largeThreshold: {e}")))?;
            }
            "verifySignatures" => {
                self.verify_signatures = value
                    .parse()
                    .map_err(|e| bad_value(format!("verifySignatures: {e}")))?;
            }
            _ => {
                return Err(ConfigError::UnknownKey {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
