//! Settings errors

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    /// A value failed validation
    #[error("{key}: {reason}")]
    InvalidSetting { key: String, reason: String },

    /// No platform config directory, so no default path
    #[error("cannot locate the config directory: {0}")]
    ConfigDirectory(String),

    #[error("config file access failed: {0}")]
    IoError(#[from] io::Error),

    #[error("malformed JSON config: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("malformed TOML config: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("cannot render config as TOML: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SettingsError {
    pub(crate) fn invalid(key: &str, reason: &str) -> Self {
        Self::InvalidSetting {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    /// Extension other than `.toml` or `.json`
    #[error("config files are .toml or .json, not '{0}'")]
    UnsupportedFormat(String),

    #[error("{key} = {value} is out of range")]
    ValueOutOfRange { key: String, value: String },
}

pub type SettingsResult<T> = Result<T, SettingsError>;
