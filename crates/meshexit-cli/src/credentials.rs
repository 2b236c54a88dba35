//! Credential handling.
//!
//! Environment variables take precedence over the config file, per field:
//! `MESHEXIT_API_URL` and `MESHEXIT_ACCESS_TOKEN` override whatever is
//! stored under the user config directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

pub const ENV_API_URL: &str = "MESHEXIT_API_URL";
pub const ENV_ACCESS_TOKEN: &str = "MESHEXIT_ACCESS_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API URL not configured: set {ENV_API_URL} or run 'meshexit config set'")]
    MissingApiUrl,

    #[error("access token not configured: set {ENV_ACCESS_TOKEN} or run 'meshexit config set'")]
    MissingAccessToken,

    #[error("cannot write config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// On-disk configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    pub api_url: Option<String>,
    pub access_token: Option<String>,
}

impl FileConfig {
    /// `<config dir>/meshexit/config.toml`.
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("meshexit").join("config.toml"))
    }

    /// Load the config file. A missing or unreadable file yields the
    /// default; credentials may still come from the environment.
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            return Self::default();
        };
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        match toml::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                warn!("ignoring malformed config file {}: {}", path.display(), err);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::path().ok_or_else(|| {
            ConfigError::Io(std::io::Error::other("no user config directory"))
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, toml::to_string_pretty(self)?)?;
        Ok(path)
    }
}

/// Resolved credentials ready to build a client from.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_url: String,
    pub access_token: String,
}

impl Credentials {
    pub fn resolve() -> Result<Self, ConfigError> {
        resolve_from(
            std::env::var(ENV_API_URL).ok(),
            std::env::var(ENV_ACCESS_TOKEN).ok(),
            FileConfig::load(),
        )
    }
}

fn resolve_from(
    env_url: Option<String>,
    env_token: Option<String>,
    file: FileConfig,
) -> Result<Credentials, ConfigError> {
    let api_url = env_url
        .or(file.api_url)
        .ok_or(ConfigError::MissingApiUrl)?;
    let access_token = env_token
        .or(file.access_token)
        .ok_or(ConfigError::MissingAccessToken)?;

    Ok(Credentials {
        api_url: api_url.trim_end_matches('/').to_string(),
        access_token,
    })
}

/// Mask a token for display, keeping just enough to recognize it.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() > 12 {
        let head: String = chars[..8].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "***".to_string()
    }
}
