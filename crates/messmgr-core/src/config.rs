//! Application configuration management.
//!
//! This module handles loading and saving the client configuration, which
//! includes the API origin override, the session strategy and the last
//! email used to sign in.
//!
//! Configuration is stored at `~/.config/mess-manager/config.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "mess-manager";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// API origin used when nothing overrides it.
pub const DEFAULT_API_ORIGIN: &str = "https://mess-manager-backend-5q6y.onrender.com";

/// Environment variable that overrides the API origin at runtime.
pub const API_URL_ENV: &str = "MM_API_URL";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Whether a 401 triggers an access-credential renewal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalPolicy {
    #[default]
    Enabled,
    Disabled,
}

/// How the session reaches the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialTransport {
    /// `Authorization: Bearer <access token>` on every request.
    #[default]
    BearerHeader,
    /// The server keeps the session in a cookie; no bearer header is sent.
    SessionCookie,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionMode {
    pub renewal: RenewalPolicy,
    pub transport: CredentialTransport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: Option<String>,
    pub renewal: RenewalPolicy,
    pub transport: CredentialTransport,
    pub request_timeout_secs: u64,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: None,
            renewal: RenewalPolicy::default(),
            transport: CredentialTransport::default(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            last_email: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Directory holding `config.json` and the credential storage file.
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME))
    }

    pub fn cache_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn mode(&self) -> SessionMode {
        SessionMode {
            renewal: self.renewal,
            transport: self.transport,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Origin baked in at build time (`MESS_API_URL`), else the hosted backend.
pub fn build_time_origin() -> &'static str {
    option_env!("MESS_API_URL").unwrap_or(DEFAULT_API_ORIGIN)
}

/// Trim whitespace and trailing slashes. `None` for an empty origin.
pub fn normalize_origin(url: &str) -> Option<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Pick the API origin: runtime override, then persisted choice, then the
/// config file, then the build-time default.
pub fn resolve_origin(
    runtime_override: Option<&str>,
    persisted: Option<&str>,
    configured: Option<&str>,
) -> String {
    [runtime_override, persisted, configured]
        .into_iter()
        .flatten()
        .find_map(normalize_origin)
        .or_else(|| normalize_origin(build_time_origin()))
        .unwrap_or_else(|| DEFAULT_API_ORIGIN.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_origin() {
        assert_eq!(normalize_origin("https://host/").as_deref(), Some("https://host"));
        assert_eq!(normalize_origin(" https://host// ").as_deref(), Some("https://host"));
        assert_eq!(normalize_origin(""), None);
        assert_eq!(normalize_origin("/"), None);
    }

    #[test]
    fn test_resolve_origin_precedence() {
        assert_eq!(
            resolve_origin(Some("https://env"), Some("https://saved"), Some("https://file")),
            "https://env"
        );
        assert_eq!(
            resolve_origin(None, Some("https://saved/"), Some("https://file")),
            "https://saved"
        );
        assert_eq!(resolve_origin(Some(""), None, Some("https://file")), "https://file");
        assert_eq!(
            resolve_origin(None, None, None),
            normalize_origin(build_time_origin()).unwrap()
        );
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        assert_eq!(Config::load_from(&path).unwrap(), Config::default());

        let config = Config {
            api_url: Some("https://mess.example".into()),
            renewal: RenewalPolicy::Disabled,
            transport: CredentialTransport::SessionCookie,
            request_timeout_secs: 10,
            last_email: Some("rahim@example.com".into()),
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"transport":"session_cookie"}"#).unwrap();
        assert_eq!(config.transport, CredentialTransport::SessionCookie);
        assert_eq!(config.renewal, RenewalPolicy::Enabled);
        assert_eq!(config.request_timeout(), Duration::from_secs(REQUEST_TIMEOUT_SECS));
    }
}
