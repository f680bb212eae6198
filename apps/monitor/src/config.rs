use std::{env, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::Credentials;
use crate::storage::DEFAULT_HISTORY_CAP;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[source] std::io::Error),
    #[error("failed to write config: {0}")]
    Write(#[source] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("no usable config path (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub registry: Registry,
    pub storage: Storage,
    pub timing: Timing,
    pub heuristics: Heuristics,
    pub alerts: Alerts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Registry {
    /// Airtable-style REST endpoint listing the monitored projects.
    /// The bearer token comes from `VIGIL_REGISTRY_TOKEN`.
    pub endpoint: String,
}

impl Default for Registry {
    fn default() -> Self {
        Self { endpoint: "https://api.airtable.com/v0/BASE_ID/Projects".into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Storage {
    /// Directory holding status.json and history.json
    pub out_dir: String,
    pub history_cap: usize,
}

impl Default for Storage {
    fn default() -> Self {
        Self { out_dir: "dashboard".into(), history_cap: DEFAULT_HISTORY_CAP }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Whole-request bound for the plain HTTP strategy
    pub http_timeout_seconds: u64,
    /// Per-navigation bound for browser sessions
    pub navigation_timeout_seconds: u64,
    /// Settle budget after a navigation that triggers server-side auth
    pub auth_settle_seconds: u64,
    /// Settle budget after an ordinary in-app navigation
    pub page_settle_seconds: u64,
    /// Poll interval inside a settle budget
    pub settle_poll_ms: u64,
    /// Pause between login-form fill steps
    pub form_pause_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            http_timeout_seconds: 15,
            navigation_timeout_seconds: 60,
            auth_settle_seconds: 8,
            page_settle_seconds: 2,
            settle_poll_ms: 500,
            form_pause_ms: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Heuristics {
    /// Body-text length that counts as "content present" when no structural
    /// rows match
    pub min_body_text_len: usize,
}

impl Default for Heuristics {
    fn default() -> Self {
        Self { min_body_text_len: 200 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Alerts {
    /// SendGrid-style mail API endpoint; the key comes from
    /// `VIGIL_MAIL_API_KEY`
    pub mail_endpoint: String,
    pub from_email: String,
}

impl Default for Alerts {
    fn default() -> Self {
        Self {
            mail_endpoint: "https://api.sendgrid.com/v3/mail/send".into(),
            from_email: "monitor@noreply.com".into(),
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/vigil/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("vigil/config.toml"))
}

impl Config {
    /// Generate Config structure from file.
    ///
    /// Creates a default config in ~/.config/vigil/config.toml or the
    /// specified path if one does not exist yet.
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(ConfigError::Read)?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::Write)?;
        }

        fs::write(path, config_str).map_err(ConfigError::Write)
    }
}

/// Secrets are environment-only; the config file never holds them
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub registry_token: Option<String>,
    pub mail_api_key: Option<String>,
    pub webhook_url: Option<String>,
    /// Instance-wide default login for credential-login projects
    pub fallback_login: Option<Credentials>,
}

impl Secrets {
    /// Read secrets from the environment (a local `.env` is honored by main)
    pub fn from_env() -> Self {
        let get = |name: &str| env::var(name).ok().filter(|value| !value.is_empty());

        let fallback_login =
            match (get("VIGIL_LOGIN_EMAIL"), get("VIGIL_LOGIN_PASSWORD")) {
                (Some(email), Some(password)) => Some(Credentials { email, password }),
                _ => None,
            };

        Self {
            registry_token: get("VIGIL_REGISTRY_TOKEN"),
            mail_api_key: get("VIGIL_MAIL_API_KEY"),
            webhook_url: get("VIGIL_WEBHOOK_URL"),
            fallback_login,
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn defaults_match_the_documented_contract() {
        let config = Config::default();
        assert_eq!(config.timing.http_timeout_seconds, 15);
        assert_eq!(config.timing.navigation_timeout_seconds, 60);
        assert_eq!(config.timing.auth_settle_seconds, 8);
        assert_eq!(config.timing.page_settle_seconds, 2);
        assert_eq!(config.heuristics.min_body_text_len, 200);
        assert_eq!(config.storage.history_cap, 672);
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::from_config(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.storage.out_dir, "dashboard");
    }

    #[test]
    fn roundtrips_through_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.timing.auth_settle_seconds = 12;
        config.storage.history_cap = 96;
        config.write_config(&path).unwrap();

        let reread = Config::from_config(Some(&path)).unwrap();
        assert_eq!(reread.timing.auth_settle_seconds, 12);
        assert_eq!(reread.storage.history_cap, 96);
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[timing]\nauth_settle_seconds = 3\n").unwrap();

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.timing.auth_settle_seconds, 3);
        assert_eq!(config.timing.page_settle_seconds, 2);
        assert_eq!(config.storage.history_cap, 672);
    }

    #[test]
    fn non_toml_extension_is_normalized() {
        assert_eq!(
            normalize_toml_path(path::Path::new("/tmp/vigil/config.yaml")),
            path::PathBuf::from("/tmp/vigil/config.toml")
        );
    }
}
