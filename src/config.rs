use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::auth::AppCredentials;

const DEFAULT_CONFIG_FILE: &str = ".pr-bot.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .pr-bot.toml, overlaid with the
/// environment.
///
/// Every field has a default so the bot starts with zero config; a path
/// that needs a missing secret fails when it is first used.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// GitHub credentials and API location
    #[serde(default)]
    pub github: GitHubConfig,

    /// Bot behaviour
    #[serde(default)]
    pub bot: BotConfig,

    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub App identifier (`APP_ID`)
    pub app_id: Option<String>,
    /// PEM encoded app private key (`PRIVATE_KEY`)
    pub private_key: Option<String>,
    /// Shared secret for webhook signatures (`WEBHOOK_SECRET`)
    pub webhook_secret: Option<String>,
    /// Personal access token used by the mailhook path (`CPS_TOKEN`)
    pub cps_token: Option<String>,
    /// REST API base URL (`GITHUB_API_URL`)
    pub api_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            private_key: None,
            webhook_secret: None,
            cps_token: None,
            api_url: "https://api.github.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Only pull requests by this login are handled on the mailhook path
    pub allowed_author: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            allowed_author: "clydebarrow".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on (`BIND_ADDRESS`)
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from .pr-bot.toml in the current
    /// directory when no path is given (falling back to defaults if that
    /// file doesn't exist), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load_from(default_path)?
                } else {
                    Config::default()
                }
            }
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load from a specific path without consulting the environment.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Overlay values from environment variables; set variables win over the file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let github = &mut self.github;
        for (name, slot) in [
            ("APP_ID", &mut github.app_id),
            ("PRIVATE_KEY", &mut github.private_key),
            ("WEBHOOK_SECRET", &mut github.webhook_secret),
            ("CPS_TOKEN", &mut github.cps_token),
        ] {
            if let Some(value) = lookup(name) {
                *slot = Some(value);
            }
        }
        if let Some(url) = lookup("GITHUB_API_URL") {
            github.api_url = url;
        }
        if let Some(bind) = lookup("BIND_ADDRESS") {
            self.server.bind = bind;
        }
    }

    /// Names of secrets that are not set. The bot still starts, but the
    /// paths needing them fail.
    pub fn missing_secrets(&self) -> Vec<&'static str> {
        let github = &self.github;
        [
            ("APP_ID", github.app_id.is_none()),
            ("PRIVATE_KEY", github.private_key.is_none()),
            ("WEBHOOK_SECRET", github.webhook_secret.is_none()),
            ("CPS_TOKEN", github.cps_token.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect()
    }

    /// App identity, if both `APP_ID` and `PRIVATE_KEY` are set.
    ///
    /// Keys pasted into single-line secret stores often carry literal `\n`
    /// sequences; those are turned back into newlines.
    pub fn app_credentials(&self) -> Option<AppCredentials> {
        let app_id = self.github.app_id.clone()?;
        let key = self.github.private_key.as_deref()?;
        let private_key = if key.contains('\n') {
            key.to_string()
        } else {
            key.replace("\\n", "\n")
        };
        Some(AppCredentials {
            app_id,
            private_key,
        })
    }
}
