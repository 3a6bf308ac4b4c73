//! Configuration loader and validator for the Discourse digest job.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub db: Db,
    pub discourse: Discourse,
    pub mail: Mail,
}

/// Storage settings. `DATABASE_URL` in the environment overrides `url`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Db {
    pub url: String,
}

/// Discourse API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Discourse {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

/// Outbound SMTP settings. Leave `smtp_username` empty for an
/// unauthenticated relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mail {
    pub from: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.db.url.trim().is_empty() {
        return Err(ConfigError::Invalid("db.url must be non-empty"));
    }

    if cfg.discourse.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("discourse.base_url must be non-empty"));
    }
    if cfg.discourse.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("discourse.api_key must be non-empty"));
    }
    if cfg.discourse.timeout_secs == 0 {
        return Err(ConfigError::Invalid("discourse.timeout_secs must be > 0"));
    }

    if cfg.mail.from.trim().is_empty() {
        return Err(ConfigError::Invalid("mail.from must be non-empty"));
    }
    if cfg.mail.smtp_host.trim().is_empty() {
        return Err(ConfigError::Invalid("mail.smtp_host must be non-empty"));
    }
    if cfg.mail.smtp_port == 0 {
        return Err(ConfigError::Invalid("mail.smtp_port must be > 0"));
    }
    // smtp_username/smtp_password may be empty for open relays.

    Ok(())
}

/// Returns a complete example YAML document.
pub fn example() -> &'static str {
    r#"db:
  url: "sqlite://./data/discourse-notifier.db"

discourse:
  base_url: "https://forum.example.com"
  api_key: "YOUR_DISCOURSE_API_KEY"
  timeout_secs: 30

mail:
  from: "Discourse Notifier <notifier@example.com>"
  smtp_host: "smtp.example.com"
  smtp_port: 587
  smtp_username: "notifier@example.com"
  smtp_password: "YOUR_SMTP_PASSWORD"
"#
}
