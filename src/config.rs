//! Configuration loader and validator for the room admin client.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::catalog::ResourceSpec;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub api: Api,
    pub upload: Upload,
    /// Per-entity descriptor overrides, keyed by resource name.
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceSpec>,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_chat_poll_interval_ms")]
    pub chat_poll_interval_ms: u64,
}

/// Backend REST API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Api {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Media upload collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Upload {
    pub image_host: ImageHost,
    pub cdn: Cdn,
}

/// Third-party image host (unsigned multipart upload).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageHost {
    pub endpoint: String,
    pub upload_preset: String,
}

/// Content-delivery upload service for binary assets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cdn {
    pub endpoint: String,
    pub public_base_url: String,
}

fn default_page_size() -> usize {
    10
}

fn default_chat_poll_interval_ms() -> u64 {
    2000
}

fn default_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// SQLite URL of the session store inside `data_dir`.
    pub fn session_db_url(&self) -> String {
        format!(
            "sqlite://{}/session.db?mode=rwc",
            self.app.data_dir.trim_end_matches('/')
        )
    }
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
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.page_size == 0 {
        return Err(ConfigError::Invalid("app.page_size must be > 0"));
    }
    if cfg.app.chat_poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.chat_poll_interval_ms must be > 0"));
    }

    if reqwest::Url::parse(cfg.api.base_url.trim()).is_err() {
        return Err(ConfigError::Invalid("api.base_url must be an absolute URL"));
    }
    if cfg.api.timeout_secs == 0 {
        return Err(ConfigError::Invalid("api.timeout_secs must be > 0"));
    }

    if reqwest::Url::parse(cfg.upload.image_host.endpoint.trim()).is_err() {
        return Err(ConfigError::Invalid(
            "upload.image_host.endpoint must be an absolute URL",
        ));
    }
    if cfg.upload.image_host.upload_preset.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "upload.image_host.upload_preset must be non-empty",
        ));
    }
    if reqwest::Url::parse(cfg.upload.cdn.endpoint.trim()).is_err() {
        return Err(ConfigError::Invalid("upload.cdn.endpoint must be an absolute URL"));
    }
    if cfg.upload.cdn.public_base_url.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "upload.cdn.public_base_url must be non-empty",
        ));
    }

    for spec in cfg.resources.values() {
        if spec.list_path.trim().is_empty() {
            return Err(ConfigError::Invalid("resources.*.list_path must be non-empty"));
        }
        if spec.id_field.trim().is_empty() {
            return Err(ConfigError::Invalid("resources.*.id_field must be non-empty"));
        }
    }

    Ok(())
}

/// Returns a complete example YAML document.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  page_size: 10
  chat_poll_interval_ms: 2000

api:
  base_url: "https://api.example.com/"
  timeout_secs: 30

upload:
  image_host:
    endpoint: "https://api.cloudinary.com/v1_1/demo/image/upload"
    upload_preset: "unsigned_preset"
  cdn:
    endpoint: "https://upload.example-cdn.com/api/upload"
    public_base_url: "https://cdn.example.com/files/"

resources:
  coin-prices:
    name: "coin-prices"
    list_path: "coin-price"
    id_field: "_id"
    required: ["coins", "price"]
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.page_size, 10);
        assert_eq!(cfg.resources["coin-prices"].list_path, "coin-price");
    }

    #[test]
    fn defaults_apply_when_omitted() {
        let raw = r#"app:
  data_dir: "./data"
api:
  base_url: "https://api.example.com/"
upload:
  image_host:
    endpoint: "https://img.example.com/upload"
    upload_preset: "p"
  cdn:
    endpoint: "https://cdn.example.com/upload"
    public_base_url: "https://cdn.example.com/f/"
"#;
        let cfg: Config = serde_yaml::from_str(raw).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.page_size, 10);
        assert_eq!(cfg.app.chat_poll_interval_ms, 2000);
        assert_eq!(cfg.api.timeout_secs, 30);
        assert!(cfg.resources.is_empty());
    }

    #[test]
    fn invalid_base_url() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.api.base_url = "not a url".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("api.base_url")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_numbers() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.page_size = 0;
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("page_size")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.chat_poll_interval_ms = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.api.timeout_secs = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_upload_settings() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.upload.image_host.upload_preset = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("upload_preset")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.upload.cdn.public_base_url = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
        assert!(cfg.session_db_url().ends_with("/data/session.db?mode=rwc"));
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.api.base_url, "https://api.example.com/");
    }
}
