use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ColloquyError, Result};
use crate::types::{DEFAULT_QUERY_LIMIT, DEFAULT_TITLE, MAX_QUERY_LIMIT, MIN_QUERY_LIMIT};

/// Top-level configuration for the Colloquy client.
///
/// Loaded from `~/.colloquy/config.toml` by default. Every section falls back
/// to its defaults when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColloquyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

impl ColloquyConfig {
    /// Read a TOML file. A parse error names the file it came from.
    ///
    /// Runs before tracing is initialized, so it does not log; the caller
    /// reports the outcome.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| ColloquyError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Write the configuration as TOML, creating missing parent directories
    /// (the default location is `~/.colloquy/`).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Check values that would otherwise fail later at request time.
    pub fn validate(&self) -> Result<()> {
        let base_url = self.transport.base_url.trim();
        if base_url.is_empty() {
            return Err(ColloquyError::Config(
                "transport.base_url must not be empty".to_string(),
            ));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ColloquyError::Config(format!(
                "transport.base_url must be an http(s) URL, got {}",
                base_url
            )));
        }
        if self.transport.timeout_secs == 0 {
            return Err(ColloquyError::Config(
                "transport.timeout_secs must be positive".to_string(),
            ));
        }
        if !(MIN_QUERY_LIMIT..=MAX_QUERY_LIMIT).contains(&self.query.default_limit) {
            return Err(ColloquyError::Config(format!(
                "query.default_limit must be between {} and {}",
                MIN_QUERY_LIMIT, MAX_QUERY_LIMIT
            )));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Connection settings for the conversation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Base URL of the REST API, including the `/api` prefix.
    pub base_url: String,
    /// Whole-request timeout in seconds. AI replies can be slow.
    pub timeout_secs: u64,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

/// Session controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Title requested when a conversation is started without one.
    pub default_title: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_title: DEFAULT_TITLE.to_string(),
        }
    }
}

/// Intelligence query settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Number of relevant conversations requested when the caller sets no limit.
    pub default_limit: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = ColloquyConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.transport.base_url, "http://localhost:8000/api");
        assert_eq!(config.transport.timeout_secs, 30);
        assert_eq!(config.transport.connect_timeout_secs, 10);
        assert_eq!(config.chat.default_title, "New Conversation");
        assert_eq!(config.query.default_limit, DEFAULT_QUERY_LIMIT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
log_level = "debug"

[transport]
base_url = "https://chat.example.com/api"
timeout_secs = 90

[query]
default_limit = 10
"#;
        let file = create_temp_config(content);
        let config = ColloquyConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.transport.base_url, "https://chat.example.com/api");
        assert_eq!(config.transport.timeout(), Duration::from_secs(90));
        // Unset field in a present section keeps its default.
        assert_eq!(config.transport.connect_timeout_secs, 10);
        assert_eq!(config.query.default_limit, 10);
        assert_eq!(config.chat.default_title, "New Conversation");
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = ColloquyConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.query.default_limit, 5);
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is {{ not valid TOML");
        match ColloquyConfig::load(file.path()) {
            Err(ColloquyError::Config(message)) => {
                assert!(message.contains(&file.path().display().to_string()));
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = ColloquyConfig::load(Path::new("/does/not/exist/config.toml"));
        assert!(matches!(result, Err(ColloquyError::Io(_))));
    }

    #[test]
    fn test_save_creates_parent_dirs_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");

        let mut config = ColloquyConfig::default();
        config.chat.default_title = "Scratchpad".to_string();
        config.save(&path).unwrap();

        assert!(path.exists());
        let reloaded = ColloquyConfig::load(&path).unwrap();
        assert_eq!(reloaded.chat.default_title, "Scratchpad");
        assert_eq!(reloaded.transport.timeout_secs, 30);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ColloquyConfig::default();
        config.transport.base_url = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = ColloquyConfig::default();
        config.transport.base_url = "ftp://files.example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = ColloquyConfig::default();
        config.transport.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = ColloquyConfig::default();
        config.query.default_limit = 21;
        assert!(config.validate().is_err());

        config.query.default_limit = 0;
        assert!(config.validate().is_err());
    }
}
