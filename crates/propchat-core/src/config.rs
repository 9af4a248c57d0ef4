use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PropChatError, Result};

/// Top-level configuration for the PropChat server.
///
/// Loaded from `~/.propchat/config.toml` by default. Every section falls back
/// to its defaults, so a partial file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropChatConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl PropChatConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PropChatConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| PropChatError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.propchat/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Externally visible base URL, used to build the sign-up redirect.
    pub public_url: String,
    /// Extra CORS origins allowed besides `public_url`.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3040,
            public_url: "http://localhost:3040".to_string(),
            allowed_origins: Vec::new(),
        }
    }
}

/// Language model settings for intent parsing.
///
/// Any OpenAI-compatible `chat/completions` endpoint works; the defaults
/// target Groq.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API base URL (without the `/chat/completions` suffix).
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// API key. Takes precedence over `api_key_env`.
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset.
    pub api_key_env: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token cap.
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            api_key: None,
            api_key_env: "GROQ_API_KEY".to_string(),
            timeout_secs: 30,
            temperature: 0.1,
            max_tokens: 512,
        }
    }
}

impl LlmConfig {
    /// Resolve the API key from config, then from the configured env var.
    ///
    /// Empty values count as unset.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                std::env::var(&self.api_key_env)
                    .ok()
                    .filter(|k| !k.trim().is_empty())
            })
    }
}

/// Local identity provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Session lifetime in hours.
    pub session_ttl_hours: u32,
    /// Refuse password login until the email confirmation link was followed.
    pub require_email_confirmation: bool,
    /// Minimum password length accepted at sign-up.
    pub min_password_length: usize,
    /// PBKDF2-SHA256 iteration count for new password hashes.
    pub password_hash_iterations: u32,
    /// Name of the session cookie.
    pub cookie_name: String,
    /// Mark the session cookie `Secure`.
    pub secure_cookie: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 24 * 7,
            require_email_confirmation: true,
            min_password_length: 6,
            password_hash_iterations: 600_000,
            cookie_name: "propchat_session".to_string(),
            secure_cookie: false,
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
        let config = PropChatConfig::default();
        assert_eq!(config.general.data_dir, "~/.propchat/data");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.server.port, 3040);
        assert_eq!(config.llm.api_key_env, "GROQ_API_KEY");
        assert!(config.auth.require_email_confirmation);
        assert_eq!(config.auth.min_password_length, 6);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
data_dir = "/custom/data"
log_level = "debug"

[server]
host = "0.0.0.0"
port = 8080
public_url = "https://props.example.com"

[llm]
model = "llama-3.1-8b-instant"
timeout_secs = 10

[auth]
require_email_confirmation = false
cookie_name = "sid"
"#;
        let file = create_temp_config(content);
        let config = PropChatConfig::load(file.path()).unwrap();
        assert_eq!(config.general.data_dir, "/custom/data");
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.public_url, "https://props.example.com");
        assert_eq!(config.llm.model, "llama-3.1-8b-instant");
        assert_eq!(config.llm.timeout_secs, 10);
        assert!(!config.auth.require_email_confirmation);
        assert_eq!(config.auth.cookie_name, "sid");
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[general]
log_level = "warn"
"#;
        let file = create_temp_config(content);
        let config = PropChatConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.server.port, 3040);
        assert_eq!(config.llm.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(config.auth.session_ttl_hours, 168);
    }

    #[test]
    fn test_load_invalid_toml_is_config_error() {
        let file = create_temp_config("[server\nport = ");
        let err = PropChatConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, PropChatError::Config(_)));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = PropChatConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.data_dir, "~/.propchat/data");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = PropChatConfig::default();
        config.server.port = 9999;
        config.save(&path).unwrap();

        let reloaded = PropChatConfig::load(&path).unwrap();
        assert_eq!(reloaded.server.port, 9999);
        assert_eq!(reloaded.llm.model, config.llm.model);
    }

    #[test]
    fn test_resolve_api_key_prefers_config_value() {
        let llm = LlmConfig {
            api_key: Some("from-config".to_string()),
            api_key_env: "PROPCHAT_TEST_UNUSED_KEY_VAR".to_string(),
            ..LlmConfig::default()
        };
        assert_eq!(llm.resolve_api_key().as_deref(), Some("from-config"));
    }

    #[test]
    fn test_resolve_api_key_blank_is_none() {
        let llm = LlmConfig {
            api_key: Some("   ".to_string()),
            api_key_env: "PROPCHAT_TEST_DEFINITELY_UNSET_VAR".to_string(),
            ..LlmConfig::default()
        };
        assert!(llm.resolve_api_key().is_none());
    }
}
