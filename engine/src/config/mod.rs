//! Configuration management
//!
//! This module handles loading, validation, and management of the Mindwell configuration.
//! Configuration is stored in TOML format at ~/.mindwell/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory, HTTP bind address
//! - **llm**: Chat-completion gateway settings
//! - **speech**: Speech-to-text / text-to-speech provider settings
//! - **session**: Conversation window, fallback reply, greeting, accepted audio
//! - **auth**: Trusted auth proxy settings
//!
//! API keys are never stored here; see [`crate::secrets`].
//!
//! # Examples
//!
//! ```no_run
//! use mindwell_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Listening on {}", config.core.bind_addr);
//! println!("Chat model: {}", config.llm.model);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core service settings
    pub core: CoreConfig,

    /// LLM gateway configuration
    pub llm: LLMConfig,

    /// Speech provider configuration
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Conversation behaviour
    #[serde(default)]
    pub session: SessionConfig,

    /// Auth proxy settings
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Core service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Address the HTTP API listens on
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

/// LLM gateway configuration (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Base URL for the chat-completions API
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Sent as HTTP-Referer for gateway attribution
    #[serde(default)]
    pub app_url: Option<String>,

    /// Sent as X-Title for gateway attribution
    #[serde(default)]
    pub app_title: Option<String>,

    /// Per-request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    // Note: API key resolved through SecretManager, not in config
}

/// Speech provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Base URL for the speech API
    #[serde(default = "default_speech_base_url")]
    pub base_url: String,

    /// Transcription model
    #[serde(default = "default_stt_model")]
    pub stt_model: String,

    /// Synthesis voice model
    #[serde(default = "default_tts_model")]
    pub tts_model: String,

    /// Per-request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Conversation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Number of most recent turns placed in the prompt
    #[serde(default = "default_history_window")]
    pub history_window: i64,

    /// Reply used when the LLM returns no content
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,

    /// Opening line spoken when a session starts with an empty transcript
    #[serde(default = "default_greeting")]
    pub greeting: String,

    /// Accepted content types for recorded audio
    #[serde(default = "default_supported_audio_types")]
    pub supported_audio_types: Vec<String>,
}

/// Auth proxy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Require `Authorization: Bearer <auth_proxy_secret>` on identity-bearing requests
    #[serde(default)]
    pub require_proxy_secret: bool,

    /// Browser origins allowed by CORS; empty allows any origin
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Auth subjects allowed to replace the core methodology over HTTP;
    /// empty leaves it to `mindwell methodology set`
    #[serde(default)]
    pub methodology_admins: Vec<String>,
}

impl AuthConfig {
    pub fn is_methodology_admin(&self, subject: &str) -> bool {
        self.methodology_admins.iter().any(|admin| admin == subject)
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            base_url: default_speech_base_url(),
            stt_model: default_stt_model(),
            tts_model: default_tts_model(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            fallback_reply: default_fallback_reply(),
            greeting: default_greeting(),
            supported_audio_types: default_supported_audio_types(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            app_url: None,
            app_title: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.mindwell")
}

fn default_bind_addr() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_llm_model() -> String {
    "openai/gpt-4o".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_speech_base_url() -> String {
    "https://api.deepgram.com/v1".to_string()
}

fn default_stt_model() -> String {
    "nova-2".to_string()
}

fn default_tts_model() -> String {
    "aura-asteria-en".to_string()
}

fn default_history_window() -> i64 {
    50
}

fn default_fallback_reply() -> String {
    "I'm not sure what to say.".to_string()
}

fn default_greeting() -> String {
    "Welcome. To start, could you tell me a bit about what makes you feel you're labeled as 'gifted'?"
        .to_string()
}

fn default_supported_audio_types() -> Vec<String> {
    ["audio/webm", "audio/ogg", "audio/wav", "audio/mpeg", "audio/mp4"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Config {
    /// Load configuration from the default location (~/.mindwell/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, TOML parsing fails, or
    /// validation fails.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default_config();

        // Serialize before processing so the file keeps the portable ~ form
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.mindwell/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".mindwell").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
                data_dir: default_data_dir(),
                bind_addr: default_bind_addr(),
            },
            llm: LLMConfig::default(),
            speech: SpeechConfig::default(),
            session: SessionConfig::default(),
            auth: AuthConfig::default(),
        }
    }

    /// Path of the SQLite database inside the data directory
    pub fn db_path(&self) -> PathBuf {
        self.core.data_dir.join("mindwell.db")
    }

    /// Validate and process configuration
    ///
    /// Validates enumerated and numeric fields, expands ~ in the data
    /// directory and creates it if missing.
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.core.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(EngineError::Config(format!(
                "Invalid bind_addr '{}'",
                self.core.bind_addr
            )));
        }

        if self.session.history_window < 1 {
            return Err(EngineError::Config(
                "history_window must be at least 1".to_string(),
            ));
        }

        if self.session.supported_audio_types.is_empty() {
            return Err(EngineError::Config(
                "supported_audio_types must not be empty".to_string(),
            ));
        }

        if self.llm.model.trim().is_empty() || self.speech.tts_model.trim().is_empty() {
            return Err(EngineError::Config("Model names must not be empty".to_string()));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default_config();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.llm.model, "openai/gpt-4o");
        assert_eq!(config.speech.tts_model, "aura-asteria-en");
        assert_eq!(config.session.history_window, 50);
        assert!(!config.auth.require_proxy_secret);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default_config();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.bind_addr, deserialized.core.bind_addr);
        assert_eq!(
            config.session.supported_audio_types,
            deserialized.session.supported_audio_types
        );
    }

    #[test]
    fn test_minimal_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let data_dir = temp_dir.path().join("data");
        fs::write(
            &path,
            format!(
                "[core]\ndata_dir = {:?}\n\n[llm]\nmodel = \"test/model\"\n",
                data_dir.to_str().unwrap()
            ),
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.llm.model, "test/model");
        assert_eq!(config.session.fallback_reply, "I'm not sure what to say.");
        assert!(data_dir.is_dir());
    }

    #[test]
    fn test_invalid_history_window_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            format!(
                "[core]\ndata_dir = {:?}\n\n[llm]\n\n[session]\nhistory_window = 0\n",
                temp_dir.path().to_str().unwrap()
            ),
        )
        .unwrap();

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_auth_section() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            format!(
                "[core]\ndata_dir = {:?}\n\n[llm]\n\n[auth]\nrequire_proxy_secret = true\nallowed_origins = [\"https://app.example.com\"]\nmethodology_admins = [\"auth0|ops\"]\n",
                temp_dir.path().to_str().unwrap()
            ),
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert!(config.auth.require_proxy_secret);
        assert_eq!(config.auth.allowed_origins, vec!["https://app.example.com"]);
        assert!(config.auth.is_methodology_admin("auth0|ops"));
        assert!(!config.auth.is_methodology_admin("auth0|alice"));
    }
}
