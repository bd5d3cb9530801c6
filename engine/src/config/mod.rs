//! Configuration management
//!
//! This module handles loading, validation, and management of the LLTM configuration.
//! Configuration is stored in TOML format at ~/.lltm/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory, default user id
//! - **llm**: Model provider selection and per-provider settings
//! - **memory**: Index location and search behaviour
//! - **session**: Per-turn limits for the orchestrator
//! - **protocol**: Section markers the model is instructed to use
//!
//! # Path Expansion
//!
//! `~` at the start of `core.data_dir` and `memory.index_dir` is expanded to
//! the user's home directory. The data directory is created if it doesn't
//! exist; the index directory is created by the store when it is opened.
//!
//! # Examples
//!
//! ```no_run
//! use lltm_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Index: {:?}", config.memory.index_dir);
//! println!("Default provider: {}", config.llm.default_provider);
//! # Ok(())
//! # }
//! ```

use crate::db::MatchMode;
use crate::protocol::ProtocolMarkers;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
///
/// This structure represents the complete LLTM configuration loaded from
/// ~/.lltm/config.toml. Every section falls back to its defaults when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Model provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Memory index configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Orchestrator limits
    #[serde(default)]
    pub session: SessionConfig,

    /// Response protocol markers
    #[serde(default)]
    pub protocol: ProtocolMarkers,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// User id for sessions and notes when none is given on the command line
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

/// Model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Default provider (ollama, openai)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// OpenAI-compatible provider settings
    #[serde(default)]
    pub openai: OpenAIConfig,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// Base URL for the API; any OpenAI-compatible endpoint works
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Name of the environment variable holding the API key
    // Note: the key itself is never written to the config file
    #[serde(default = "default_openai_api_key_env")]
    pub api_key_env: String,
}

/// Memory index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Index directory (supports ~ expansion)
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,

    /// Maximum number of ranked candidates per search
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// How query terms combine
    #[serde(default)]
    pub match_mode: MatchMode,
}

/// Orchestrator limits for a single user turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum model round-trips per turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Timeout for a single model call, in seconds
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.lltm")
}

fn default_user_id() -> String {
    "user".to_string()
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_openai_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("~/.lltm/ltm_data")
}

fn default_search_limit() -> usize {
    crate::db::documents::DEFAULT_SEARCH_LIMIT
}

fn default_max_iterations() -> usize {
    10
}

fn default_llm_timeout_secs() -> u64 {
    300
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            user_id: default_user_id(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            ollama: OllamaConfig::default(),
            openai: OpenAIConfig::default(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            api_key_env: default_openai_api_key_env(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            index_dir: default_index_dir(),
            search_limit: default_search_limit(),
            match_mode: MatchMode::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            llm_timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.lltm/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    /// Validates the configuration after loading and returns descriptive errors
    /// if validation fails.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails (unknown log level or provider, zero limits, bad markers)
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;
        Self::load_or_create_at(&config_path)
    }

    /// Load configuration from `path`, writing defaults there first if it is missing
    pub fn load_or_create_at(path: &Path) -> Result<Self, EngineError> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Self::create_default(path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    ///
    /// The file keeps the unexpanded `~` paths so it stays portable; the
    /// returned value has them expanded.
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.lltm/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".lltm").join("config.toml"))
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates log level and provider names
    /// - Rejects zero limits and unusable protocol markers
    /// - Expands ~ in paths
    /// - Creates the data directory if it doesn't exist
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["ollama", "openai"];
        if !valid_providers.contains(&self.llm.default_provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid default provider '{}'. Must be one of: {}",
                self.llm.default_provider,
                valid_providers.join(", ")
            )));
        }

        if self.core.user_id.trim().is_empty() {
            return Err(EngineError::Config("core.user_id must not be empty".to_string()));
        }

        if self.memory.search_limit == 0 {
            return Err(EngineError::Config(
                "memory.search_limit must be at least 1".to_string(),
            ));
        }

        if self.session.max_iterations == 0 {
            return Err(EngineError::Config(
                "session.max_iterations must be at least 1".to_string(),
            ));
        }

        if self.session.llm_timeout_secs == 0 {
            return Err(EngineError::Config(
                "session.llm_timeout_secs must be at least 1".to_string(),
            ));
        }

        self.protocol.validate().map_err(EngineError::Config)?;

        self.memory.index_dir = expand_path(&self.memory.index_dir)?;
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
///
/// # Examples
///
/// ```ignore
/// let path = PathBuf::from("~/.lltm");
/// let expanded = expand_path(&path)?;
/// // expanded is now /home/user/.lltm (on Unix)
/// ```
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

    fn toml_with_dirs(temp: &TempDir, extra: &str) -> String {
        format!(
            "[core]\ndata_dir = \"{}\"\n\n[memory]\nindex_dir = \"{}\"\n{}",
            temp.path().join("data").display(),
            temp.path().join("index").display(),
            extra
        )
    }

    #[test]
    fn test_default_config_creation() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.core.user_id, "user");
        assert_eq!(config.llm.default_provider, "ollama");
        assert_eq!(config.memory.search_limit, 5);
        assert_eq!(config.memory.match_mode, MatchMode::All);
        assert_eq!(config.session.max_iterations, 10);
        assert_eq!(config.session.llm_timeout_secs, 300);
        assert_eq!(config.protocol, ProtocolMarkers::default());
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
    fn test_expand_path_tilde_only() {
        let path = PathBuf::from("~");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(
            config.llm.default_provider,
            deserialized.llm.default_provider
        );
        assert_eq!(config.protocol, deserialized.protocol);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::from_toml_str(&toml_with_dirs(
            &temp,
            "search_limit = 3\nmatch_mode = \"any\"\n",
        ))
        .unwrap();

        assert_eq!(config.memory.search_limit, 3);
        assert_eq!(config.memory.match_mode, MatchMode::Any);
        assert_eq!(config.llm.ollama.base_url, "http://localhost:11434");
        assert!(temp.path().join("data").is_dir());
    }

    #[test]
    fn test_custom_markers_from_file() {
        let temp = TempDir::new().unwrap();
        let extra = "\n[protocol.query]\nstart = \"<whoosh>\"\nend = \"</whoosh>\"\n";
        let config = Config::from_toml_str(&toml_with_dirs(&temp, extra)).unwrap();

        assert_eq!(config.protocol.query.start, "<whoosh>");
        assert_eq!(config.protocol.reply.start, "<reply>");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp = TempDir::new().unwrap();

        let cases = [
            "\n[llm]\ndefault_provider = \"anthropic\"\n",
            "\n[session]\nmax_iterations = 0\n",
            "search_limit = 0\n",
            "\n[protocol.reply]\nstart = \"<summary>\"\nend = \"</reply>\"\n",
        ];

        for extra in cases {
            let result = Config::from_toml_str(&toml_with_dirs(&temp, extra));
            assert!(
                matches!(result, Err(EngineError::Config(_))),
                "expected config error for {:?}",
                extra
            );
        }
    }

    #[test]
    fn test_load_or_create_reads_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.core.data_dir = temp.path().join("data");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = Config::load_or_create_at(&path).unwrap();
        assert_eq!(loaded.core.data_dir, temp.path().join("data"));
    }
}
