//! Configuration management for FeedMind.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Environment variables
//! - Command-line flags
//! - Config files (.feedmind/config.yaml)
//!
//! The configuration is workspace-centric, with local state stored in `.feedmind/`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .feedmind/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Generation provider (currently "ollama")
    pub provider: String,

    /// Generation model identifier
    pub model: String,

    /// API key for the LLM provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// LLM provider configurations
    pub llm: Option<LlmConfig>,

    /// Retrieval service configuration
    pub retrieval: Option<RetrievalConfig>,

    /// Raw `agentic:` section; parsed by the orchestrator crate
    pub agentic: Option<serde_yaml::Value>,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the provider API
    pub endpoint: Option<String>,

    /// Generation model
    pub model: String,

    /// Environment variable holding the API key, if the provider needs one
    #[serde(rename = "apiKeyEnv")]
    pub api_key_env: Option<String>,

    /// Request timeout in seconds
    pub timeout: Option<u64>,
}

/// Retrieval service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Base URL exposing `/search` and `/expand`
    pub endpoint: String,

    /// Environment variable holding a bearer token
    #[serde(rename = "apiKeyEnv")]
    pub api_key_env: Option<String>,

    /// Request timeout in seconds
    pub timeout: Option<u64>,
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    retrieval: Option<RetrievalConfig>,
    agentic: Option<serde_yaml::Value>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            llm: None,
            retrieval: None,
            agentic: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// Environment variables:
    /// - `FEEDMIND_WORKSPACE`: Override workspace path
    /// - `FEEDMIND_CONFIG`: Path to config file
    /// - `FEEDMIND_PROVIDER`: LLM provider
    /// - `FEEDMIND_MODEL`: Model identifier
    /// - `FEEDMIND_API_KEY`: API key
    /// - `FEEDMIND_RETRIEVAL_ENDPOINT`: Retrieval service base URL
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("FEEDMIND_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("FEEDMIND_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.workspace.join(".feedmind/config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("FEEDMIND_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("FEEDMIND_MODEL") {
            config.model = model;
        }

        if let Ok(endpoint) = std::env::var("FEEDMIND_RETRIEVAL_ENDPOINT") {
            match config.retrieval {
                Some(ref mut retrieval) => retrieval.endpoint = endpoint,
                None => {
                    config.retrieval = Some(RetrievalConfig {
                        endpoint,
                        api_key_env: None,
                        timeout: None,
                    })
                }
            }
        }

        config.api_key = std::env::var("FEEDMIND_API_KEY").ok();
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        self.merge_yaml_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config file {:?}: {}", path, e)))
    }

    fn merge_yaml_str(&self, contents: &str) -> AppResult<Self> {
        let config_file: ConfigFile = serde_yaml::from_str(contents)?;

        let mut result = self.clone();

        if let Some(path) = config_file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();

            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                result.model = provider_config.model.clone();
            }

            result.llm = Some(llm);
        }

        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = Some(retrieval);
        }

        if let Some(agentic) = config_file.agentic {
            result.agentic = Some(agentic);
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables and YAML.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .feedmind directory.
    pub fn feedmind_dir(&self) -> PathBuf {
        self.workspace.join(".feedmind")
    }

    /// Get the active provider configuration.
    pub fn get_provider_config(&self, provider: &str) -> Option<&ProviderConfig> {
        self.llm.as_ref().and_then(|llm| llm.providers.get(provider))
    }

    /// Resolve the provider API key: explicit `FEEDMIND_API_KEY` first, then the
    /// provider's `apiKeyEnv`.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        self.get_provider_config(provider)
            .and_then(|pc| pc.api_key_env.as_ref())
            .and_then(|env_var| std::env::var(env_var).ok())
    }

    /// Resolve the bearer token for the retrieval service, if configured.
    pub fn resolve_retrieval_key(&self) -> Option<String> {
        self.retrieval
            .as_ref()
            .and_then(|r| r.api_key_env.as_ref())
            .and_then(|env_var| std::env::var(env_var).ok())
    }

    /// Validate configuration for the active provider.
    pub fn validate(&self) -> AppResult<()> {
        let known_providers = ["ollama"];

        if !known_providers.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                known_providers.join(", ")
            )));
        }

        if let Some(api_key_env) = self
            .get_provider_config(&self.provider)
            .and_then(|pc| pc.api_key_env.as_ref())
        {
            if self.api_key.is_none() && std::env::var(api_key_env).is_err() {
                return Err(AppError::Config(format!(
                    "API key not found in environment variable: {}",
                    api_key_env
                )));
            }
        }

        if let Some(ref retrieval) = self.retrieval {
            if !retrieval.endpoint.starts_with("http://")
                && !retrieval.endpoint.starts_with("https://")
            {
                return Err(AppError::Config(format!(
                    "Retrieval endpoint must be an http(s) URL: {}",
                    retrieval.endpoint
                )));
            }
        }

        Ok(())
    }
}
