//! Run configuration for the agentic orchestrator.

use feedmind_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Per-run configuration. Immutable once a run has started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunConfig {
    /// Results requested from the first search of each sub-question
    pub top_k: usize,

    /// Minimum similarity for the first search (0.0 - 1.0)
    pub min_score: f32,

    /// Upper bound on sub-questions produced by the rewriter
    pub max_split_questions: usize,

    /// Tool calls a sub-question may issue before it is finalized
    pub max_tool_rounds_per_question: u32,

    /// Expansions a sub-question may attempt
    pub max_expand_calls_per_question: u32,

    /// Retry failed tool calls immediately (no backoff)
    pub retry_tool_on_failure: bool,

    /// Retries per tool call, on top of the first attempt
    pub max_tool_retry: u32,

    /// Neighbourhood radius (in chunk positions) for expansions
    pub expand_window: u32,

    /// Wall-clock bound per tool attempt, in seconds; 0 disables it
    pub tool_timeout_secs: u64,

    /// Generation model used for the final answer
    pub model: String,

    pub aggregation_temperature: f32,

    pub aggregation_max_tokens: u32,

    /// Prior conversation messages forwarded to the final answer prompt
    pub history_turns: usize,

    /// Sources listed in a recall summary
    pub recall_summary_limit: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            top_k: 6,
            min_score: 0.3,
            max_split_questions: 3,
            max_tool_rounds_per_question: 2,
            max_expand_calls_per_question: 1,
            retry_tool_on_failure: true,
            max_tool_retry: 2,
            expand_window: 1,
            tool_timeout_secs: 15,
            model: "llama3.2".to_string(),
            aggregation_temperature: 0.3,
            aggregation_max_tokens: 1024,
            history_turns: 6,
            recall_summary_limit: 5,
        }
    }
}

impl RunConfig {
    /// Reject configurations no run could execute sensibly.
    pub fn validate(&self) -> AppResult<()> {
        if self.top_k == 0 {
            return Err(AppError::InvalidInput("topK must be at least 1".to_string()));
        }

        if self.max_split_questions == 0 {
            return Err(AppError::InvalidInput(
                "maxSplitQuestions must be at least 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(AppError::InvalidInput(format!(
                "minScore must be within [0, 1], got {}",
                self.min_score
            )));
        }

        Ok(())
    }
}

/// Load the run configuration for a workspace.
///
/// Precedence: `.feedmind/agentic.yaml`, then the `agentic:` section of the
/// main config file (passed in as `inline`), then defaults. Missing keys fall
/// back to their defaults.
pub fn load_run_config(workspace: &Path, inline: Option<&serde_yaml::Value>) -> AppResult<RunConfig> {
    let config_path = get_config_path(workspace);

    let config = if config_path.exists() {
        let content = fs::read_to_string(&config_path).map_err(|e| {
            AppError::Config(format!("Failed to read config at {:?}: {}", config_path, e))
        })?;

        let config: RunConfig = serde_yaml::from_str(&content).map_err(|e| {
            AppError::Config(format!("Failed to parse config at {:?}: {}", config_path, e))
        })?;

        tracing::debug!("Loaded agentic config from {:?}", config_path);
        config
    } else if let Some(value) = inline {
        tracing::debug!("Using agentic section of the main config");
        serde_yaml::from_value(value.clone())
            .map_err(|e| AppError::Config(format!("Invalid agentic section: {}", e)))?
    } else {
        tracing::debug!("Using default agentic config (no config file found)");
        RunConfig::default()
    };

    config.validate()?;
    Ok(config)
}

/// Get the path to the agentic config file.
pub fn get_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".feedmind").join("agentic.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.retry_tool_on_failure);
        assert_eq!(config.max_tool_retry, 2);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_k = RunConfig {
            top_k: 0,
            ..RunConfig::default()
        };
        assert!(matches!(zero_k.validate(), Err(AppError::InvalidInput(_))));

        let bad_score = RunConfig {
            min_score: 1.5,
            ..RunConfig::default()
        };
        assert!(bad_score.validate().is_err());

        let nan_score = RunConfig {
            min_score: f32::NAN,
            ..RunConfig::default()
        };
        assert!(nan_score.validate().is_err());
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = get_config_path(temp.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "topK: 3\nretryToolOnFailure: false\n").unwrap();

        let config = load_run_config(temp.path(), None).unwrap();
        assert_eq!(config.top_k, 3);
        assert!(!config.retry_tool_on_failure);
        assert_eq!(config.max_split_questions, 3);
    }

    #[test]
    fn test_inline_section_used_without_file() {
        let temp = TempDir::new().unwrap();
        let inline: serde_yaml::Value = serde_yaml::from_str("maxSplitQuestions: 5").unwrap();

        let config = load_run_config(temp.path(), Some(&inline)).unwrap();
        assert_eq!(config.max_split_questions, 5);
    }

    #[test]
    fn test_missing_everything_gives_defaults() {
        let temp = TempDir::new().unwrap();
        assert_eq!(load_run_config(temp.path(), None).unwrap(), RunConfig::default());
    }
}
