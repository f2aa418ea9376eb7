//! Configuration loaded from `~/.parley/config.toml`
//!
//! Every field has a default, so a partial file (or no file at all) is
//! valid. A file that exists but does not parse is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{ai, runtime, timeouts};
use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub reasoning: ReasoningConfig,

    #[serde(default)]
    pub pull_request: PullRequestInfo,
}

impl ParleyConfig {
    /// Load from the default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&crate::paths::config_file())
    }

    /// Load from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Turn-level limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub command_timeout_secs: u64,
    pub reasoning_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: timeouts::COMMAND.as_secs(),
            reasoning_timeout_secs: timeouts::REASONING.as_secs(),
        }
    }
}

impl OrchestratorConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn reasoning_timeout(&self) -> Duration {
        Duration::from_secs(self.reasoning_timeout_secs)
    }
}

/// Local command runtime settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Directory commands run in; the process cwd when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    pub allowed_commands: Vec<String>,
    pub max_output_bytes: usize,
    /// Children still running after this long are killed
    pub command_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            working_dir: None,
            allowed_commands: runtime::DEFAULT_ALLOWED_COMMANDS
                .iter()
                .map(|c| c.to_string())
                .collect(),
            max_output_bytes: runtime::MAX_OUTPUT_BYTES,
            command_timeout_secs: timeouts::COMMAND.as_secs(),
        }
    }
}

impl RuntimeConfig {
    pub fn is_allowed(&self, command: &str) -> bool {
        self.allowed_commands.iter().any(|c| c == command)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Grounded reasoning client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    pub enabled: bool,
    pub model: String,
    pub max_tokens: usize,
    pub base_url: String,
    /// Environment variable the API key is read from
    pub api_key_env: String,
    pub max_retries: u32,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: ai::DEFAULT_MODEL.to_string(),
            max_tokens: ai::MAX_OUTPUT_TOKENS,
            base_url: ai::DEFAULT_API_URL.to_string(),
            api_key_env: ai::API_KEY_ENV.to_string(),
            max_retries: 3,
        }
    }
}

/// Pull request metadata passed along as grounding
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullRequestInfo {
    pub title: String,
    pub description: String,
    pub requirements: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ParleyConfig::default();
        assert_eq!(config.orchestrator.command_timeout(), Duration::from_secs(30));
        assert_eq!(config.orchestrator.reasoning_timeout(), Duration::from_secs(60));
        assert!(config.runtime.is_allowed("npm"));
        assert!(!config.runtime.is_allowed("rm"));
        assert_eq!(config.runtime.command_timeout(), Duration::from_secs(30));
        assert_eq!(config.reasoning.api_key_env, "ANTHROPIC_API_KEY");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ParleyConfig::parse(
            r#"
[orchestrator]
command_timeout_secs = 5

[pull_request]
title = "Add auth"
requirements = ["Tokens expire", "Refresh on 401"]
"#,
        )
        .unwrap();

        assert_eq!(config.orchestrator.command_timeout_secs, 5);
        assert_eq!(config.orchestrator.reasoning_timeout_secs, 60);
        assert_eq!(config.pull_request.title, "Add auth");
        assert_eq!(config.pull_request.description, "");
        assert_eq!(config.pull_request.requirements.len(), 2);
        assert_eq!(config.runtime, RuntimeConfig::default());
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = ParleyConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, ParleyConfig::default());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[orchestrator\ncommand_timeout_secs = ").unwrap();

        let err = ParleyConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_toml_output_parses_back() {
        let mut config = ParleyConfig::default();
        config.runtime.working_dir = Some(PathBuf::from("/tmp/ws"));
        config.reasoning.enabled = false;

        let text = config.to_toml_string().unwrap();
        assert!(text.contains("[reasoning]"));
        assert_eq!(ParleyConfig::parse(&text).unwrap(), config);
    }
}
