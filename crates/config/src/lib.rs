//! Configuration loading and validation for OpenCrank.
//!
//! Loads `~/.opencrank/config.toml` with serde defaults for every
//! field, so a missing or partial file always yields a usable
//! configuration. Environment variables override the database path.

use opencrank_core::error::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// The root configuration structure.
///
/// Maps directly to `~/.opencrank/config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model defaults
    #[serde(default)]
    pub model: ModelConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentSection,

    /// Context manager settings
    #[serde(default)]
    pub context: ContextSection,

    /// Memory store settings
    #[serde(default)]
    pub memory: MemorySection,

    /// Sandbox settings
    #[serde(default)]
    pub sandbox: SandboxSection,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("agent", &self.agent)
            .field("context", &self.context)
            .field("memory", &self.memory)
            .field("sandbox", &self.sandbox)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,

    #[serde(default = "default_max_tool_result_size")]
    pub max_tool_result_size: usize,

    #[serde(default = "default_true")]
    pub auto_chunk_large_results: bool,

    /// Chunk size for large content (0 = derive from context size)
    #[serde(default)]
    pub chunk_size: usize,

    /// Model context size in tokens (0 = unknown)
    #[serde(default)]
    pub context_size: usize,

    #[serde(default = "default_shell_timeout")]
    pub shell_timeout_secs: u64,
}

fn default_max_iterations() -> u32 {
    30
}
fn default_max_consecutive_errors() -> u32 {
    5
}
fn default_max_tool_result_size() -> usize {
    15_000
}
fn default_shell_timeout() -> u64 {
    20
}
fn default_true() -> bool {
    true
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_consecutive_errors: default_max_consecutive_errors(),
            max_tool_result_size: default_max_tool_result_size(),
            auto_chunk_large_results: true,
            chunk_size: 0,
            context_size: 0,
            shell_timeout_secs: default_shell_timeout(),
        }
    }
}

impl AgentSection {
    /// Convert into the agent crate's runtime configuration.
    pub fn to_agent_config(&self) -> opencrank_core::agent::AgentConfig {
        opencrank_core::agent::AgentConfig {
            max_iterations: self.max_iterations,
            max_consecutive_errors: self.max_consecutive_errors,
            max_tool_result_size: self.max_tool_result_size,
            auto_chunk_large_results: self.auto_chunk_large_results,
            chunk_size: self.chunk_size,
            context_size: self.context_size,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSection {
    #[serde(default = "default_usage_threshold")]
    pub usage_threshold: f64,

    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    #[serde(default = "default_reserve_for_response")]
    pub reserve_for_response: usize,

    #[serde(default = "default_max_resume_chars")]
    pub max_resume_chars: usize,

    #[serde(default = "default_true")]
    pub auto_save_memory: bool,
}

fn default_usage_threshold() -> f64 {
    0.75
}
fn default_max_context_chars() -> usize {
    16_000
}
fn default_reserve_for_response() -> usize {
    4_000
}
fn default_max_resume_chars() -> usize {
    3_000
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            usage_threshold: default_usage_threshold(),
            max_context_chars: default_max_context_chars(),
            reserve_for_response: default_reserve_for_response(),
            max_resume_chars: default_max_resume_chars(),
            auto_save_memory: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemorySection {
    /// Override for the database location; the sandbox default is
    /// `~/.opencrank/db/memory.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Extra directories granted read+write before activation
    #[serde(default)]
    pub allowed_paths: Vec<String>,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_paths: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
                message: format!("Cannot read {}: {e}", path.display()),
            })?;
            let config: AppConfig = toml::from_str(&raw).map_err(|e| Error::Config {
                message: format!("Invalid TOML in {}: {e}", path.display()),
            })?;
            info!(path = %path.display(), "Configuration loaded");
            config
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            AppConfig::default()
        };

        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(db_path) = std::env::var("OPENCRANK_DB_PATH")
            && !db_path.is_empty()
        {
            self.memory.db_path = Some(db_path);
        }
        if let Ok(key) = std::env::var("OPENCRANK_API_KEY")
            && !key.is_empty()
        {
            self.api_key = Some(key);
        }
        self
    }

    /// Reject configurations the runtime cannot operate with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.agent.max_iterations == 0 {
            return Err(Error::Config {
                message: "agent.max_iterations must be at least 1".into(),
            });
        }
        if self.agent.max_consecutive_errors == 0 {
            return Err(Error::Config {
                message: "agent.max_consecutive_errors must be at least 1".into(),
            });
        }
        if !(self.context.usage_threshold > 0.0 && self.context.usage_threshold <= 1.0) {
            return Err(Error::Config {
                message: "context.usage_threshold must be in (0, 1]".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.max_iterations, 30);
        assert_eq!(config.context.max_context_chars, 16_000);
        assert!((config.context.usage_threshold - 0.75).abs() < f64::EPSILON);
        assert!(config.sandbox.enabled);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.agent.max_iterations, 30);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[agent]
max_iterations = 10

[context]
usage_threshold = 0.5
"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.agent.max_iterations, 10);
        assert!((config.context.usage_threshold - 0.5).abs() < f64::EPSILON);
        // Untouched sections keep their defaults
        assert_eq!(config.agent.max_consecutive_errors, 5);
        assert_eq!(config.model.max_tokens, 4096);
    }

    #[test]
    fn invalid_toml_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not [ valid toml").unwrap();
        assert!(AppConfig::load(&path).is_err());
    }

    #[test]
    fn zero_iterations_rejected() {
        let config = AppConfig {
            agent: AgentSection {
                max_iterations: 0,
                ..AgentSection::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn threshold_bounds_enforced() {
        for bad in [0.0, -0.5, 1.5] {
            let config = AppConfig {
                context: ContextSection {
                    usage_threshold: bad,
                    ..ContextSection::default()
                },
                ..AppConfig::default()
            };
            assert!(config.validate().is_err(), "threshold {bad} should fail");
        }
    }

    #[test]
    fn agent_section_converts() {
        let section = AgentSection {
            max_iterations: 7,
            chunk_size: 500,
            ..AgentSection::default()
        };
        let agent_config = section.to_agent_config();
        assert_eq!(agent_config.max_iterations, 7);
        assert_eq!(agent_config.effective_chunk_size(), 500);
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("REDACTED"));
    }
}
