//! Runtime configuration.
//!
//! Loaded from TOML with every section optional, then overridden from the
//! environment. Numeric bounds are checked with `validator`.

use crate::error::{MealLogError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MealLogConfig {
    pub oracle: OracleConfig,
    #[validate(nested)]
    pub orchestrator: OrchestratorConfig,
    pub storage: StorageConfig,
    pub confirmation: ConfirmationConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleProvider {
    #[serde(alias = "openrouter")]
    OpenAi,
    Anthropic,
    Stub,
}

impl std::str::FromStr for OracleProvider {
    type Err = MealLogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "openrouter" => Ok(OracleProvider::OpenAi),
            "anthropic" => Ok(OracleProvider::Anthropic),
            "stub" => Ok(OracleProvider::Stub),
            other => Err(MealLogError::Config(format!(
                "unknown oracle provider '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub provider: OracleProvider,
    pub model: String,
    /// Usually supplied through `MEALLOG_LLM_API_KEY` rather than the file.
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub timeout_seconds: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: OracleProvider::OpenAi,
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: None,
            max_tokens: Some(1024),
            temperature: Some(0.2),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Oracle round-trips allowed per user turn.
    #[validate(range(min = 1, max = 50))]
    pub max_steps: usize,
    /// Conversation turns given to the disambiguator.
    #[validate(range(min = 1, max = 50))]
    pub context_window: usize,
    #[validate(range(min = 1))]
    pub pending_ttl_secs: i64,
    /// Default page size for find_recent_entries.
    #[validate(range(min = 1, max = 20))]
    pub recent_entries_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            context_window: 5,
            pending_ttl_secs: 300,
            recent_entries_limit: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: PathBuf::from("meallog.sqlite"),
        }
    }
}

/// Extra words layered on the built-in confirmation vocabulary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub extra_affirmatives: Vec<String>,
    pub extra_negatives: Vec<String>,
}

impl MealLogConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: MealLogConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file, applies environment overrides and validates.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MealLogError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(provider) = std::env::var("MEALLOG_LLM_PROVIDER") {
            self.oracle.provider = provider.parse()?;
        }
        if let Ok(model) = std::env::var("MEALLOG_LLM_MODEL") {
            self.oracle.model = model;
        }
        if let Ok(key) = std::env::var("MEALLOG_LLM_API_KEY") {
            self.oracle.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("MEALLOG_LLM_BASE_URL") {
            self.oracle.base_url = Some(url);
        }
        if let Ok(path) = std::env::var("MEALLOG_DB_PATH") {
            self.storage.path = PathBuf::from(path);
        }
        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = MealLogConfig::from_toml_str("").unwrap();
        assert_eq!(config.orchestrator.max_steps, 10);
        assert_eq!(config.orchestrator.context_window, 5);
        assert_eq!(config.orchestrator.pending_ttl_secs, 300);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    }

    #[test]
    fn sections_override_defaults() {
        let config = MealLogConfig::from_toml_str(
            r#"
            [oracle]
            provider = "anthropic"
            model = "claude-3-5-haiku-latest"

            [orchestrator]
            max_steps = 4

            [storage]
            backend = "memory"

            [confirmation]
            extra_affirmatives = ["absolutely"]
            "#,
        )
        .unwrap();
        assert_eq!(config.oracle.provider, OracleProvider::Anthropic);
        assert_eq!(config.orchestrator.max_steps, 4);
        assert_eq!(config.orchestrator.context_window, 5);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.confirmation.extra_affirmatives, vec!["absolutely"]);
    }

    #[test]
    fn out_of_range_step_budget_is_rejected() {
        let err = MealLogConfig::from_toml_str("[orchestrator]\nmax_steps = 0\n").unwrap_err();
        assert!(matches!(err, MealLogError::Config(_)));
    }

    #[test]
    fn provider_names_parse() {
        assert_eq!("OpenRouter".parse::<OracleProvider>().unwrap(), OracleProvider::OpenAi);
        assert!("llama".parse::<OracleProvider>().is_err());
    }
}
