use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for an orbit run, passed explicitly to every component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_model")]
    pub model: String,

    /// Vocabulary offered to the model
    #[serde(default = "orbit_core::category::default_categories")]
    pub categories: Vec<String>,

    #[serde(default)]
    pub planner: PlannerConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub paths: PathsConfig,
}

/// How ideas are grouped into batches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStrategy {
    /// Estimated prompt + completion tokens against `max_tokens`
    #[default]
    Token,
    /// Title characters against `max_chars`
    Text,
    /// Fixed `ideas_per_batch`
    Count,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub strategy: PlanStrategy,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    #[serde(default = "default_ideas_per_batch")]
    pub ideas_per_batch: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default)]
    pub sequential: bool,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Completion tokens at or above this mark a response as truncated
    #[serde(default = "default_truncation_threshold")]
    pub truncation_threshold: u64,

    /// Pause between requests in sequential mode
    #[serde(default = "default_request_pause_ms")]
    pub request_pause_ms: u64,

    #[serde(default = "default_rate_limit_cooldown_secs")]
    pub rate_limit_cooldown_secs: u64,

    /// Answer every request locally instead of calling the API
    #[serde(default)]
    pub test_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            categories: orbit_core::category::default_categories(),
            planner: PlannerConfig::default(),
            run: RunConfig::default(),
            api: ApiConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            strategy: PlanStrategy::default(),
            max_tokens: default_max_tokens(),
            max_chars: default_max_chars(),
            ideas_per_batch: default_ideas_per_batch(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            sequential: false,
            max_retries: default_max_retries(),
            truncation_threshold: default_truncation_threshold(),
            request_pause_ms: default_request_pause_ms(),
            rate_limit_cooldown_secs: default_rate_limit_cooldown_secs(),
            test_mode: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            temperature: 0.0,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_max_tokens() -> usize {
    125_000
}

fn default_max_chars() -> usize {
    4000
}

fn default_ideas_per_batch() -> usize {
    50
}

fn default_max_workers() -> usize {
    2
}

fn default_max_retries() -> u32 {
    3
}

fn default_truncation_threshold() -> u64 {
    4096
}

fn default_request_pause_ms() -> u64 {
    1000
}

fn default_rate_limit_cooldown_secs() -> u64 {
    10
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Config {
    /// Load config from default location or create default if not found
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(None)
    }

    /// Load from `path` when given, else from the default location.
    ///
    /// Only the default location is created on first use; an explicit path
    /// that does not exist is an error.
    pub fn load_from(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => Self::read(path)?,
            None => {
                let path = Self::config_path();
                if path.exists() {
                    Self::read(&path)?
                } else {
                    let config = Config::default();
                    config.save(&path)?;
                    config
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Get config file path
    pub fn config_path() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("com", "orbit", "orbit") {
            dirs.config_dir().join("config.toml")
        } else {
            PathBuf::from("~/.orbit/config.toml")
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.run.max_workers == 0 {
            bail!("run.max_workers must be at least 1");
        }
        if self.planner.max_tokens == 0 {
            bail!("planner.max_tokens must be greater than 0");
        }
        if self.planner.max_chars == 0 {
            bail!("planner.max_chars must be greater than 0");
        }
        if self.planner.ideas_per_batch == 0 {
            bail!("planner.ideas_per_batch must be greater than 0");
        }
        if self.model.trim().is_empty() {
            bail!("model must not be empty");
        }
        Ok(())
    }

    /// Value of the configured API key variable, if set and non-empty
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model, "gpt-3.5-turbo");
        assert_eq!(config.planner.max_tokens, 125_000);
        assert_eq!(config.planner.strategy, PlanStrategy::Token);
        assert_eq!(config.run.max_workers, 2);
        assert_eq!(config.run.truncation_threshold, 4096);
        assert!(config.categories.contains(&"Venture Capital".to_string()));
        config.validate().unwrap();
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.planner.max_chars, config.planner.max_chars);
        assert_eq!(parsed.categories, config.categories);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            model = "gpt-4o"

            [planner]
            strategy = "text"
            max_chars = 500
            "#,
        )
        .unwrap();

        assert_eq!(parsed.model, "gpt-4o");
        assert_eq!(parsed.planner.strategy, PlanStrategy::Text);
        assert_eq!(parsed.planner.max_chars, 500);
        assert_eq!(parsed.planner.ideas_per_batch, 50);
        assert_eq!(parsed.api.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = Config::default();
        config.run.max_workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.planner.max_tokens = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orbit.toml");
        std::fs::write(&path, "[run]\nmax_workers = 4\n").unwrap();

        let config = Config::load_from(Some(&path)).unwrap();
        assert_eq!(config.run.max_workers, 4);

        let missing = dir.path().join("missing.toml");
        assert!(Config::load_from(Some(&missing)).is_err());
    }

    #[test]
    fn test_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut config = Config::default();
        config.run.sequential = true;

        config.save(&path).unwrap();
        let loaded = Config::load_from(Some(&path)).unwrap();
        assert!(loaded.run.sequential);
    }
}
