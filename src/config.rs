use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{Error, Result};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_DATABASE: &str = "bookmarks.db";
const DEFAULT_EMBEDDING_MODEL: &str = "bge-small-en-v1.5";
const DEFAULT_USER_AGENT: &str = "BookmarkChat/1.0";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file, relative to the base path unless absolute
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

/// Candidate pool sizes, noise floors and fusion weights for hybrid search
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_candidates")]
    pub semantic_candidates: usize,
    #[serde(default = "default_candidates")]
    pub lexical_candidates: usize,
    #[serde(default = "default_semantic_threshold")]
    pub semantic_threshold: f64,
    #[serde(default = "default_lexical_threshold")]
    pub lexical_threshold: f64,
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            semantic_candidates: default_candidates(),
            lexical_candidates: default_candidates(),
            semantic_threshold: default_semantic_threshold(),
            lexical_threshold: default_lexical_threshold(),
            semantic_weight: default_semantic_weight(),
            lexical_weight: default_lexical_weight(),
            max_results: default_max_results(),
        }
    }
}

fn default_candidates() -> usize {
    50
}

fn default_semantic_threshold() -> f64 {
    0.3
}

fn default_lexical_threshold() -> f64 {
    0.15
}

fn default_semantic_weight() -> f64 {
    0.4
}

fn default_lexical_weight() -> f64 {
    0.6
}

fn default_max_results() -> usize {
    20
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Estimated-token budget per chunk, kept below the provider's hard cap
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            chars_per_token: default_chars_per_token(),
        }
    }
}

fn default_max_tokens() -> usize {
    6000
}

fn default_chars_per_token() -> usize {
    4
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScrapeConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Requests per second across the whole scraper
    #[serde(default = "default_rate_limit_rps")]
    pub rate_limit_rps: f64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_follow_redirects")]
    pub follow_redirects: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            rate_limit_rps: default_rate_limit_rps(),
            user_agent: default_user_agent(),
            follow_redirects: default_follow_redirects(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_rate_limit_rps() -> f64 {
    2.0
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_follow_redirects() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Model name for embeddings (e.g., "bge-small-en-v1.5")
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    /// Largest number of chunks sent to the provider in one call
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            model: default_embedding_model(),
            download_timeout_secs: default_download_timeout_secs(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_download_timeout_secs() -> u64 {
    300
}

fn default_max_batch_size() -> usize {
    256
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

/// `MARKSEARCH_BASE_PATH`, or `~/.local/share/marksearch`.
pub fn default_base_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("MARKSEARCH_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = homedir::my_home()
        .context("could not determine home directory")?
        .context("home directory path is empty")?;
    Ok(home.join(".local/share/marksearch"))
}

fn check_unit_range(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::Validation(format!(
            "{name} must be between 0.0 and 1.0, got {value}"
        )));
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.store.retry_attempts == 0 {
            return Err(Error::Validation(
                "store.retry_attempts must be greater than 0".to_string(),
            ));
        }

        let search = &self.search;
        check_unit_range("search.semantic_threshold", search.semantic_threshold)?;
        check_unit_range("search.lexical_threshold", search.lexical_threshold)?;
        if search.semantic_weight < 0.0 || search.lexical_weight < 0.0 {
            return Err(Error::Validation(
                "search weights must not be negative".to_string(),
            ));
        }
        if search.max_results == 0 {
            return Err(Error::Validation(
                "search.max_results must be greater than 0".to_string(),
            ));
        }

        if self.chunking.max_tokens == 0 || self.chunking.chars_per_token == 0 {
            return Err(Error::Validation(
                "chunking.max_tokens and chunking.chars_per_token must be greater than 0"
                    .to_string(),
            ));
        }

        let rps = self.scrape.rate_limit_rps;
        if rps.is_nan() || rps <= 0.0 {
            return Err(Error::Validation(format!(
                "scrape.rate_limit_rps must be positive, got {}",
                self.scrape.rate_limit_rps
            )));
        }
        if self.scrape.timeout_secs == 0 {
            return Err(Error::Validation(
                "scrape.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.embeddings.max_batch_size == 0 {
            return Err(Error::Validation(
                "embeddings.max_batch_size must be greater than 0".to_string(),
            ));
        }
        if self.embeddings.download_timeout_secs == 0 {
            return Err(Error::Validation(
                "embeddings.download_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Reads `config.yaml` under `base_path`, writing the defaults first if
    /// the file does not exist. Missing fields are filled in and saved back.
    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(base_path)
            .with_context(|| format!("failed to create {}", base_path.display()))?;
        let config_path = base_path.join(CONFIG_FILE);

        if !config_path.exists() {
            std::fs::write(&config_path, serde_yml::to_string(&Self::default())?)
                .with_context(|| format!("failed to write {}", config_path.display()))?;
        }

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;
        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::load_with(&default_base_path()?)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_str = serde_yml::to_string(&self)?;
        std::fs::write(self.base_path.join(CONFIG_FILE), config_str)
            .context("failed to save config")?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn database_path(&self) -> PathBuf {
        self.base_path.join(&self.store.database)
    }

    pub fn models_dir(&self) -> PathBuf {
        self.base_path.join("models")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.search.semantic_candidates, 50);
        assert_eq!(config.search.semantic_threshold, 0.3);
        assert_eq!(config.search.lexical_threshold, 0.15);
        assert_eq!(config.search.max_results, 20);
        assert_eq!(config.chunking.max_tokens, 6000);
        assert_eq!(config.scrape.timeout_secs, 30);
        assert_eq!(config.scrape.max_retries, 3);
        assert_eq!(config.store.retry_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_paths_live_under_base_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_with(dir.path()).unwrap();
        assert_eq!(config.database_path(), dir.path().join("bookmarks.db"));
        assert_eq!(config.models_dir(), dir.path().join("models"));
    }

    #[test]
    fn test_load_creates_and_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "search:\n  max_results: 5\n",
        )
        .unwrap();

        let config = Config::load_with(dir.path()).unwrap();
        assert_eq!(config.search.max_results, 5);
        assert_eq!(config.search.lexical_candidates, 50);
        assert_eq!(config.database_path(), dir.path().join("bookmarks.db"));

        let saved = std::fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap();
        assert!(saved.contains("semantic_threshold"));
    }

    #[test]
    fn test_load_writes_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("nested");

        Config::load_with(&base).unwrap();
        assert!(base.join(CONFIG_FILE).exists());
    }

    #[test]
    fn test_invalid_threshold_is_an_error() {
        let mut config = Config::default();
        config.search.semantic_threshold = 1.5;
        assert!(matches!(config.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_non_positive_rate_limit_is_an_error() {
        let mut config = Config::default();
        config.scrape.rate_limit_rps = 0.0;
        assert!(config.validate().is_err());

        config.scrape.rate_limit_rps = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "search: [1, 2").unwrap();
        assert!(Config::load_with(dir.path()).is_err());
    }
}
