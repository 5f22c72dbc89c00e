//! Configuration management for Correspondent
//!
//! Loads the TOML configuration, applies `CORRESPONDENT_SECTION__KEY`
//! environment overrides and validates the result before anything is built
//! from it.

use crate::error::{CorrespondentError, Result};
use crate::retry::RetryConfig;
use crate::selection::SelectionPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub sources: SourcesConfig,
    pub cache: CacheConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub llm: LlmConfig,
    pub selection: SelectionConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Where the cache and index artifacts live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

/// Preprint source endpoints and fetch behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub arxiv_url: String,
    pub biorxiv_url: String,
    /// Boolean search string ANDed with the date window, empty for none
    #[serde(default)]
    pub arxiv_query: String,
    pub page_size: usize,
    pub request_delay_ms: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub retry: RetryConfig,
}

/// Secondary-source catalog cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub file: PathBuf,
    pub max_age_days: i64,
    pub window_days: i64,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub batch_size: usize,
}

/// Vector index artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub dimension: usize,
    pub index_file: PathBuf,
    pub metadata_file: PathBuf,
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub api_key_env: String,
    pub model: String,
    pub temperature: f32,
    /// Override the provider's API endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            model: "gemini-1.5-flash".to_string(),
            temperature: 0.2,
            base_url: None,
            retry: RetryConfig {
                max_attempts: 15,
                multiplier: 2.0,
                min_wait_secs: 4.0,
                max_wait_secs: 10.0,
            },
        }
    }
}

/// Candidate selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Default candidate source: "semantic" or "keyword"
    pub source: String,
    pub top_k: usize,
    pub max_selected: usize,
    pub max_concurrent_reads: usize,
    pub max_document_chars: usize,
    #[serde(default)]
    pub policy: SelectionPolicy,
    /// Document reader: "abstract" or "http"
    pub reader: String,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            source: "semantic".to_string(),
            top_k: 40,
            max_selected: 3,
            max_concurrent_reads: 4,
            max_document_chars: 6000,
            policy: SelectionPolicy::AllowEmpty,
            reader: "abstract".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CorrespondentError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CorrespondentError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load `path`, or fall back to defaults (plus env overrides) when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(CorrespondentError::ConfigNotFound { .. }) => {
                tracing::warn!(
                    "No configuration at {}, using defaults (run `correspondent config init`)",
                    path.display()
                );
                let mut config = Config::default();
                config.apply_env_overrides();
                ConfigValidator::validate(&config)?;
                Ok(config)
            }
            other => other,
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| CorrespondentError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: CORRESPONDENT_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("CORRESPONDENT_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            "SOURCES__ARXIV_URL" => self.sources.arxiv_url = value.to_string(),
            "SOURCES__BIORXIV_URL" => self.sources.biorxiv_url = value.to_string(),
            "SOURCES__ARXIV_QUERY" => self.sources.arxiv_query = value.to_string(),
            "SOURCES__PAGE_SIZE" => self.sources.page_size = parse_value(path, value)?,
            "SOURCES__REQUEST_DELAY_MS" => {
                self.sources.request_delay_ms = parse_value(path, value)?
            }
            "CACHE__MAX_AGE_DAYS" => self.cache.max_age_days = parse_value(path, value)?,
            "CACHE__WINDOW_DAYS" => self.cache.window_days = parse_value(path, value)?,
            "EMBEDDING__PROVIDER" => self.embedding.provider = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "LLM__PROVIDER" => self.llm.provider = value.to_string(),
            "LLM__MODEL" => self.llm.model = value.to_string(),
            "LLM__API_KEY_ENV" => self.llm.api_key_env = value.to_string(),
            "LLM__BASE_URL" => self.llm.base_url = Some(value.to_string()),
            "LLM__TEMPERATURE" => self.llm.temperature = parse_value(path, value)?,
            "SELECTION__SOURCE" => self.selection.source = value.to_string(),
            "SELECTION__TOP_K" => self.selection.top_k = parse_value(path, value)?,
            "SELECTION__MAX_SELECTED" => self.selection.max_selected = parse_value(path, value)?,
            "SELECTION__READER" => self.selection.reader = value.to_string(),
            "SELECTION__POLICY" => {
                self.selection.policy = match value {
                    "allow_empty" => SelectionPolicy::AllowEmpty,
                    "at_least_one" => SelectionPolicy::AtLeastOne,
                    _ => {
                        return Err(CorrespondentError::InvalidConfigValue {
                            path: path.to_string(),
                            message: format!("Unknown selection policy '{}'", value),
                        })
                    }
                }
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Data directory with `~/` expanded
    pub fn data_dir(&self) -> PathBuf {
        expand_path(&self.storage.data_dir)
    }

    /// Resolve a configured artifact path; relative paths live under the data directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        let expanded = expand_path(path);
        if expanded.is_absolute() {
            expanded
        } else {
            self.data_dir().join(expanded)
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            CorrespondentError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("correspondent").join("config.toml"))
    }
}

fn parse_value<T: FromStr>(path: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| CorrespondentError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}': {}", value, e),
        })
}

/// Expand a leading `~/` against the home directory
pub fn expand_path(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.correspondent"),
            },
            sources: SourcesConfig {
                arxiv_url: "https://export.arxiv.org/api/query".to_string(),
                biorxiv_url: "https://api.biorxiv.org/details/biorxiv".to_string(),
                arxiv_query: String::new(),
                page_size: 100,
                request_delay_ms: 3000,
                timeout_secs: 30,
                user_agent: format!("correspondent/{}", env!("CARGO_PKG_VERSION")),
                retry: RetryConfig {
                    max_attempts: 3,
                    multiplier: 0.0,
                    min_wait_secs: 5.0,
                    max_wait_secs: 5.0,
                },
            },
            cache: CacheConfig {
                file: PathBuf::from("biorxiv_cache.json"),
                max_age_days: 7,
                window_days: 7,
            },
            embedding: EmbeddingConfig {
                provider: "fastembed".to_string(),
                model: "all-MiniLM-L6-v2".to_string(),
                batch_size: 32,
            },
            index: IndexConfig {
                dimension: 384,
                index_file: PathBuf::from("vector_index.bin"),
                metadata_file: PathBuf::from("vector_metadata.json"),
            },
            llm: LlmConfig::default(),
            selection: SelectionConfig::default(),
        }
    }
}
