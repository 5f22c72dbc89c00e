use crate::config::Config;
use crate::error::{CorrespondentError, Result, ValidationError};
use crate::retry::RetryConfig;
use crate::sources::MAX_PAGE_SIZE;

const EMBEDDING_PROVIDERS: [&str; 1] = ["fastembed"];
const LLM_PROVIDERS: [&str; 2] = ["gemini", "openai"];
const CANDIDATE_SOURCES: [&str; 2] = ["semantic", "keyword"];
const DOCUMENT_READERS: [&str; 2] = ["abstract", "http"];

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every violation
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_sources(config, &mut errors);
        Self::validate_cache(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_llm(config, &mut errors);
        Self::validate_selection(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CorrespondentError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_sources(config: &Config, errors: &mut Vec<ValidationError>) {
        let page_size = config.sources.page_size;
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            errors.push(ValidationError::new(
                "sources.page_size",
                format!(
                    "Page size must be between 1 and {}, got {}",
                    MAX_PAGE_SIZE,
                    page_size
                ),
            ));
        }

        if config.sources.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "sources.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }

        for (path, url) in [
            ("sources.arxiv_url", &config.sources.arxiv_url),
            ("sources.biorxiv_url", &config.sources.biorxiv_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(ValidationError::new(
                    path,
                    format!("Expected an http(s) URL, got '{}'", url),
                ));
            }
        }

        Self::validate_retry("sources.retry", &config.sources.retry, errors);
    }

    fn validate_cache(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.cache.max_age_days <= 0 {
            errors.push(ValidationError::new(
                "cache.max_age_days",
                "Max age must be at least one day",
            ));
        }
        if config.cache.window_days <= 0 {
            errors.push(ValidationError::new(
                "cache.window_days",
                "Window must be at least one day",
            ));
        }
        if config.cache.file.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "cache.file",
                "Cache file path cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let provider = &config.embedding.provider;
        if !EMBEDDING_PROVIDERS.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "embedding.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    EMBEDDING_PROVIDERS, provider
                ),
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.index.dimension == 0 {
            errors.push(ValidationError::new(
                "index.dimension",
                "Vector dimension must be greater than 0",
            ));
        }

        if let Some(expected) =
            crate::embedding::FastEmbedProvider::model_dimension(&config.embedding.model)
        {
            if config.embedding.provider == "fastembed" && expected != config.index.dimension {
                errors.push(ValidationError::new(
                    "index.dimension",
                    format!(
                        "Model {} produces {}-dimensional vectors, index is configured for {}",
                        config.embedding.model, expected, config.index.dimension
                    ),
                ));
            }
        }

        if config.index.index_file == config.index.metadata_file {
            errors.push(ValidationError::new(
                "index.metadata_file",
                "Index and metadata files must differ",
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        // The API key itself is checked when the provider is built

        let temp = config.llm.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        let provider = &config.llm.provider;
        if !LLM_PROVIDERS.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "llm.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    LLM_PROVIDERS, provider
                ),
            ));
        }

        if config.llm.api_key_env.is_empty() {
            errors.push(ValidationError::new(
                "llm.api_key_env",
                "API key variable name cannot be empty",
            ));
        }

        Self::validate_retry("llm.retry", &config.llm.retry, errors);
    }

    fn validate_selection(config: &Config, errors: &mut Vec<ValidationError>) {
        let selection = &config.selection;

        if selection.top_k == 0 {
            errors.push(ValidationError::new(
                "selection.top_k",
                "top_k must be greater than 0",
            ));
        }

        if !(1..=3).contains(&selection.max_selected) {
            errors.push(ValidationError::new(
                "selection.max_selected",
                format!(
                    "max_selected must be between 1 and 3, got {}",
                    selection.max_selected
                ),
            ));
        }

        if selection.max_concurrent_reads == 0 {
            errors.push(ValidationError::new(
                "selection.max_concurrent_reads",
                "Concurrency must be greater than 0",
            ));
        }

        if selection.max_document_chars == 0 {
            errors.push(ValidationError::new(
                "selection.max_document_chars",
                "Document length limit must be greater than 0",
            ));
        }

        if !CANDIDATE_SOURCES.contains(&selection.source.as_str()) {
            errors.push(ValidationError::new(
                "selection.source",
                format!(
                    "Source must be one of {:?}, got '{}'",
                    CANDIDATE_SOURCES, selection.source
                ),
            ));
        }

        if !DOCUMENT_READERS.contains(&selection.reader.as_str()) {
            errors.push(ValidationError::new(
                "selection.reader",
                format!(
                    "Reader must be one of {:?}, got '{}'",
                    DOCUMENT_READERS, selection.reader
                ),
            ));
        }
    }

    fn validate_retry(path: &str, retry: &RetryConfig, errors: &mut Vec<ValidationError>) {
        if retry.max_attempts == 0 {
            errors.push(ValidationError::new(
                format!("{}.max_attempts", path),
                "At least one attempt is required",
            ));
        }
        let values = [retry.multiplier, retry.min_wait_secs, retry.max_wait_secs];
        if values.iter().any(|v| !v.is_finite()) {
            errors.push(ValidationError::new(
                path,
                "Multiplier and waits must be finite numbers",
            ));
            return;
        }
        if retry.multiplier < 0.0 || retry.min_wait_secs < 0.0 {
            errors.push(ValidationError::new(
                path,
                "Multiplier and waits cannot be negative",
            ));
        }
        if retry.min_wait_secs > retry.max_wait_secs {
            errors.push(ValidationError::new(
                format!("{}.min_wait_secs", path),
                format!(
                    "min_wait_secs ({}) exceeds max_wait_secs ({})",
                    retry.min_wait_secs, retry.max_wait_secs
                ),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors_for(config: &Config) -> Vec<String> {
        match ConfigValidator::validate(config) {
            Err(CorrespondentError::ConfigValidation { errors }) => {
                errors.into_iter().map(|e| e.path).collect()
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(()) => Vec::new(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_collects_every_violation() {
        let mut config = Config::default();
        config.sources.page_size = 500;
        config.selection.max_selected = 5;
        config.llm.temperature = 3.5;
        config.llm.provider = "carrier-pigeon".to_string();

        let paths = errors_for(&config);
        assert!(paths.contains(&"sources.page_size".to_string()));
        assert!(paths.contains(&"selection.max_selected".to_string()));
        assert!(paths.contains(&"llm.temperature".to_string()));
        assert!(paths.contains(&"llm.provider".to_string()));
    }

    #[test]
    fn test_infinite_retry_wait_is_rejected() {
        let mut config = Config::default();
        config.llm.retry.max_wait_secs = f64::INFINITY;
        config.sources.retry.multiplier = f64::NAN;

        let paths = errors_for(&config);
        assert!(paths.contains(&"llm.retry".to_string()));
        assert!(paths.contains(&"sources.retry".to_string()));
    }

    #[test]
    fn test_retry_bounds() {
        let mut config = Config::default();
        config.llm.retry.min_wait_secs = 20.0;
        config.llm.retry.max_attempts = 0;

        let paths = errors_for(&config);
        assert!(paths.contains(&"llm.retry.min_wait_secs".to_string()));
        assert!(paths.contains(&"llm.retry.max_attempts".to_string()));
    }

    #[test]
    fn test_dimension_must_match_model() {
        let mut config = Config::default();
        config.index.dimension = 768;
        assert_eq!(errors_for(&config), vec!["index.dimension".to_string()]);

        config.embedding.model = "bge-base-en-v1.5".to_string();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_unknown_reader() {
        let mut config = Config::default();
        config.selection.reader = "pdf".to_string();
        assert_eq!(errors_for(&config), vec!["selection.reader".to_string()]);
    }
}
