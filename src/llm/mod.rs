//! Language model access
//!
//! - LlmProvider trait: one text-completion call, prompt in, text out
//! - Gemini and OpenAI-compatible backends over blocking HTTP
//! - LlmGateway: wraps a provider with the rate-limit retry policy
mod gateway;
mod gemini;
mod openai;

pub use gateway::LlmGateway;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

use crate::config::LlmConfig;
use reqwest::blocking::Response;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    /// Provider is throttling or out of quota; the only retryable kind
    #[error("Rate limited by {provider}: {message}")]
    RateLimited { provider: String, message: String },

    #[error("{provider} rejected the credentials: {message}")]
    Unauthorized { provider: String, message: String },

    #[error("{provider} rejected the request: {message}")]
    InvalidRequest { provider: String, message: String },

    #[error("Transport error talking to {provider}: {message}")]
    Transport { provider: String, message: String },

    #[error("{provider} failed with HTTP {status}: {message}")]
    Provider {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("{provider} returned no text")]
    EmptyResponse { provider: String },

    #[error("Environment variable {0} with the LLM API key is not set")]
    MissingApiKey(String),

    #[error("Unknown LLM provider: {0}")]
    UnknownProvider(String),
}

impl LlmError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    /// Map a non-success HTTP response onto the error taxonomy
    fn from_status(provider: &str, response: Response) -> Self {
        let status = response.status().as_u16();
        let body = response
            .text()
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        let message = body.chars().take(500).collect::<String>();
        let provider = provider.to_string();

        match status {
            429 => LlmError::RateLimited { provider, message },
            401 | 403 => LlmError::Unauthorized { provider, message },
            400 | 404 | 422 => LlmError::InvalidRequest { provider, message },
            _ => LlmError::Provider {
                provider,
                status,
                message,
            },
        }
    }

    fn transport(provider: &str, e: reqwest::Error) -> Self {
        LlmError::Transport {
            provider: provider.to_string(),
            message: e.to_string(),
        }
    }
}

/// A single text-completion capability
///
/// No structured output is assumed; callers impose structure through the
/// prompt and parse the text defensively.
pub trait LlmProvider: Send + Sync {
    fn complete(&self, prompt: &str, temperature: f32) -> Result<String, LlmError>;

    fn name(&self) -> &str;
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Build the provider named by `config.provider`
///
/// The API key is read from the environment variable `config.api_key_env`;
/// its absence is a setup error and is never retried.
pub fn create_llm_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let api_key = std::env::var(&config.api_key_env)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| LlmError::MissingApiKey(config.api_key_env.clone()))?;

    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiProvider::new(
            api_key,
            config.model.clone(),
            config.base_url.clone(),
            REQUEST_TIMEOUT,
        )?)),
        "openai" => Ok(Arc::new(OpenAiProvider::new(
            api_key,
            config.model.clone(),
            config.base_url.clone(),
            REQUEST_TIMEOUT,
        )?)),
        other => Err(LlmError::UnknownProvider(other.to_string())),
    }
}
