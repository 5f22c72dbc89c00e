//! Preprint sources
//!
//! Thin blocking HTTP adapters that turn a source's API into [`PaperRecord`]s
//! for a date window. Transient transport failures are retried with the
//! configured [`RetryPolicy`]; anything else surfaces immediately.

mod arxiv;
mod biorxiv;

pub use arxiv::{parse_feed, ArxivSource, MAX_PAGE_SIZE};
pub use biorxiv::{BiorxivPage, BiorxivSource};

use crate::paper::PaperRecord;
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    /// Connection reset, timeout and similar network failures
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{url} returned HTTP {status}")]
    Status { status: u16, url: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

impl SourceError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Transport(_) => true,
            SourceError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return SourceError::Status {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            };
        }
        if e.is_decode() {
            return SourceError::Parse(e.to_string());
        }
        SourceError::Transport(e.to_string())
    }
}

/// A source whose catalog can be listed for a date window
pub trait CatalogSource: Send + Sync {
    /// All records updated within `[start, end]`, in the source's order
    fn fetch_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PaperRecord>, SourceError>;

    fn name(&self) -> &str;
}

/// Shared blocking client for every source and reader
pub fn build_client(user_agent: &str, timeout: Duration) -> Result<Client, SourceError> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .map_err(|e| SourceError::Client(e.to_string()))
}

/// GET `url` with query parameters and return the body of a successful response
fn get_text(client: &Client, url: &str, query: &[(&str, String)]) -> Result<String, SourceError> {
    let response = client
        .get(url)
        .query(query)
        .send()
        .map_err(SourceError::from_reqwest)?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        });
    }

    response.text().map_err(SourceError::from_reqwest)
}
