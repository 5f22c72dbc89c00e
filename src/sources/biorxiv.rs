//! bioRxiv details API: `{base}/{start}/{end}/{cursor}` returning JSON pages

use super::{get_text, CatalogSource, SourceError};
use crate::paper::{PaperRecord, Source};
use crate::retry::RetryPolicy;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One page of the details endpoint
#[derive(Debug, Deserialize)]
pub struct BiorxivPage {
    #[serde(default)]
    pub collection: Vec<BiorxivEntry>,
    #[serde(default)]
    messages: Vec<BiorxivMessage>,
}

#[derive(Debug, Deserialize)]
pub struct BiorxivEntry {
    pub doi: String,
    pub title: String,
    #[serde(default)]
    pub authors: String,
    pub date: String,
    #[serde(default)]
    version: Value,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
}

#[derive(Debug, Deserialize)]
struct BiorxivMessage {
    #[serde(default)]
    total: Value,
}

impl BiorxivPage {
    pub fn parse(body: &str) -> Result<Self, SourceError> {
        serde_json::from_str(body).map_err(|e| SourceError::Parse(e.to_string()))
    }

    /// Total result count announced in `messages[0].total`
    pub fn total(&self) -> Option<usize> {
        self.messages.first().and_then(|m| value_as_usize(&m.total))
    }
}

impl BiorxivEntry {
    pub fn version(&self) -> String {
        match &self.version {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => "1".to_string(),
        }
    }

    pub fn to_record(&self) -> Result<PaperRecord, SourceError> {
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
            .map_err(|e| SourceError::Parse(format!("date {:?} of {}: {}", self.date, self.doi, e)))?;
        let updated = date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| SourceError::Parse(format!("date {:?} of {}", self.date, self.doi)))?;

        Ok(PaperRecord {
            id: self.doi.clone(),
            title: self.title.trim().to_string(),
            abstract_text: self.abstract_text.trim().to_string(),
            authors: self
                .authors
                .split("; ")
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect(),
            source: Source::Biorxiv,
            updated,
            pdf_url: format!(
                "https://www.biorxiv.org/content/{}v{}.full.pdf",
                self.doi,
                self.version()
            ),
        })
    }
}

fn value_as_usize(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Paginated catalog client for bioRxiv
pub struct BiorxivSource {
    client: Client,
    base_url: String,
    request_delay: Duration,
    retry: RetryPolicy,
}

impl BiorxivSource {
    pub fn new(client: Client, base_url: impl Into<String>, request_delay: Duration, retry: RetryPolicy) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_delay,
            retry,
        }
    }

    fn fetch_page(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cursor: usize,
    ) -> Result<BiorxivPage, SourceError> {
        let url = format!(
            "{}/{}/{}/{}",
            self.base_url,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d"),
            cursor
        );
        debug!("Fetching {}", url);

        let body = self
            .retry
            .run(|_| get_text(&self.client, &url, &[]), SourceError::is_transient)?;
        BiorxivPage::parse(&body)
    }
}

impl CatalogSource for BiorxivSource {
    fn fetch_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PaperRecord>, SourceError> {
        let mut records = Vec::new();
        let mut cursor = 0;

        loop {
            let page = self.fetch_page(start, end, cursor)?;
            if page.collection.is_empty() {
                break;
            }

            cursor += page.collection.len();
            for entry in &page.collection {
                match entry.to_record() {
                    Ok(record) => records.push(record),
                    Err(e) => warn!("Skipping bioRxiv entry: {}", e),
                }
            }

            if let Some(total) = page.total() {
                if cursor >= total {
                    break;
                }
            }
            std::thread::sleep(self.request_delay);
        }

        info!("Fetched {} bioRxiv records", records.len());
        Ok(records)
    }

    fn name(&self) -> &str {
        "biorxiv"
    }
}
