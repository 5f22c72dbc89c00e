//! Full-text readers for candidate papers
//!
//! A reader turns a [`Candidate`] into the text the selection prompt shows for
//! it. Readers fail per candidate; the selector drops failed candidates and
//! carries on.

use crate::paper::Candidate;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("No text available for {0}")]
    MissingText(String),

    #[error("Unsupported content type {content_type} for {id}")]
    UnsupportedFormat { id: String, content_type: String },

    #[error("Fetching {id} failed: {message}")]
    Fetch { id: String, message: String },

    #[error("Fetching {id} returned HTTP {status}")]
    Status { id: String, status: u16 },

    #[error("Unknown document reader: {0}")]
    UnknownReader(String),

    #[error("Invalid cleaning pattern: {0}")]
    Pattern(String),
}

/// Fetches the text of one candidate
pub trait DocumentReader: Send + Sync {
    fn read(&self, candidate: &Candidate) -> Result<String, DocumentError>;

    fn name(&self) -> &str;
}

/// Uses the abstract carried by the candidate
pub struct AbstractReader;

impl DocumentReader for AbstractReader {
    fn read(&self, candidate: &Candidate) -> Result<String, DocumentError> {
        candidate
            .abstract_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .ok_or_else(|| DocumentError::MissingText(candidate.id().to_string()))
    }

    fn name(&self) -> &str {
        "abstract"
    }
}

/// GETs the candidate's locator and cleans the returned text
///
/// Only textual responses are accepted; PDF bodies are rejected.
pub struct HttpDocumentReader {
    client: Client,
    cleaner: TextCleaner,
}

impl HttpDocumentReader {
    pub fn new(client: Client) -> Result<Self, DocumentError> {
        Ok(Self {
            client,
            cleaner: TextCleaner::new()?,
        })
    }
}

impl DocumentReader for HttpDocumentReader {
    fn read(&self, candidate: &Candidate) -> Result<String, DocumentError> {
        let id = candidate.id().to_string();
        if candidate.paper.pdf_url.is_empty() {
            return Err(DocumentError::MissingText(id));
        }

        let response = self
            .client
            .get(&candidate.paper.pdf_url)
            .send()
            .map_err(|e| DocumentError::Fetch {
                id: id.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DocumentError::Status {
                id,
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/plain")
            .to_ascii_lowercase();
        if !is_textual(&content_type) {
            return Err(DocumentError::UnsupportedFormat { id, content_type });
        }

        let body = response.text().map_err(|e| DocumentError::Fetch {
            id: id.clone(),
            message: e.to_string(),
        })?;

        let text = self.cleaner.clean(&body);
        if text.is_empty() {
            return Err(DocumentError::MissingText(id));
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn is_textual(content_type: &str) -> bool {
    content_type.starts_with("text/")
        || content_type.starts_with("application/xml")
        || content_type.starts_with("application/xhtml")
        || content_type.starts_with("application/json")
}

/// Build the reader named in configuration
pub fn create_document_reader(
    name: &str,
    client: Client,
) -> Result<Arc<dyn DocumentReader>, DocumentError> {
    match name {
        "abstract" => Ok(Arc::new(AbstractReader)),
        "http" => Ok(Arc::new(HttpDocumentReader::new(client)?)),
        other => Err(DocumentError::UnknownReader(other.to_string())),
    }
}

/// Normalises extracted document text for prompting
///
/// Whitespace inside each line is collapsed (line breaks are kept), everything
/// from the first references heading onward is cut, and citation markers,
/// e-mail addresses and URLs are removed.
pub struct TextCleaner {
    references: Regex,
    citations: Regex,
    emails: Regex,
    urls: Regex,
}

impl TextCleaner {
    pub fn new() -> Result<Self, DocumentError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| DocumentError::Pattern(format!("{}: {}", pattern, e)))
        };

        Ok(Self {
            references: compile(
                r"(?im)^[ \t]*(?:\d+\.?[ \t]*)?(?:references|bibliography|works cited|literature cited)[ \t]*:?[ \t]*$",
            )?,
            citations: compile(r"\[\d+(?:[-,]\s*\d+)*\]")?,
            emails: compile(r"\S+@\S+")?,
            urls: compile(r"https?://\S+")?,
        })
    }

    pub fn clean(&self, raw: &str) -> String {
        let collapsed = collapse_lines(raw);

        let body = match self.references.find(&collapsed) {
            Some(m) => &collapsed[..m.start()],
            None => collapsed.as_str(),
        };

        let text = self.citations.replace_all(body, "");
        let text = self.emails.replace_all(&text, "");
        let text = self.urls.replace_all(&text, "");

        collapse_lines(&text).trim().to_string()
    }
}

fn collapse_lines(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::{PaperMetadata, RelevanceSignal, Source};
    use chrono::Utc;

    fn candidate(abstract_text: Option<&str>) -> Candidate {
        Candidate {
            paper: PaperMetadata {
                id: "2401.01234".to_string(),
                title: "Title".to_string(),
                source: Source::Arxiv,
                updated: Utc::now(),
                pdf_url: String::new(),
                abstract_text: None,
            },
            abstract_text: abstract_text.map(str::to_string),
            signal: RelevanceSignal::Distance(0.1),
        }
    }

    #[test]
    fn test_abstract_reader() {
        let text = AbstractReader.read(&candidate(Some("  Enhancers.  "))).unwrap();
        assert_eq!(text, "Enhancers.");

        assert!(matches!(
            AbstractReader.read(&candidate(None)),
            Err(DocumentError::MissingText(_))
        ));
        assert!(matches!(
            AbstractReader.read(&candidate(Some("   "))),
            Err(DocumentError::MissingText(_))
        ));
    }

    #[test]
    fn test_http_reader_without_locator() {
        let reader = HttpDocumentReader::new(Client::new()).unwrap();
        assert!(matches!(
            reader.read(&candidate(None)),
            Err(DocumentError::MissingText(_))
        ));
    }

    #[test]
    fn test_clean_text_cuts_references_and_markers() {
        let raw = "Intro   text [1] with   spacing [2,3] and [4-6].\n\
                   Contact jane@example.org or see https://example.org/x.\n\
                   References\n\
                   [1] Someone. A paper.";
        let cleaned = TextCleaner::new().unwrap().clean(raw);
        assert_eq!(
            cleaned,
            "Intro text with spacing and .\nContact or see"
        );
    }

    #[test]
    fn test_clean_text_keeps_inline_mentions_of_references() {
        let raw = "Prior references to this locus are sparse.";
        assert_eq!(TextCleaner::new().unwrap().clean(raw), raw);
    }

    #[test]
    fn test_textual_content_types() {
        assert!(is_textual("text/html; charset=utf-8"));
        assert!(!is_textual("application/pdf"));
    }

    #[test]
    fn test_unknown_reader() {
        assert!(matches!(
            create_document_reader("pdf", Client::new()),
            Err(DocumentError::UnknownReader(_))
        ));
    }
}
