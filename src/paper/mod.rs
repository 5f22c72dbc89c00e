//! Paper records and the transient candidate types that flow through selection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a paper was fetched from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Preprint search API with structured query syntax
    Arxiv,
    /// Preprint catalog API served from the local cache
    Biorxiv,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Arxiv => f.write_str("arxiv"),
            Source::Biorxiv => f.write_str("biorxiv"),
        }
    }
}

/// A fetched paper
///
/// Records are immutable once fetched. A newer fetch with the same identifier
/// supersedes the record rather than updating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Source-specific identifier (arXiv id or DOI)
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub source: Source,
    pub updated: DateTime<Utc>,
    /// Download locator for the full document
    pub pdf_url: String,
}

impl PaperRecord {
    /// Display fields copied into the vector index side-table
    pub fn metadata(&self) -> PaperMetadata {
        PaperMetadata {
            id: self.id.clone(),
            title: self.title.clone(),
            source: self.source,
            updated: self.updated,
            pdf_url: self.pdf_url.clone(),
            abstract_text: Some(self.abstract_text.clone()),
        }
    }

    /// Title and abstract joined, the text that gets embedded and scored
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.title, self.abstract_text)
    }
}

/// Display fields of a paper stored alongside its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperMetadata {
    pub id: String,
    pub title: String,
    pub source: Source,
    pub updated: DateTime<Utc>,
    pub pdf_url: String,
    #[serde(
        rename = "abstract",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub abstract_text: Option<String>,
}

/// How a candidate was ranked
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum RelevanceSignal {
    /// Vector distance, lower is more similar
    Distance(f32),
    /// Number of satisfied query groups, higher is more relevant
    MatchCount(usize),
}

/// One ranked candidate paper
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub paper: PaperMetadata,
    /// Abstract when the candidate came from a full record
    pub abstract_text: Option<String>,
    pub signal: RelevanceSignal,
}

impl Candidate {
    pub fn from_record(record: &PaperRecord, signal: RelevanceSignal) -> Self {
        Self {
            paper: record.metadata(),
            abstract_text: Some(record.abstract_text.clone()),
            signal,
        }
    }

    /// Candidate built from index metadata, carrying whatever abstract was stored
    pub fn from_metadata(paper: PaperMetadata, signal: RelevanceSignal) -> Self {
        Self {
            abstract_text: paper.abstract_text.clone(),
            paper,
            signal,
        }
    }

    pub fn id(&self) -> &str {
        &self.paper.id
    }
}

/// Ranked candidates for a single selection request
pub type CandidateSet = Vec<Candidate>;
