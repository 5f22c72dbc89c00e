//! Candidate selection
//!
//! One request in, one [`Selection`] out:
//!
//! 1. rank `top_k` candidates (semantic search or keyword scoring)
//! 2. read every candidate's text on a bounded pool, dropping failures
//! 3. prompt the model once with the survivors
//! 4. keep only identifiers that name a prompted candidate, in rank order
//!
//! A response that cannot be parsed is an empty selection, not an error.
//! Failures of the candidate provider or the model call fail the request.
mod candidates;
mod parse;
mod prompt;

pub use candidates::{CandidateProvider, KeywordCandidates, SemanticCandidates};
pub use parse::{ParsedResponse, ResponseParser};
pub use prompt::{build_prompt, PromptEntry};

use crate::cache::CacheError;
use crate::config::SelectionConfig;
use crate::documents::DocumentReader;
use crate::embedding::{EmbeddingError, VectorIndexError};
use crate::llm::{LlmError, LlmGateway};
use crate::paper::{Candidate, PaperMetadata, RelevanceSignal};
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("Interest statement is empty")]
    EmptyInterest,

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] VectorIndexError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Invalid response pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Selection task failed: {0}")]
    Task(String),
}

/// How the prompt tells the model to behave when nothing stands out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// The model may answer "None"
    #[default]
    AllowEmpty,
    /// The model is told to always pick the closest paper
    AtLeastOne,
}

/// A paper the model picked
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedPaper {
    /// 1-based position in the candidate ranking
    pub rank: usize,
    pub paper: PaperMetadata,
    pub signal: RelevanceSignal,
}

/// A candidate removed before prompting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedCandidate {
    pub id: String,
    pub reason: String,
}

/// Outcome of one selection request
#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    pub run_id: Uuid,
    pub interest: String,
    pub papers: Vec<SelectedPaper>,
    /// Free-text justification, when the model gave one
    pub reasoning: Option<String>,
    /// Candidates shown to the model
    pub considered: usize,
    pub dropped: Vec<DroppedCandidate>,
}

impl Selection {
    fn empty(run_id: Uuid, interest: &str, dropped: Vec<DroppedCandidate>) -> Self {
        Self {
            run_id,
            interest: interest.to_string(),
            papers: Vec::new(),
            reasoning: None,
            considered: 0,
            dropped,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.papers.iter().map(|p| p.paper.id.as_str()).collect()
    }
}

/// A candidate whose text was read, with its 1-based rank
struct Readable {
    rank: usize,
    candidate: Candidate,
    text: String,
}

/// Runs the selection pipeline over injected collaborators
pub struct CandidateSelector {
    provider: Arc<dyn CandidateProvider>,
    reader: Arc<dyn DocumentReader>,
    gateway: Arc<LlmGateway>,
    parser: ResponseParser,
    config: SelectionConfig,
}

impl CandidateSelector {
    pub fn new(
        provider: Arc<dyn CandidateProvider>,
        reader: Arc<dyn DocumentReader>,
        gateway: Arc<LlmGateway>,
        config: SelectionConfig,
    ) -> Result<Self, SelectionError> {
        Ok(Self {
            provider,
            reader,
            gateway,
            parser: ResponseParser::new()?,
            config,
        })
    }

    pub async fn select(&self, interest: &str) -> Result<Selection, SelectionError> {
        if interest.trim().is_empty() {
            return Err(SelectionError::EmptyInterest);
        }
        let run_id = Uuid::new_v4();

        let candidates = {
            let provider = self.provider.clone();
            let interest = interest.to_string();
            let top_k = self.config.top_k;
            tokio::task::spawn_blocking(move || provider.candidates(&interest, top_k))
                .await
                .map_err(|e| SelectionError::Task(e.to_string()))??
        };
        info!(
            %run_id,
            "{} candidates from {} search",
            candidates.len(),
            self.provider.name()
        );

        let (readable, dropped) = self.read_all(candidates).await?;
        if readable.is_empty() {
            info!(%run_id, "No readable candidates, nothing to select");
            return Ok(Selection::empty(run_id, interest, dropped));
        }

        let entries: Vec<PromptEntry<'_>> = readable
            .iter()
            .map(|r| PromptEntry {
                id: r.candidate.id(),
                title: &r.candidate.paper.title,
                text: &r.text,
            })
            .collect();
        let prompt = build_prompt(
            interest,
            &entries,
            self.config.policy,
            self.config.max_selected,
            self.config.max_document_chars,
        );

        let response = {
            let gateway = self.gateway.clone();
            tokio::task::spawn_blocking(move || gateway.generate(&prompt))
                .await
                .map_err(|e| SelectionError::Task(e.to_string()))??
        };
        debug!(%run_id, "Model response: {}", response);

        let parsed = self.parser.parse(&response);
        if !parsed.has_marker {
            warn!(%run_id, "Model response had no selection line, treating as no selection");
        }

        let papers = resolve(&parsed.ids, &readable, self.config.max_selected);
        info!(
            %run_id,
            "Selected {} of {} considered papers ({} dropped)",
            papers.len(),
            readable.len(),
            dropped.len()
        );

        Ok(Selection {
            run_id,
            interest: interest.to_string(),
            papers,
            reasoning: parsed.reasoning,
            considered: readable.len(),
            dropped,
        })
    }

    /// Read every candidate on the blocking pool, at most `max_concurrent_reads` at once
    ///
    /// Returns the readable candidates in rank order and the dropped ones.
    async fn read_all(
        &self,
        candidates: Vec<Candidate>,
    ) -> Result<(Vec<Readable>, Vec<DroppedCandidate>), SelectionError> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_reads.max(1)));
        let mut tasks = JoinSet::new();

        for (index, candidate) in candidates.into_iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| SelectionError::Task(e.to_string()))?;
            let reader = self.reader.clone();

            tasks.spawn_blocking(move || {
                let _permit = permit;
                let result = reader.read(&candidate);
                (index + 1, candidate, result)
            });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            outcomes.push(joined.map_err(|e| SelectionError::Task(e.to_string()))?);
        }
        outcomes.sort_by_key(|(rank, ..)| *rank);

        let mut readable = Vec::with_capacity(outcomes.len());
        let mut dropped = Vec::new();
        for (rank, candidate, result) in outcomes {
            match result {
                Ok(text) => readable.push(Readable {
                    rank,
                    candidate,
                    text,
                }),
                Err(e) => {
                    warn!("Dropping candidate {}: {}", candidate.id(), e);
                    dropped.push(DroppedCandidate {
                        id: candidate.id().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok((readable, dropped))
    }
}

/// Map the model's ids onto prompted candidates, rank order, at most `max_selected`
///
/// Ids that name no prompted candidate are logged and ignored. A versioned
/// arXiv id matches its unversioned candidate.
fn resolve(ids: &[String], readable: &[Readable], max_selected: usize) -> Vec<SelectedPaper> {
    let mut lookup: AHashMap<String, usize> = AHashMap::with_capacity(readable.len() * 2);
    for (i, r) in readable.iter().enumerate() {
        let id = r.candidate.id().to_lowercase();
        lookup
            .entry(parse::strip_version(&id).to_string())
            .or_insert(i);
        lookup.insert(id, i);
    }

    let mut chosen: AHashSet<usize> = AHashSet::new();
    for id in ids {
        let key = id.to_lowercase();
        let hit = lookup
            .get(&key)
            .or_else(|| lookup.get(parse::strip_version(&key)))
            .copied();
        match hit {
            Some(i) => {
                chosen.insert(i);
            }
            None => warn!("Ignoring selected id {} that was not a candidate", id),
        }
    }

    let mut picks: Vec<usize> = chosen.into_iter().collect();
    picks.sort_unstable();
    if picks.len() > max_selected {
        debug!(
            "Model picked {} papers, keeping the top {}",
            picks.len(),
            max_selected
        );
        picks.truncate(max_selected);
    }

    picks
        .into_iter()
        .map(|i| {
            let r = &readable[i];
            SelectedPaper {
                rank: r.rank,
                paper: r.candidate.paper.clone(),
                signal: r.candidate.signal,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::Source;
    use chrono::Utc;

    fn readable(ids: &[&str]) -> Vec<Readable> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| Readable {
                rank: i + 1,
                candidate: Candidate {
                    paper: PaperMetadata {
                        id: id.to_string(),
                        title: format!("Paper {}", id),
                        source: Source::Arxiv,
                        updated: Utc::now(),
                        pdf_url: String::new(),
                        abstract_text: None,
                    },
                    abstract_text: Some("text".to_string()),
                    signal: RelevanceSignal::Distance(i as f32),
                },
                text: "text".to_string(),
            })
            .collect()
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_orders_by_rank_and_drops_unknown() {
        let pool = readable(&["2401.00001", "2401.00002", "2401.00003"]);
        let picked = resolve(&ids(&["2401.00003", "9999.99999", "2401.00001"]), &pool, 3);
        let got: Vec<&str> = picked.iter().map(|p| p.paper.id.as_str()).collect();
        assert_eq!(got, vec!["2401.00001", "2401.00003"]);
        assert_eq!(picked[1].rank, 3);
    }

    #[test]
    fn test_resolve_caps_and_dedups() {
        let pool = readable(&["a/0000001", "a/0000002", "a/0000003", "a/0000004"]);
        let picked = resolve(
            &ids(&["a/0000004", "a/0000004", "a/0000003", "a/0000002", "a/0000001"]),
            &pool,
            3,
        );
        let got: Vec<&str> = picked.iter().map(|p| p.paper.id.as_str()).collect();
        assert_eq!(got, vec!["a/0000001", "a/0000002", "a/0000003"]);
    }

    #[test]
    fn test_resolve_matches_versioned_ids() {
        let pool = readable(&["2401.01234"]);
        let picked = resolve(&ids(&["2401.01234v2"]), &pool, 3);
        assert_eq!(picked.len(), 1);
    }

    #[test]
    fn test_policy_config_names() {
        let policy: SelectionPolicy = serde_json::from_str("\"at_least_one\"").unwrap();
        assert_eq!(policy, SelectionPolicy::AtLeastOne);
        assert_eq!(SelectionPolicy::default(), SelectionPolicy::AllowEmpty);
    }
}
