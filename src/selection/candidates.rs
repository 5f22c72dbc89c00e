/// Candidate providers: semantic search over the vector index, or keyword
/// scoring over the cached catalog
use super::SelectionError;
use crate::cache::CorpusCache;
use crate::embedding::{EmbeddingProvider, VectorIndex};
use crate::paper::{Candidate, CandidateSet, RelevanceSignal};
use crate::scoring::{ParsedQuery, RelevanceScorer};
use std::sync::Arc;
use tracing::debug;

/// Produces the ranked candidates for an interest statement
///
/// Implementations block; the selector runs them on the blocking pool.
pub trait CandidateProvider: Send + Sync {
    fn candidates(&self, interest: &str, top_k: usize) -> Result<CandidateSet, SelectionError>;

    fn name(&self) -> &str;
}

/// Nearest neighbours of the embedded interest, closest first
pub struct SemanticCandidates {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
}

impl SemanticCandidates {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<VectorIndex>) -> Self {
        Self { embedder, index }
    }
}

impl CandidateProvider for SemanticCandidates {
    fn candidates(&self, interest: &str, top_k: usize) -> Result<CandidateSet, SelectionError> {
        let query = self.embedder.embed(interest)?;
        let results = self.index.search(&query, top_k)?;
        debug!(
            "Semantic search returned {} of {} indexed papers",
            results.len(),
            self.index.len()
        );

        Ok(results
            .into_iter()
            .map(|r| Candidate::from_metadata(r.metadata, RelevanceSignal::Distance(r.distance)))
            .collect())
    }

    fn name(&self) -> &str {
        "semantic"
    }
}

/// Cached catalog entries ranked by satisfied query groups
pub struct KeywordCandidates {
    cache: Arc<CorpusCache>,
}

impl KeywordCandidates {
    pub fn new(cache: Arc<CorpusCache>) -> Self {
        Self { cache }
    }
}

impl CandidateProvider for KeywordCandidates {
    fn candidates(&self, interest: &str, top_k: usize) -> Result<CandidateSet, SelectionError> {
        let query = ParsedQuery::parse(interest);
        if query.is_empty() {
            return Err(SelectionError::EmptyInterest);
        }

        let articles = self.cache.get_articles()?;
        let scorer = RelevanceScorer::new(query);
        let ranked = scorer.rank(&articles);
        debug!(
            "Keyword scoring matched {} of {} cached papers",
            ranked.len(),
            articles.len()
        );

        Ok(ranked
            .into_iter()
            .take(top_k)
            .map(|(record, score)| Candidate::from_record(record, RelevanceSignal::MatchCount(score)))
            .collect())
    }

    fn name(&self) -> &str {
        "keyword"
    }
}
