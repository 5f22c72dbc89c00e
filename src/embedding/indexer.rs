/// Batch embedding of fetched papers into the vector index
use super::{EmbeddingProvider, VectorIndex, VectorIndexError};
use crate::paper::PaperRecord;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of one indexing run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub indexed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
}

/// Embeds records in batches and appends them to a [`VectorIndex`]
///
/// A failed batch is logged and counted; the rest of the run continues. The
/// whole run holds the index writer lock and persists once at the end.
pub struct IndexBuilder {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
    batch_size: usize,
}

impl IndexBuilder {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndex>,
        batch_size: usize,
    ) -> Result<Self, VectorIndexError> {
        if provider.dimension() != index.dimension() {
            return Err(VectorIndexError::InvalidDimension {
                expected: index.dimension(),
                actual: provider.dimension(),
            });
        }

        Ok(Self {
            provider,
            index,
            batch_size: batch_size.max(1),
        })
    }

    pub fn index_records(&self, records: &[PaperRecord]) -> Result<IndexStats, VectorIndexError> {
        let start = Instant::now();
        let mut stats = IndexStats::default();

        // A paper is re-embedded only when its update timestamp changes
        let mut known = self.index.keys()?;
        let usable: Vec<&PaperRecord> = records
            .iter()
            .filter(|r| {
                if r.abstract_text.trim().is_empty() {
                    debug!("Skipping {} with empty abstract", r.id);
                    return false;
                }
                if !known.insert((r.id.clone(), r.updated)) {
                    debug!("Skipping {}, already indexed", r.id);
                    return false;
                }
                true
            })
            .collect();
        stats.skipped = records.len() - usable.len();

        info!(
            "Indexing {} papers with {} (batch size {})",
            usable.len(),
            self.provider.model_name(),
            self.batch_size
        );

        let mut writer = self.index.writer()?;

        for chunk in usable.chunks(self.batch_size) {
            let texts: Vec<String> = chunk.iter().map(|r| r.searchable_text()).collect();

            match self.provider.embed_batch(&texts) {
                Ok(vectors) => {
                    if vectors.len() < chunk.len() {
                        warn!(
                            "Provider returned {} vectors for {} papers, {} left unindexed",
                            vectors.len(),
                            chunk.len(),
                            chunk.len() - vectors.len()
                        );
                        stats.failed += chunk.len() - vectors.len();
                    }
                    for (record, vector) in chunk.iter().zip(vectors) {
                        match writer.add(&vector, record.metadata()) {
                            Ok(_) => stats.indexed += 1,
                            Err(e) => {
                                warn!("Failed to index {}: {}", record.id, e);
                                stats.failed += 1;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to embed batch of {} papers: {}", chunk.len(), e);
                    stats.failed += chunk.len();
                }
            }
        }

        writer.commit()?;
        stats.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Indexing complete: {} indexed, {} failed, {} skipped, {}ms",
            stats.indexed, stats.failed, stats.skipped, stats.duration_ms
        );

        Ok(stats)
    }
}
