/// Embedding & Indexing
///
/// - EmbeddingProvider trait with the FastEmbed backend for local models
/// - Exact L2 VectorIndex with a positional metadata side-table
/// - IndexBuilder for embedding fetched papers in batches
mod indexer;
mod provider;
mod vector_index;

pub use indexer::{IndexBuilder, IndexStats};
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use vector_index::{IndexWriter, SearchResult, VectorIndex, VectorIndexError};

use crate::config::EmbeddingConfig;
use std::sync::Arc;

/// Build the embedding provider named by `config.provider`
pub fn create_embedding_provider(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider.as_str() {
        "fastembed" => Ok(Arc::new(FastEmbedProvider::new(&config.model)?)),
        other => Err(EmbeddingError::UnknownProvider(other.to_string())),
    }
}
