//! Keyword relevance over cached catalog entries
//!
//! A free-text interest is parsed once into AND-groups of OR-terms and every
//! catalog entry is scored by how many groups it satisfies.

mod query;
mod scorer;

pub use query::ParsedQuery;
pub use scorer::RelevanceScorer;
