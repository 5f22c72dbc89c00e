use super::ParsedQuery;
use crate::paper::PaperRecord;
use std::cmp::Reverse;

/// Scores records by the number of satisfied AND-groups
///
/// A group is satisfied when any of its terms occurs as a substring of the
/// lowercased title and abstract. Partial matches count: the score is not a
/// boolean AND across groups.
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    query: ParsedQuery,
}

impl RelevanceScorer {
    pub fn new(query: ParsedQuery) -> Self {
        Self { query }
    }

    pub fn query(&self) -> &ParsedQuery {
        &self.query
    }

    /// Score already-lowercased text
    pub fn score_text(&self, text: &str) -> usize {
        self.query
            .groups()
            .iter()
            .filter(|group| group.iter().any(|term| text.contains(term.as_str())))
            .count()
    }

    pub fn score(&self, record: &PaperRecord) -> usize {
        self.score_text(&record.searchable_text().to_lowercase())
    }

    /// Records with a positive score, highest first
    ///
    /// Equal scores keep their input order.
    pub fn rank<'a>(&self, records: &'a [PaperRecord]) -> Vec<(&'a PaperRecord, usize)> {
        let mut ranked: Vec<(&PaperRecord, usize)> = records
            .iter()
            .map(|r| (r, self.score(r)))
            .filter(|(_, score)| *score > 0)
            .collect();
        ranked.sort_by_key(|(_, score)| Reverse(*score));
        ranked
    }
}
