//! Exact L2 vector index over paper embeddings
//!
//! Vectors live in a dense `(n, dimension)` matrix. Row `i` is the `i`-th
//! appended vector and `metadata[i]` is its paper; the two are only ever
//! appended together so the positional key stays bijective.
//!
//! On disk the index is two artifacts that are loaded as one unit:
//! - the index blob: zstd-compressed bincode of the matrix
//! - the metadata table: JSON mapping position to paper metadata, stamped with
//!   the BLAKE3 digest of the blob it was written alongside

use crate::paper::PaperMetadata;
use ahash::AHashSet;
use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info};

const FORMAT_VERSION: u32 = 1;
const ZSTD_LEVEL: i32 = 3;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Index initialization failed: {0}")]
    InitializationError(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Index artifacts must be present together: found {present}, missing {missing}")]
    IncompleteArtifacts { present: PathBuf, missing: PathBuf },

    #[error("Index artifacts are inconsistent: {0}")]
    Corrupt(String),

    #[error("IO error on {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Index lock poisoned")]
    LockPoisoned,
}

/// One nearest-neighbour hit
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Insertion position of the matched vector
    pub position: usize,
    /// Euclidean distance to the query (0.0 for an exact match)
    pub distance: f32,
    pub metadata: PaperMetadata,
}

struct IndexState {
    vectors: Array2<f32>,
    metadata: Vec<PaperMetadata>,
}

impl IndexState {
    fn empty(dimension: usize) -> Self {
        Self {
            vectors: Array2::zeros((0, dimension)),
            metadata: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.metadata.len()
    }
}

#[derive(Serialize, Deserialize)]
struct IndexBlob {
    format_version: u32,
    dimension: usize,
    rows: usize,
    data: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct MetadataTable {
    index_digest: String,
    entries: BTreeMap<usize, PaperMetadata>,
}

/// Flat nearest-neighbour index with a positional metadata side-table
pub struct VectorIndex {
    dimension: usize,
    index_path: PathBuf,
    metadata_path: PathBuf,
    state: RwLock<IndexState>,
}

impl VectorIndex {
    /// Create an empty index; nothing is read from disk
    pub fn new(
        dimension: usize,
        index_path: PathBuf,
        metadata_path: PathBuf,
    ) -> Result<Self, VectorIndexError> {
        if dimension == 0 {
            return Err(VectorIndexError::InitializationError(
                "dimension must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            dimension,
            index_path,
            metadata_path,
            state: RwLock::new(IndexState::empty(dimension)),
        })
    }

    /// Open the index at the given paths, loading it when both artifacts exist
    pub fn open(
        dimension: usize,
        index_path: PathBuf,
        metadata_path: PathBuf,
    ) -> Result<Self, VectorIndexError> {
        let index = Self::new(dimension, index_path, metadata_path)?;

        match (index.index_path.exists(), index.metadata_path.exists()) {
            (true, true) => {
                index.load()?;
            }
            (false, false) => {
                debug!("No index at {}, starting empty", index.index_path.display());
            }
            (true, false) => {
                return Err(VectorIndexError::IncompleteArtifacts {
                    present: index.index_path.clone(),
                    missing: index.metadata_path.clone(),
                });
            }
            (false, true) => {
                return Err(VectorIndexError::IncompleteArtifacts {
                    present: index.metadata_path.clone(),
                    missing: index.index_path.clone(),
                });
            }
        }

        Ok(index)
    }

    /// Append a vector and its metadata, returning the assigned position
    pub fn add(&self, vector: &[f32], metadata: PaperMetadata) -> Result<usize, VectorIndexError> {
        self.writer()?.add(vector, metadata)
    }

    /// Take the single-writer lock for a mutate-then-persist sequence
    ///
    /// Searches and saves block until the writer is dropped or committed.
    pub fn writer(&self) -> Result<IndexWriter<'_>, VectorIndexError> {
        Ok(IndexWriter {
            index: self,
            state: self.write_state()?,
            added: 0,
        })
    }

    /// Return up to `top_k` entries ordered by ascending distance
    ///
    /// Ties keep insertion order. An index smaller than `top_k` returns every
    /// entry; results are never padded.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>, VectorIndexError> {
        self.check_dimension(query)?;

        let state = self.read_state()?;
        let query = ArrayView1::from(query);

        let mut scored: Vec<(usize, f32)> = state
            .vectors
            .outer_iter()
            .enumerate()
            .map(|(position, row)| {
                let diff = &row - &query;
                (position, diff.dot(&diff))
            })
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(position, squared)| SearchResult {
                position,
                distance: squared.sqrt(),
                metadata: state.metadata[position].clone(),
            })
            .collect())
    }

    /// Persist both artifacts
    pub fn save(&self) -> Result<(), VectorIndexError> {
        let state = self.read_state()?;
        self.persist(&state)
    }

    /// Replace the in-memory state with the persisted artifacts
    pub fn load(&self) -> Result<(), VectorIndexError> {
        let blob_bytes = read_file(&self.index_path)?;
        let table_bytes = read_file(&self.metadata_path)?;

        let table: MetadataTable = serde_json::from_slice(&table_bytes)
            .map_err(|e| VectorIndexError::SerializationError(e.to_string()))?;

        let digest = blake3::hash(&blob_bytes).to_hex().to_string();
        if digest != table.index_digest {
            return Err(VectorIndexError::Corrupt(format!(
                "metadata table {} was not written with index blob {}",
                self.metadata_path.display(),
                self.index_path.display()
            )));
        }

        let raw = zstd::decode_all(&blob_bytes[..]).map_err(|e| VectorIndexError::Io {
            source: e,
            path: self.index_path.clone(),
        })?;
        let blob: IndexBlob = bincode::deserialize(&raw)
            .map_err(|e| VectorIndexError::SerializationError(e.to_string()))?;

        if blob.format_version != FORMAT_VERSION {
            return Err(VectorIndexError::Corrupt(format!(
                "unsupported index format version {}",
                blob.format_version
            )));
        }
        if blob.dimension != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: blob.dimension,
            });
        }

        let vectors = Array2::from_shape_vec((blob.rows, blob.dimension), blob.data)
            .map_err(|e| VectorIndexError::Corrupt(e.to_string()))?;

        // Positions must be exactly 0..rows so row i pairs with entry i
        if table.entries.len() != blob.rows {
            return Err(VectorIndexError::Corrupt(format!(
                "{} vectors but {} metadata entries",
                blob.rows,
                table.entries.len()
            )));
        }
        let mut metadata = Vec::with_capacity(blob.rows);
        for (expected, (position, entry)) in table.entries.into_iter().enumerate() {
            if position != expected {
                return Err(VectorIndexError::Corrupt(format!(
                    "metadata position {} has no matching vector",
                    position
                )));
            }
            metadata.push(entry);
        }

        let mut state = self.write_state()?;
        *state = IndexState { vectors, metadata };

        info!(
            "Loaded vector index with {} entries from {}",
            state.len(),
            self.index_path.display()
        );

        Ok(())
    }

    /// Number of stored vectors
    pub fn len(&self) -> usize {
        self.read_state().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// `(id, updated)` of every stored paper
    pub fn keys(&self) -> Result<AHashSet<(String, DateTime<Utc>)>, VectorIndexError> {
        let state = self.read_state()?;
        Ok(state
            .metadata
            .iter()
            .map(|m| (m.id.clone(), m.updated))
            .collect())
    }

    /// Metadata stored at an insertion position
    pub fn get(&self, position: usize) -> Option<PaperMetadata> {
        self.read_state()
            .ok()
            .and_then(|s| s.metadata.get(position).cloned())
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    fn persist(&self, state: &IndexState) -> Result<(), VectorIndexError> {
        let blob = IndexBlob {
            format_version: FORMAT_VERSION,
            dimension: self.dimension,
            rows: state.len(),
            data: state.vectors.iter().copied().collect(),
        };
        let raw = bincode::serialize(&blob)
            .map_err(|e| VectorIndexError::SerializationError(e.to_string()))?;
        let blob_bytes = zstd::encode_all(&raw[..], ZSTD_LEVEL).map_err(|e| VectorIndexError::Io {
            source: e,
            path: self.index_path.clone(),
        })?;

        let table = MetadataTable {
            index_digest: blake3::hash(&blob_bytes).to_hex().to_string(),
            entries: state.metadata.iter().cloned().enumerate().collect(),
        };
        let table_bytes = serde_json::to_vec_pretty(&table)
            .map_err(|e| VectorIndexError::SerializationError(e.to_string()))?;

        write_atomic(&self.index_path, &blob_bytes)?;
        write_atomic(&self.metadata_path, &table_bytes)?;

        debug!(
            "Saved vector index ({} entries) to {}",
            state.len(),
            self.index_path.display()
        );

        Ok(())
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, IndexState>, VectorIndexError> {
        self.state.read().map_err(|_| VectorIndexError::LockPoisoned)
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, IndexState>, VectorIndexError> {
        self.state.write().map_err(|_| VectorIndexError::LockPoisoned)
    }
}

/// Exclusive write access to a [`VectorIndex`]
pub struct IndexWriter<'a> {
    index: &'a VectorIndex,
    state: RwLockWriteGuard<'a, IndexState>,
    added: usize,
}

impl IndexWriter<'_> {
    /// Append a vector and its metadata, returning the assigned position
    pub fn add(&mut self, vector: &[f32], metadata: PaperMetadata) -> Result<usize, VectorIndexError> {
        self.index.check_dimension(vector)?;

        self.state
            .vectors
            .push_row(ArrayView1::from(vector))
            .map_err(|e| VectorIndexError::InitializationError(e.to_string()))?;
        self.state.metadata.push(metadata);
        self.added += 1;

        Ok(self.state.len() - 1)
    }

    /// Number of entries appended through this writer
    pub fn added(&self) -> usize {
        self.added
    }

    /// Persist the index and release the lock
    pub fn commit(self) -> Result<usize, VectorIndexError> {
        self.index.persist(&self.state)?;
        Ok(self.added)
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, VectorIndexError> {
    fs::read(path).map_err(|e| VectorIndexError::Io {
        source: e,
        path: path.to_path_buf(),
    })
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), VectorIndexError> {
    let io_err = |source| VectorIndexError::Io {
        source,
        path: path.to_path_buf(),
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path).map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    fs::rename(&temp_path, path).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::Source;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn meta(id: &str) -> PaperMetadata {
        PaperMetadata {
            id: id.to_string(),
            title: format!("Paper {}", id),
            source: Source::Arxiv,
            updated: Utc.with_ymd_and_hms(2024, 10, 9, 0, 0, 0).unwrap(),
            pdf_url: format!("https://arxiv.org/pdf/{}.pdf", id),
            abstract_text: None,
        }
    }

    fn index_in(temp: &TempDir, dimension: usize) -> VectorIndex {
        VectorIndex::new(
            dimension,
            temp.path().join("index.bin"),
            temp.path().join("metadata.json"),
        )
        .unwrap()
    }

    #[test]
    fn test_index_creation() {
        let temp = TempDir::new().unwrap();
        let index = index_in(&temp, 4);
        assert_eq!(index.dimension(), 4);
        assert_eq!(index.len(), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let temp = TempDir::new().unwrap();
        let result = VectorIndex::new(0, temp.path().join("i"), temp.path().join("m"));
        assert!(matches!(result, Err(VectorIndexError::InitializationError(_))));
    }

    #[test]
    fn test_dimension_validation() {
        let temp = TempDir::new().unwrap();
        let index = index_in(&temp, 4);

        let result = index.add(&[1.0, 2.0], meta("a"));
        assert!(matches!(
            result,
            Err(VectorIndexError::InvalidDimension {
                expected: 4,
                actual: 2
            })
        ));
        assert!(index.is_empty());

        assert!(index.search(&[1.0; 3], 1).is_err());
    }

    #[test]
    fn test_search_orders_by_ascending_distance() {
        let temp = TempDir::new().unwrap();
        let index = index_in(&temp, 2);

        index.add(&[0.0, 0.0], meta("origin")).unwrap();
        index.add(&[3.0, 4.0], meta("far")).unwrap();
        index.add(&[1.0, 0.0], meta("near")).unwrap();

        let results = index.search(&[0.0, 0.0], 3).unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.metadata.id.as_str()).collect();
        assert_eq!(ids, vec!["origin", "near", "far"]);
        assert_eq!(results[0].distance, 0.0);
        assert_eq!(results[1].distance, 1.0);
        // 3-4-5 triangle: reported as Euclidean, not squared
        assert_eq!(results[2].distance, 5.0);
    }

    #[test]
    fn test_search_does_not_pad_small_index() {
        let temp = TempDir::new().unwrap();
        let index = index_in(&temp, 2);
        index.add(&[1.0, 1.0], meta("only")).unwrap();

        let results = index.search(&[0.0, 0.0], 10).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let temp = TempDir::new().unwrap();
        let index = index_in(&temp, 2);
        index.add(&[1.0, 0.0], meta("first")).unwrap();
        index.add(&[0.0, 1.0], meta("second")).unwrap();

        let results = index.search(&[0.0, 0.0], 2).unwrap();
        assert_eq!(results[0].metadata.id, "first");
        assert_eq!(results[1].metadata.id, "second");
    }

    #[test]
    fn test_identity_retrieval() {
        let temp = TempDir::new().unwrap();
        let index = index_in(&temp, 3);
        let vectors = [[0.1, 0.2, 0.3], [0.9, -0.4, 0.0], [5.0, 5.0, 5.0]];

        for (i, v) in vectors.iter().enumerate() {
            index.add(v, meta(&i.to_string())).unwrap();
            let hit = &index.search(v, 1).unwrap()[0];
            assert_eq!(hit.metadata.id, i.to_string());
            assert_eq!(hit.position, i);
            assert_eq!(hit.distance, 0.0);
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let query = [0.25, 0.5, 0.75];

        let before = {
            let index = index_in(&temp, 3);
            for i in 0..20 {
                let f = i as f32;
                index.add(&[f * 0.1, 1.0 - f * 0.05, f.sin()], meta(&format!("p{}", i))).unwrap();
            }
            index.save().unwrap();
            index.search(&query, 7).unwrap()
        };

        let reopened = VectorIndex::open(
            3,
            temp.path().join("index.bin"),
            temp.path().join("metadata.json"),
        )
        .unwrap();
        assert_eq!(reopened.len(), 20);
        assert_eq!(reopened.search(&query, 7).unwrap(), before);
        assert_eq!(reopened.get(5).unwrap().id, "p5");
    }

    #[test]
    fn test_load_rejects_dimension_mismatch() {
        let temp = TempDir::new().unwrap();
        let index = index_in(&temp, 3);
        index.add(&[1.0, 2.0, 3.0], meta("a")).unwrap();
        index.save().unwrap();

        let result = VectorIndex::open(
            4,
            temp.path().join("index.bin"),
            temp.path().join("metadata.json"),
        );
        assert!(matches!(
            result,
            Err(VectorIndexError::InvalidDimension {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_open_requires_both_artifacts() {
        let temp = TempDir::new().unwrap();
        let index = index_in(&temp, 2);
        index.add(&[1.0, 2.0], meta("a")).unwrap();
        index.save().unwrap();
        fs::remove_file(temp.path().join("metadata.json")).unwrap();

        let result = VectorIndex::open(
            2,
            temp.path().join("index.bin"),
            temp.path().join("metadata.json"),
        );
        assert!(matches!(
            result,
            Err(VectorIndexError::IncompleteArtifacts { .. })
        ));
    }

    #[test]
    fn test_load_rejects_metadata_from_another_save() {
        let temp = TempDir::new().unwrap();
        let index = index_in(&temp, 2);
        index.add(&[1.0, 2.0], meta("a")).unwrap();
        index.save().unwrap();
        let stale_table = fs::read(temp.path().join("metadata.json")).unwrap();

        index.add(&[3.0, 4.0], meta("b")).unwrap();
        index.save().unwrap();
        fs::write(temp.path().join("metadata.json"), stale_table).unwrap();

        assert!(matches!(index.load(), Err(VectorIndexError::Corrupt(_))));
    }

    #[test]
    fn test_writer_commit_persists() {
        let temp = TempDir::new().unwrap();
        let index = index_in(&temp, 2);

        let mut writer = index.writer().unwrap();
        writer.add(&[1.0, 0.0], meta("a")).unwrap();
        writer.add(&[0.0, 1.0], meta("b")).unwrap();
        assert_eq!(writer.added(), 2);
        assert_eq!(writer.commit().unwrap(), 2);

        let reopened = VectorIndex::open(
            2,
            temp.path().join("index.bin"),
            temp.path().join("metadata.json"),
        )
        .unwrap();
        assert_eq!(reopened.len(), 2);
    }
}
