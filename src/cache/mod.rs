//! Locally persisted catalog snapshot for a secondary source
//!
//! The cache holds one full snapshot of a source's catalog for a rolling
//! window. A snapshot is replaced wholesale once it is older than `max_age`;
//! there is no incremental patching. A failed refetch is an error for the
//! request, stale data is never served in its place.

use crate::paper::PaperRecord;
use crate::sources::{CatalogSource, SourceError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Refreshing the {source_name} catalog failed: {error}")]
    Fetch {
        source_name: String,
        #[source]
        error: SourceError,
    },

    #[error("Cache IO error at {path:?}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("Cache serialization error: {0}")]
    Serialization(String),

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// One full fetch of a source's catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusSnapshot {
    /// When the fetch completed
    pub date: DateTime<Utc>,
    pub articles: Vec<PaperRecord>,
}

impl CorpusSnapshot {
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.date
    }
}

/// Freshness of the cached snapshot at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Missing,
    Stale,
    Fresh,
}

/// Single-writer cache over a [`CatalogSource`]
///
/// Refreshes are serialized by an internal mutex, so concurrent callers in one
/// process see at most one fetch per stale period. Separate processes sharing
/// the same file are not coordinated.
pub struct CorpusCache {
    source: Arc<dyn CatalogSource>,
    path: PathBuf,
    max_age: Duration,
    window: Duration,
    snapshot: Mutex<Option<CorpusSnapshot>>,
}

impl CorpusCache {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        path: impl Into<PathBuf>,
        max_age: Duration,
        window: Duration,
    ) -> Self {
        Self {
            source,
            path: path.into(),
            max_age,
            window,
            snapshot: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Articles of a fresh snapshot, refetching first when needed
    pub fn get_articles(&self) -> Result<Vec<PaperRecord>, CacheError> {
        self.get_articles_at(Utc::now())
    }

    /// Same as [`CorpusCache::get_articles`] with an explicit clock
    pub fn get_articles_at(&self, now: DateTime<Utc>) -> Result<Vec<PaperRecord>, CacheError> {
        let mut guard = self.snapshot.lock().map_err(|_| CacheError::LockPoisoned)?;

        if guard.is_none() {
            *guard = self.read_file()?;
        }

        let state = self.classify(guard.as_ref(), now);
        match (state, guard.as_ref()) {
            (CacheState::Fresh, Some(snapshot)) => {
                debug!(
                    "Using cached {} catalog ({} articles, {}h old)",
                    self.source.name(),
                    snapshot.articles.len(),
                    snapshot.age_at(now).num_hours()
                );
                return Ok(snapshot.articles.clone());
            }
            (CacheState::Stale, Some(snapshot)) => info!(
                "Cached {} catalog is stale ({} days old), refetching",
                self.source.name(),
                snapshot.age_at(now).num_days()
            ),
            _ => info!("No cached {} catalog, fetching", self.source.name()),
        }

        let snapshot = self.refresh_at(now)?;
        let articles = snapshot.articles.clone();
        *guard = Some(snapshot);
        Ok(articles)
    }

    /// Refetch regardless of freshness and persist the new snapshot
    pub fn force_refresh(&self) -> Result<CorpusSnapshot, CacheError> {
        let mut guard = self.snapshot.lock().map_err(|_| CacheError::LockPoisoned)?;
        info!("Forcing refresh of the {} catalog", self.source.name());
        let snapshot = self.refresh_at(Utc::now())?;
        *guard = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// State the cache would be found in at `now`, loading the file if needed
    pub fn state_at(&self, now: DateTime<Utc>) -> Result<CacheState, CacheError> {
        let mut guard = self.snapshot.lock().map_err(|_| CacheError::LockPoisoned)?;
        if guard.is_none() {
            *guard = self.read_file()?;
        }
        Ok(self.classify(guard.as_ref(), now))
    }

    fn classify(&self, snapshot: Option<&CorpusSnapshot>, now: DateTime<Utc>) -> CacheState {
        match snapshot {
            None => CacheState::Missing,
            Some(s) if s.age_at(now) >= self.max_age => CacheState::Stale,
            Some(_) => CacheState::Fresh,
        }
    }

    /// Fetch the window ending yesterday and persist it
    fn refresh_at(&self, now: DateTime<Utc>) -> Result<CorpusSnapshot, CacheError> {
        let end = now - Duration::days(1);
        let start = end - self.window;

        let articles = self
            .source
            .fetch_window(start, end)
            .map_err(|error| CacheError::Fetch {
                source_name: self.source.name().to_string(),
                error,
            })?;

        let snapshot = CorpusSnapshot {
            date: now,
            articles,
        };
        self.write_file(&snapshot)?;

        info!(
            "Cached {} {} articles from {} to {}",
            snapshot.articles.len(),
            self.source.name(),
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        );

        Ok(snapshot)
    }

    /// A missing file is `None`; an unreadable one is logged and treated as missing
    fn read_file(&self) -> Result<Option<CorpusSnapshot>, CacheError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Io {
                    source,
                    path: self.path.clone(),
                })
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                warn!(
                    "Ignoring unreadable cache file {}: {}",
                    self.path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    fn write_file(&self, snapshot: &CorpusSnapshot) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(snapshot)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;

        let io_err = |source| CacheError::Io {
            source,
            path: self.path.clone(),
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let mut file = std::fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(&bytes).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::Source;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingSource {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    impl CatalogSource for CountingSource {
        fn fetch_window(
            &self,
            _start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<PaperRecord>, SourceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(SourceError::Transport("connection reset".into()));
            }
            Ok(vec![PaperRecord {
                id: format!("10.1101/2024.01.0{}.000001", call),
                title: "Enhancer grammar".to_string(),
                abstract_text: "Regulatory sequence models.".to_string(),
                authors: vec![],
                source: Source::Biorxiv,
                updated: end,
                pdf_url: String::new(),
            }])
        }

        fn name(&self) -> &str {
            "biorxiv"
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 9, 12, 0, 0).unwrap()
    }

    fn cache(temp: &TempDir, source: Arc<CountingSource>) -> CorpusCache {
        CorpusCache::new(
            source,
            temp.path().join("biorxiv_cache.json"),
            Duration::days(7),
            Duration::days(7),
        )
    }

    #[test]
    fn test_missing_fetches_and_persists() {
        let temp = TempDir::new().unwrap();
        let source = CountingSource::new(false);
        let cache = cache(&temp, source.clone());

        assert_eq!(cache.state_at(t0()).unwrap(), CacheState::Missing);
        let articles = cache.get_articles_at(t0()).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(cache.path()).unwrap()).unwrap();
        assert!(raw["date"].is_string());
        assert_eq!(raw["articles"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_fresh_until_max_age() {
        let temp = TempDir::new().unwrap();
        let source = CountingSource::new(false);
        let cache = cache(&temp, source.clone());

        cache.get_articles_at(t0()).unwrap();
        let almost = t0() + Duration::days(7) - Duration::seconds(1);
        cache.get_articles_at(almost).unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        assert_eq!(cache.state_at(t0() + Duration::days(7)).unwrap(), CacheState::Stale);
        let refreshed = cache.get_articles_at(t0() + Duration::days(7)).unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(refreshed[0].id, "10.1101/2024.01.02.000001");
    }

    #[test]
    fn test_snapshot_survives_restart() {
        let temp = TempDir::new().unwrap();
        let first = CountingSource::new(false);
        cache(&temp, first.clone()).get_articles_at(t0()).unwrap();

        let second = CountingSource::new(false);
        let reopened = cache(&temp, second.clone());
        let articles = reopened.get_articles_at(t0() + Duration::days(3)).unwrap();
        assert_eq!(articles[0].id, "10.1101/2024.01.01.000001");
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fetch_failure_propagates_instead_of_serving_stale() {
        let temp = TempDir::new().unwrap();
        cache(&temp, CountingSource::new(false))
            .get_articles_at(t0())
            .unwrap();

        let failing = cache(&temp, CountingSource::new(true));
        let result = failing.get_articles_at(t0() + Duration::days(8));
        assert!(matches!(result, Err(CacheError::Fetch { .. })));
    }

    #[test]
    fn test_corrupt_file_is_refetched() {
        let temp = TempDir::new().unwrap();
        let source = CountingSource::new(false);
        let cache = cache(&temp, source.clone());
        std::fs::write(cache.path(), b"{not json").unwrap();

        assert_eq!(cache.get_articles_at(t0()).unwrap().len(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
