/// Integration tests for the cached catalog and keyword candidates
use chrono::{DateTime, Duration, TimeZone, Utc};
use correspondent::cache::{CacheError, CacheState, CorpusCache, CorpusSnapshot};
use correspondent::paper::{PaperRecord, RelevanceSignal, Source};
use correspondent::selection::{CandidateProvider, KeywordCandidates, SelectionError};
use correspondent::sources::{CatalogSource, SourceError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Serves a fixed catalog, counting fetches and recording requested windows
struct CountingSource {
    catalog: Vec<PaperRecord>,
    fetches: AtomicUsize,
    windows: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    failing: AtomicBool,
}

impl CountingSource {
    fn new(catalog: Vec<PaperRecord>) -> Arc<Self> {
        Arc::new(Self {
            catalog,
            fetches: AtomicUsize::new(0),
            windows: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        })
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl CatalogSource for CountingSource {
    fn fetch_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PaperRecord>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.windows.lock().unwrap().push((start, end));
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Status {
                status: 503,
                url: "https://api.biorxiv.org/details/biorxiv".to_string(),
            });
        }
        Ok(self.catalog.clone())
    }

    fn name(&self) -> &str {
        "biorxiv"
    }
}

fn record(id: &str, title: &str, abstract_text: &str) -> PaperRecord {
    PaperRecord {
        id: id.to_string(),
        title: title.to_string(),
        abstract_text: abstract_text.to_string(),
        authors: Vec::new(),
        source: Source::Biorxiv,
        updated: Utc.with_ymd_and_hms(2024, 10, 7, 0, 0, 0).unwrap(),
        pdf_url: format!("https://www.biorxiv.org/content/{}v1.full.pdf", id),
    }
}

fn catalog() -> Vec<PaperRecord> {
    vec![
        record(
            "10.1101/2024.10.01.000001",
            "Enhancer RNAs in aging tissue",
            "Transcribed enhancers change with senescence.",
        ),
        record(
            "10.1101/2024.10.01.000002",
            "Root microbiome assembly",
            "Soil bacteria colonise roots.",
        ),
        record(
            "10.1101/2024.10.01.000003",
            "Enhancer grammar",
            "Deep models of regulatory sequence.",
        ),
        record(
            "10.1101/2024.10.01.000004",
            "Senescence clocks",
            "Aging biomarkers from methylation.",
        ),
    ]
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 9, 6, 0, 0).unwrap()
}

fn cache_at(temp: &TempDir, source: Arc<CountingSource>) -> CorpusCache {
    CorpusCache::new(
        source,
        temp.path().join("cache").join("biorxiv_cache.json"),
        Duration::days(7),
        Duration::days(7),
    )
}

#[test]
fn test_snapshot_is_fresh_until_seven_days() {
    let temp = TempDir::new().unwrap();
    let source = CountingSource::new(catalog());
    let cache = cache_at(&temp, source.clone());

    assert_eq!(cache.get_articles_at(t0()).unwrap().len(), 4);
    assert_eq!(source.fetches(), 1);

    for offset in [Duration::hours(1), Duration::days(6), Duration::days(7) - Duration::milliseconds(1)] {
        assert_eq!(cache.state_at(t0() + offset).unwrap(), CacheState::Fresh);
        cache.get_articles_at(t0() + offset).unwrap();
    }
    assert_eq!(source.fetches(), 1);

    cache.get_articles_at(t0() + Duration::days(7)).unwrap();
    assert_eq!(source.fetches(), 2);
}

#[test]
fn test_refresh_window_ends_yesterday() {
    let temp = TempDir::new().unwrap();
    let source = CountingSource::new(catalog());
    cache_at(&temp, source.clone()).get_articles_at(t0()).unwrap();

    let windows = source.windows.lock().unwrap().clone();
    let (start, end) = windows[0];
    assert_eq!(end, t0() - Duration::days(1));
    assert_eq!(start, t0() - Duration::days(8));
}

#[test]
fn test_persisted_snapshot_format() {
    let temp = TempDir::new().unwrap();
    let cache = cache_at(&temp, CountingSource::new(catalog()));
    cache.get_articles_at(t0()).unwrap();

    let raw = std::fs::read_to_string(cache.path()).unwrap();
    let snapshot: CorpusSnapshot = serde_json::from_str(&raw).unwrap();
    assert_eq!(snapshot.date, t0());
    assert_eq!(snapshot.articles, catalog());

    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(
        value["articles"][0]["abstract"],
        "Transcribed enhancers change with senescence."
    );
}

#[test]
fn test_stale_refresh_failure_is_fatal() {
    let temp = TempDir::new().unwrap();
    let source = CountingSource::new(catalog());
    let cache = cache_at(&temp, source.clone());
    cache.get_articles_at(t0()).unwrap();

    source.failing.store(true, Ordering::SeqCst);
    let result = cache.get_articles_at(t0() + Duration::days(10));
    assert!(matches!(result, Err(CacheError::Fetch { .. })));

    // Still fresh data is served without touching the source
    source.failing.store(false, Ordering::SeqCst);
    let fetches = source.fetches();
    cache.get_articles_at(t0() + Duration::days(1)).unwrap();
    assert_eq!(source.fetches(), fetches);
}

#[test]
fn test_force_refresh_replaces_snapshot() {
    let temp = TempDir::new().unwrap();
    let source = CountingSource::new(catalog());
    let cache = cache_at(&temp, source.clone());

    cache.get_articles_at(t0()).unwrap();
    let snapshot = cache.force_refresh().unwrap();
    assert_eq!(source.fetches(), 2);
    assert_eq!(snapshot.articles.len(), 4);
}

#[test]
fn test_keyword_candidates_rank_by_satisfied_groups() {
    let temp = TempDir::new().unwrap();
    let source = CountingSource::new(catalog());
    let cache = Arc::new(cache_at(&temp, source));
    // Materialise the snapshot so the provider's wall clock sees fresh data
    cache.get_articles().unwrap();

    let provider = KeywordCandidates::new(cache);
    let candidates = provider
        .candidates("enhancer AND (aging OR senescence)", 10)
        .unwrap();

    let ids: Vec<&str> = candidates.iter().map(|c| c.id()).collect();
    assert_eq!(
        ids,
        vec![
            "10.1101/2024.10.01.000001",
            "10.1101/2024.10.01.000003",
            "10.1101/2024.10.01.000004",
        ]
    );
    assert_eq!(candidates[0].signal, RelevanceSignal::MatchCount(2));
    assert_eq!(candidates[1].signal, RelevanceSignal::MatchCount(1));
    assert!(candidates[0].abstract_text.is_some());

    let top_one = provider.candidates("enhancer", 1).unwrap();
    assert_eq!(top_one.len(), 1);
}

#[test]
fn test_keyword_candidates_reject_empty_query() {
    let temp = TempDir::new().unwrap();
    let provider = KeywordCandidates::new(Arc::new(cache_at(&temp, CountingSource::new(catalog()))));
    assert!(matches!(
        provider.candidates("( )", 10),
        Err(SelectionError::EmptyInterest)
    ));
}
