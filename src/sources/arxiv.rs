//! arXiv query API returning Atom feeds

use super::{get_text, CatalogSource, SourceError};
use crate::paper::{PaperRecord, Source};
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::blocking::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The API refuses pages larger than this
pub const MAX_PAGE_SIZE: usize = 100;

/// Paginated search client for arXiv
pub struct ArxivSource {
    client: Client,
    base_url: String,
    page_size: usize,
    request_delay: Duration,
    retry: RetryPolicy,
    search_query: Option<String>,
    max_results: Option<usize>,
}

impl ArxivSource {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        page_size: usize,
        request_delay: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            request_delay,
            retry,
            search_query: None,
            max_results: None,
        }
    }

    /// Restrict results with a boolean search string, e.g. `all:"genomics" AND cat:q-bio.GN`
    pub fn with_search_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.search_query = (!query.trim().is_empty()).then_some(query);
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// The `search_query` parameter for a window
    pub fn window_query(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        let window = format!(
            "lastUpdatedDate:[{}0000 TO {}2359]",
            start.format("%Y%m%d"),
            end.format("%Y%m%d")
        );
        match &self.search_query {
            Some(query) => format!("({}) AND {}", query, window),
            None => window,
        }
    }

    fn fetch_page(&self, query: &str, offset: usize) -> Result<Vec<PaperRecord>, SourceError> {
        let params = [
            ("search_query", query.to_string()),
            ("start", offset.to_string()),
            ("max_results", self.page_size.to_string()),
            ("sortBy", "lastUpdatedDate".to_string()),
            ("sortOrder", "descending".to_string()),
        ];
        debug!(
            "Fetching arXiv results {} to {}",
            offset,
            offset + self.page_size - 1
        );

        let body = self.retry.run(
            |_| get_text(&self.client, &self.base_url, &params),
            SourceError::is_transient,
        )?;
        parse_feed(&body)
    }
}

impl CatalogSource for ArxivSource {
    fn fetch_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PaperRecord>, SourceError> {
        let query = self.window_query(start, end);
        let mut records = Vec::new();
        let mut offset = 0;

        loop {
            let page = self.fetch_page(&query, offset)?;
            let page_len = page.len();

            records.extend(page);

            if let Some(max) = self.max_results {
                if records.len() >= max {
                    records.truncate(max);
                    break;
                }
            }
            if page_len < self.page_size {
                break;
            }

            offset += self.page_size;
            std::thread::sleep(self.request_delay);
        }

        info!("Fetched {} arXiv records", records.len());
        Ok(records)
    }

    fn name(&self) -> &str {
        "arxiv"
    }
}

#[derive(Default)]
struct EntryAccum {
    id: String,
    title: String,
    summary: String,
    updated: String,
    published: String,
    authors: Vec<String>,
    pdf_url: Option<String>,
}

impl EntryAccum {
    fn push_text(&mut self, tag: &str, text: &str, in_author: bool) {
        match tag {
            "id" => self.id.push_str(text),
            "title" => self.title.push_str(text),
            "summary" => self.summary.push_str(text),
            "updated" => self.updated.push_str(text),
            "published" => self.published.push_str(text),
            "name" if in_author => {
                if let Some(last) = self.authors.last_mut() {
                    last.push_str(text);
                }
            }
            _ => {}
        }
    }

    fn into_record(self) -> Result<Option<PaperRecord>, SourceError> {
        if self.id.contains("/api/errors") {
            return Err(SourceError::Parse(format!(
                "arXiv rejected the query: {}",
                collapse_whitespace(&self.summary)
            )));
        }

        let id = extract_arxiv_id(self.id.trim());
        if id.is_empty() {
            warn!("Skipping arXiv entry without id");
            return Ok(None);
        }

        let timestamp = if self.updated.trim().is_empty() {
            self.published.trim()
        } else {
            self.updated.trim()
        };
        let updated = match DateTime::parse_from_rfc3339(timestamp) {
            Ok(dt) => dt.with_timezone(&Utc),
            Err(e) => {
                warn!("Skipping arXiv entry {} with bad timestamp {:?}: {}", id, timestamp, e);
                return Ok(None);
            }
        };

        let pdf_url = self
            .pdf_url
            .unwrap_or_else(|| format!("https://arxiv.org/pdf/{}.pdf", id));

        Ok(Some(PaperRecord {
            title: collapse_whitespace(&self.title),
            abstract_text: collapse_whitespace(&self.summary),
            authors: self
                .authors
                .iter()
                .map(|a| collapse_whitespace(a))
                .filter(|a| !a.is_empty())
                .collect(),
            source: Source::Arxiv,
            updated,
            pdf_url,
            id,
        }))
    }
}

/// Parse an arXiv Atom feed into records
///
/// Entries without a usable id or timestamp are skipped. An API error entry
/// becomes [`SourceError::Parse`].
pub fn parse_feed(xml: &str) -> Result<Vec<PaperRecord>, SourceError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut accum: Option<EntryAccum> = None;
    let mut current_tag = String::new();
    let mut in_author = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| SourceError::Parse(format!("at byte {}: {}", reader.buffer_position(), e)))?;

        match event {
            Event::Start(e) => {
                let tag = local_name(e.local_name().as_ref());
                if tag == "entry" {
                    accum = Some(EntryAccum::default());
                } else if let Some(entry) = accum.as_mut() {
                    match tag.as_str() {
                        "author" => {
                            in_author = true;
                            entry.authors.push(String::new());
                        }
                        "link" => take_pdf_link(&e, entry),
                        _ => current_tag = tag.clone(),
                    }
                }
            }
            Event::Empty(e) => {
                if let Some(entry) = accum.as_mut() {
                    if local_name(e.local_name().as_ref()) == "link" {
                        take_pdf_link(&e, entry);
                    }
                }
            }
            Event::Text(e) => {
                if let Some(entry) = accum.as_mut() {
                    let text = e
                        .unescape()
                        .map_err(|err| SourceError::Parse(err.to_string()))?;
                    entry.push_text(&current_tag, &text, in_author);
                }
            }
            Event::CData(e) => {
                if let Some(entry) = accum.as_mut() {
                    let text = String::from_utf8_lossy(&e);
                    entry.push_text(&current_tag, &text, in_author);
                }
            }
            Event::End(e) => match local_name(e.local_name().as_ref()).as_str() {
                "entry" => {
                    if let Some(entry) = accum.take() {
                        if let Some(record) = entry.into_record()? {
                            records.push(record);
                        }
                    }
                    current_tag.clear();
                    in_author = false;
                }
                "author" => in_author = false,
                _ => current_tag.clear(),
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(records)
}

fn local_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

fn take_pdf_link(e: &BytesStart<'_>, entry: &mut EntryAccum) {
    let mut href = None;
    let mut is_pdf = false;

    for attr in e.attributes().flatten() {
        let value = String::from_utf8_lossy(&attr.value).into_owned();
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(value),
            b"type" if value == "application/pdf" => is_pdf = true,
            _ => {}
        }
    }

    if is_pdf {
        if let Some(href) = href {
            entry.pdf_url = Some(href);
        }
    }
}

/// `http://arxiv.org/abs/2401.01234v2` -> `2401.01234`, `.../abs/hep-th/9901001v1` -> `hep-th/9901001`
fn extract_arxiv_id(url: &str) -> String {
    let id = url.split("/abs/").nth(1).unwrap_or(url);
    match id.rfind('v') {
        Some(idx) if idx + 1 < id.len() && id[idx + 1..].chars().all(|c| c.is_ascii_digit()) => {
            id[..idx].to_string()
        }
        _ => id.to_string(),
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
