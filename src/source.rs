//! The dictionary source seam and a deterministic in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rapidfuzz::distance::levenshtein;
use tokio::sync::Semaphore;

use crate::error::{LookupError, Result};
use crate::text::fold;

pub const DEFAULT_PAGE_BASE: &str = "https://en.wiktionary.org/wiki/";

/// Characters left as-is in page titles.
const TITLE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'-')
    .remove(b'.')
    .remove(b'~');

/// A rendered page returned by the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub title: String,
    pub html: String,
}

/// Read-only structured-document service.
#[async_trait]
pub trait DictionarySource: Send + Sync {
    /// Looks a page up by exact title. `Ok(None)` is a clean miss.
    async fn fetch_document(&self, title: &str) -> Result<Option<SourceDocument>>;

    /// Ranked alternative titles for `query`, best first.
    async fn suggest(&self, query: &str, limit: usize) -> Result<Vec<String>>;

    /// Human-readable page for `title`, optionally pointing at a section.
    fn page_url(&self, title: &str, section: Option<&str>) -> String {
        page_url(DEFAULT_PAGE_BASE, title, section)
    }
}

pub(crate) fn page_url(base: &str, title: &str, section: Option<&str>) -> String {
    let mut url = format!(
        "{base}{}",
        utf8_percent_encode(&title.replace(' ', "_"), TITLE)
    );
    if let Some(section) = section {
        url.push('#');
        url.push_str(&section.replace(' ', "_"));
    }
    url
}

/// Minimum similarity for a title to be suggested by [`MemorySource`].
const SUGGESTION_THRESHOLD: f64 = 0.5;

/// In-memory source keyed by exact title.
///
/// Clones share state, so a test can keep a handle while the pipeline owns
/// another. Individual titles can be held behind a gate or made to fail.
#[derive(Clone, Default)]
pub struct MemorySource {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    documents: RwLock<HashMap<String, String>>,
    failures: RwLock<HashMap<String, LookupError>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    fetches: Mutex<Vec<String>>,
    searches: Mutex<Vec<String>>,
}

/// Holds fetches of one title until opened.
#[derive(Clone)]
pub struct SourceGate {
    semaphore: Arc<Semaphore>,
}

impl SourceGate {
    pub fn open(&self) {
        self.semaphore.close();
    }
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, title: &str, html: &str) -> Self {
        self.insert(title, html);
        self
    }

    pub fn insert(&self, title: &str, html: &str) {
        self.inner
            .documents
            .write()
            .insert(title.to_string(), html.to_string());
    }

    /// Makes every fetch of `title` fail with `error`.
    pub fn fail(&self, title: &str, error: LookupError) {
        self.inner.failures.write().insert(title.to_string(), error);
    }

    /// Makes fetches of `title` wait until the returned gate is opened.
    pub fn hold(&self, title: &str) -> SourceGate {
        let semaphore = Arc::new(Semaphore::new(0));
        self.inner
            .gates
            .lock()
            .insert(title.to_string(), semaphore.clone());
        SourceGate { semaphore }
    }

    /// Titles fetched so far, in request order.
    pub fn fetches(&self) -> Vec<String> {
        self.inner.fetches.lock().clone()
    }

    pub fn fetch_count(&self, title: &str) -> usize {
        self.inner
            .fetches
            .lock()
            .iter()
            .filter(|t| t.as_str() == title)
            .count()
    }

    pub fn searches(&self) -> Vec<String> {
        self.inner.searches.lock().clone()
    }
}

#[async_trait]
impl DictionarySource for MemorySource {
    async fn fetch_document(&self, title: &str) -> Result<Option<SourceDocument>> {
        self.inner.fetches.lock().push(title.to_string());
        let gate = self.inner.gates.lock().get(title).cloned();
        if let Some(gate) = gate {
            // Resolves with an error once the gate is closed, which is the signal.
            let _ = gate.acquire().await;
        }
        if let Some(error) = self.inner.failures.read().get(title) {
            return Err(error.clone());
        }
        Ok(self
            .inner
            .documents
            .read()
            .get(title)
            .map(|html| SourceDocument {
                title: title.to_string(),
                html: html.clone(),
            }))
    }

    async fn suggest(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        self.inner.searches.lock().push(query.to_string());
        let needle = fold(query);
        let mut scored: Vec<(f64, String)> = self
            .inner
            .documents
            .read()
            .keys()
            .map(|title| {
                let score =
                    levenshtein::normalized_similarity(needle.chars(), fold(title).chars());
                (score, title.clone())
            })
            .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, title)| title)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fetches_by_exact_title() {
        let source = MemorySource::new().with_document("кот", "<p>cat</p>");
        let doc = source.fetch_document("кот").await.unwrap().unwrap();
        assert_eq!(doc.html, "<p>cat</p>");
        assert!(source.fetch_document("Кот").await.unwrap().is_none());
        assert_eq!(source.fetches(), vec!["кот", "Кот"]);
        assert_eq!(source.fetch_count("кот"), 1);
    }

    #[tokio::test]
    async fn injected_failures_surface() {
        let source = MemorySource::new().with_document("dog", "<p>dog</p>");
        source.fail("dog", LookupError::Timeout);
        assert_eq!(
            source.fetch_document("dog").await,
            Err(LookupError::Timeout)
        );
    }

    #[tokio::test]
    async fn suggestions_rank_by_similarity() {
        let source = MemorySource::new()
            .with_document("house", "")
            .with_document("horse", "")
            .with_document("mouse", "")
            .with_document("zebra", "");
        let hits = source.suggest("housse", 2).await.unwrap();
        assert_eq!(hits[0], "house");
        assert_eq!(hits.len(), 2);
        assert!(!hits.contains(&"zebra".to_string()));
        assert_eq!(source.searches(), vec!["housse"]);
    }

    #[tokio::test]
    async fn gate_holds_until_opened() {
        let source = MemorySource::new().with_document("slow", "<p>slow</p>");
        let gate = source.hold("slow");
        let pending = {
            let source = source.clone();
            tokio::spawn(async move { source.fetch_document("slow").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());
        gate.open();
        let doc = pending.await.unwrap().unwrap();
        assert!(doc.is_some());
    }

    #[test]
    fn page_urls_are_encoded() {
        assert_eq!(
            page_url(DEFAULT_PAGE_BASE, "говорить", Some("Russian")),
            "https://en.wiktionary.org/wiki/%D0%B3%D0%BE%D0%B2%D0%BE%D1%80%D0%B8%D1%82%D1%8C#Russian"
        );
        assert_eq!(
            page_url(DEFAULT_PAGE_BASE, "ice cream", Some("Ancient Greek")),
            "https://en.wiktionary.org/wiki/ice_cream#Ancient_Greek"
        );
    }
}
