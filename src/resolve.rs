//! The lexical resolution pipeline: from a surface form to a dictionary entry.
//!
//! Resolution runs a cascade of title guesses against the source and stops at
//! the first page that has a usable section for the target language. From
//! there it follows "form of" cross-references for a bounded number of hops.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{LookupError, Result};
use crate::extract::{Extraction, extract};
use crate::language::Language;
use crate::morph::generate_candidates;
use crate::source::DictionarySource;
use crate::store::DEFAULT_LANGUAGE;
use crate::text::{capitalize, fold, lookup_key};

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub language: Language,
    /// Budget for a single source request.
    pub request_timeout: Duration,
    /// Pages in a cross-reference chain, the surface page included.
    pub max_depth: usize,
    pub suggestion_limit: usize,
    pub show_grammar: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            language: Language::parse(DEFAULT_LANGUAGE),
            request_timeout: Duration::from_secs(6),
            max_depth: 2,
            suggestion_limit: 5,
            show_grammar: true,
        }
    }
}

/// A fully resolved lookup. Immutable once cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEntry {
    /// Text as looked up.
    pub surface_word: String,
    /// Title of the page that matched, after casing or fuzzy correction.
    pub actual_word: String,
    /// Headword at the end of the cross-reference chain.
    pub lemma: String,
    /// Dictionary section the entry was read from.
    pub section: String,
    pub part_of_speech: Option<String>,
    pub primary_definition_html: String,
    /// Gloss of the surface page when the lemma is a different page.
    pub secondary_definition_html: Option<String>,
    pub grammar_tables_html: String,
    /// Plain-text first gloss, used for saved words.
    pub translation: String,
    /// Page titles visited, surface page first.
    pub chain: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(ResolvedEntry),
    /// A page exists but only in the metalanguage; nothing to show in auto mode.
    Suppressed,
}

/// Outcome of one cascade step.
#[derive(Debug)]
pub enum Step<T> {
    Found(T),
    Miss,
    Failure(LookupError),
}

impl<T> Step<T> {
    /// Combines two exhausted outcomes: any clean miss makes the whole a miss,
    /// otherwise the later failure wins.
    fn merge(self, later: Step<T>) -> Step<T> {
        match (self, later) {
            (Step::Found(found), _) | (_, Step::Found(found)) => Step::Found(found),
            (Step::Miss, _) | (_, Step::Miss) => Step::Miss,
            (Step::Failure(_), Step::Failure(err)) => Step::Failure(err),
        }
    }
}

/// Tries `attempt` on each input in order and stops at the first `Found`.
///
/// When nothing is found the result is `Miss` if any step missed cleanly, or
/// the last failure if every step failed. No inputs at all is a `Miss`.
pub async fn first_found<I, T, F, Fut>(inputs: I, mut attempt: F) -> Step<T>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Step<T>>,
{
    let mut missed = false;
    let mut last_failure = None;
    for input in inputs {
        match attempt(input).await {
            Step::Found(found) => return Step::Found(found),
            Step::Miss => missed = true,
            Step::Failure(err) => last_failure = Some(err),
        }
    }
    match last_failure {
        Some(err) if !missed => Step::Failure(err),
        _ => Step::Miss,
    }
}

/// A fetched page with a usable section.
#[derive(Debug)]
struct Page {
    title: String,
    extraction: Extraction,
}

pub struct Resolver {
    source: Arc<dyn DictionarySource>,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(source: Arc<dyn DictionarySource>, config: ResolverConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Link to the source page for an entry's lemma.
    pub fn source_url(&self, entry: &ResolvedEntry) -> String {
        self.source.page_url(&entry.lemma, Some(&entry.section))
    }

    pub async fn resolve(&self, surface: &str) -> Result<Resolution> {
        self.resolve_in(surface, &self.config.language).await
    }

    pub async fn resolve_in(&self, surface: &str, language: &Language) -> Result<Resolution> {
        let folded = fold(surface);
        if folded.is_empty() {
            return Err(LookupError::not_found(surface));
        }
        let suppressed = AtomicBool::new(false);

        let mut titles: Vec<String> = Vec::new();
        for title in [folded.clone(), capitalize(&folded), lookup_key(surface)]
            .into_iter()
            .chain(generate_candidates(&folded, language))
        {
            if !titles.contains(&title) {
                titles.push(title);
            }
        }
        let tried: HashSet<String> = titles.iter().cloned().collect();

        let direct = first_found(titles, |title| {
            self.try_title(title, surface, language, &suppressed)
        })
        .await;
        let outcome = match direct {
            Step::Found(page) => Step::Found(page),
            exhausted => match self
                .try_suggestions(&folded, &tried, surface, language, &suppressed)
                .await
            {
                Some(step) => exhausted.merge(step),
                None => exhausted,
            },
        };

        let first = match outcome {
            Step::Found(page) => page,
            _ if suppressed.load(Ordering::Relaxed) => {
                debug!(word = surface, "only metalanguage sections, suppressing");
                return Ok(Resolution::Suppressed);
            }
            Step::Failure(err) => return Err(err),
            Step::Miss => return Err(LookupError::not_found(surface)),
        };

        let chain = self.follow_cross_references(first, &folded, surface, language).await;
        let entry = self.build_entry(surface, chain);
        info!(word = surface, lemma = %entry.lemma, hops = entry.chain.len() - 1, "resolved");
        Ok(Resolution::Found(entry))
    }

    async fn try_suggestions(
        &self,
        folded: &str,
        tried: &HashSet<String>,
        surface: &str,
        language: &Language,
        suppressed: &AtomicBool,
    ) -> Option<Step<Page>> {
        let suggestions = match timeout(
            self.config.request_timeout,
            self.source.suggest(folded, self.config.suggestion_limit),
        )
        .await
        {
            Ok(Ok(titles)) => titles,
            Ok(Err(err)) => {
                warn!(word = surface, error = %err, "suggestion request failed");
                return Some(Step::Failure(err));
            }
            Err(elapsed) => {
                warn!(word = surface, "suggestion request timed out");
                return Some(Step::Failure(elapsed.into()));
            }
        };
        let fresh: Vec<String> = suggestions
            .into_iter()
            .filter(|title| !tried.contains(title))
            .collect();
        if fresh.is_empty() {
            return None;
        }
        debug!(word = surface, count = fresh.len(), "trying suggestions");
        Some(first_found(fresh, |title| self.try_title(title, surface, language, suppressed)).await)
    }

    /// Extends the chain from `first` while its last page points at a new
    /// headword and the depth budget allows.
    async fn follow_cross_references(
        &self,
        first: Page,
        folded: &str,
        surface: &str,
        language: &Language,
    ) -> Vec<Page> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(folded.to_string());
        visited.insert(fold(&first.title));
        let mut chain = vec![first];
        let unused = AtomicBool::new(false);

        while chain.len() < self.config.max_depth.max(1) {
            let Some(next) = chain.last().and_then(|page| page.extraction.cross_reference.clone())
            else {
                break;
            };
            if !visited.insert(next.clone()) {
                debug!(word = surface, lemma = %next, "cross-reference loops back, stopping");
                break;
            }
            let mut variants = vec![next.clone()];
            let capitalized = capitalize(&next);
            if capitalized != next {
                variants.push(capitalized);
            }
            match first_found(variants, |title| self.try_title(title, surface, language, &unused)).await {
                Step::Found(page) => {
                    visited.insert(fold(&page.title));
                    chain.push(page);
                }
                _ => {
                    debug!(word = surface, lemma = %next, "cross-reference did not resolve");
                    break;
                }
            }
        }
        chain
    }

    async fn try_title(
        &self,
        title: String,
        surface: &str,
        language: &Language,
        suppressed: &AtomicBool,
    ) -> Step<Page> {
        debug!(word = surface, title = %title, "cascade step");
        let document = match timeout(self.config.request_timeout, self.source.fetch_document(&title)).await {
            Ok(Ok(Some(document))) => document,
            Ok(Ok(None)) => return Step::Miss,
            Ok(Err(err)) => {
                warn!(title = %title, error = %err, "source request failed");
                return Step::Failure(err);
            }
            Err(elapsed) => {
                warn!(title = %title, "source request timed out");
                return Step::Failure(elapsed.into());
            }
        };
        let extraction = extract(&document.html, language, surface);
        if !extraction.is_usable() {
            if extraction.only_metalanguage {
                suppressed.store(true, Ordering::Relaxed);
            }
            return Step::Miss;
        }
        Step::Found(Page {
            title: document.title,
            extraction,
        })
    }

    fn build_entry(&self, surface: &str, chain: Vec<Page>) -> ResolvedEntry {
        let first = &chain[0];
        let last = &chain[chain.len() - 1];
        let deepest_with_definitions = chain
            .iter()
            .rev()
            .find(|page| !page.extraction.definitions.is_empty())
            .unwrap_or(first);

        // Surface tables first, else the deepest page that has any.
        let tables_page = if first.extraction.tables.is_empty() {
            chain
                .iter()
                .rev()
                .find(|page| !page.extraction.tables.is_empty())
        } else {
            Some(first)
        };
        let grammar_tables_html = match tables_page {
            Some(page) if self.config.show_grammar => page.extraction.grammar_tables_html(),
            _ => String::new(),
        };

        let secondary_definition_html = (chain.len() > 1)
            .then(|| first.extraction.definitions_html())
            .filter(|html| !html.is_empty());

        ResolvedEntry {
            surface_word: surface.to_string(),
            actual_word: first.title.clone(),
            lemma: last.title.clone(),
            section: last
                .extraction
                .section
                .clone()
                .unwrap_or_default(),
            part_of_speech: last
                .extraction
                .part_of_speech
                .clone()
                .or_else(|| first.extraction.part_of_speech.clone()),
            primary_definition_html: deepest_with_definitions.extraction.definitions_html(),
            secondary_definition_html,
            grammar_tables_html,
            translation: deepest_with_definitions
                .extraction
                .first_gloss()
                .unwrap_or_default(),
            chain: chain.iter().map(|page| page.title.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn ru_page(body: &str) -> String {
        format!(r#"<div class="mw-heading mw-heading2"><h2 id="Russian">Russian</h2></div>{body}"#)
    }

    fn resolver(source: &MemorySource, config: ResolverConfig) -> Resolver {
        Resolver::new(Arc::new(source.clone()), config)
    }

    fn found(resolution: Resolution) -> ResolvedEntry {
        match resolution {
            Resolution::Found(entry) => entry,
            Resolution::Suppressed => panic!("unexpected suppression"),
        }
    }

    #[tokio::test]
    async fn first_found_short_circuits() {
        let mut seen = Vec::new();
        let step = first_found([1, 2, 3], |n| {
            seen.push(n);
            async move { if n == 2 { Step::Found(n * 10) } else { Step::Miss } }
        })
        .await;
        assert!(matches!(step, Step::Found(20)));
        assert_eq!(seen, vec![1, 2]);
    }

    #[tokio::test]
    async fn first_found_reports_failure_only_without_misses() {
        let all_failed: Step<()> = first_found([1, 2], |_| async {
            Step::Failure(LookupError::Timeout)
        })
        .await;
        assert!(matches!(all_failed, Step::Failure(LookupError::Timeout)));

        let mixed: Step<()> = first_found([1, 2], |n| async move {
            if n == 1 { Step::Miss } else { Step::Failure(LookupError::Timeout) }
        })
        .await;
        assert!(matches!(mixed, Step::Miss));

        let empty: Step<()> = first_found(Vec::<u8>::new(), |_| async { Step::Miss }).await;
        assert!(matches!(empty, Step::Miss));
    }

    #[tokio::test]
    async fn morphological_candidate_resolves_headword() {
        let source = MemorySource::new().with_document(
            "говорящий",
            &ru_page(r#"<h3>Adjective</h3><ol><li>talking, speaking</li></ol>"#),
        );
        let entry = found(
            resolver(&source, ResolverConfig::default())
                .resolve("говорящего")
                .await
                .unwrap(),
        );
        assert_eq!(entry.lemma, "говорящий");
        assert_eq!(entry.actual_word, "говорящий");
        assert_eq!(entry.chain, vec!["говорящий"]);
        assert!(entry.primary_definition_html.contains("talking"));
        assert_eq!(entry.secondary_definition_html, None);
        assert_eq!(entry.part_of_speech.as_deref(), Some("Adjective"));
        assert_eq!(
            &source.fetches()[..3],
            &["говорящего", "Говорящего", "говорящий"]
        );
        assert!(source.searches().is_empty());
    }

    #[tokio::test]
    async fn abugida_titles_are_fetched_intact() {
        let source = MemorySource::new().with_document(
            "हिन्दी",
            r#"<h2 id="Hindi">Hindi</h2><ol><li>the Hindi language</li></ol>"#,
        );
        let config = ResolverConfig {
            language: Language::parse("hi"),
            ..ResolverConfig::default()
        };
        let entry = found(resolver(&source, config).resolve("हिन्दी").await.unwrap());
        assert_eq!(entry.actual_word, "हिन्दी");
        assert_eq!(source.fetches(), vec!["हिन्दी"]);
        assert!(source.searches().is_empty());
    }

    #[tokio::test]
    async fn capitalized_variant_is_tried_second() {
        let source = MemorySource::new().with_document(
            "Haus",
            r#"<h2 id="German">German</h2><ol><li>house</li></ol>"#,
        );
        let config = ResolverConfig {
            language: Language::parse("de"),
            ..ResolverConfig::default()
        };
        let entry = found(resolver(&source, config).resolve("haus").await.unwrap());
        assert_eq!(entry.actual_word, "Haus");
        assert_eq!(entry.translation, "house");
        assert_eq!(source.fetches(), vec!["haus", "Haus"]);
    }

    #[tokio::test]
    async fn form_of_entries_chase_the_lemma() {
        let source = MemorySource::new()
            .with_document(
                "кошки",
                &ru_page(
                    r#"<ol><li>genitive singular of <span class="form-of-definition-link"><a href="/wiki/кошка">ко́шка</a></span></li></ol>"#,
                ),
            )
            .with_document(
                "кошка",
                &ru_page(
                    r#"<h3>Noun</h3><ol><li>cat</li></ol><table><tr><td>ко́шка</td><td>ко́шки</td></tr></table>"#,
                ),
            );
        let entry = found(
            resolver(&source, ResolverConfig::default())
                .resolve("Ко\u{301}шки")
                .await
                .unwrap(),
        );
        assert_eq!(entry.lemma, "кошка");
        assert_eq!(entry.actual_word, "кошки");
        assert_eq!(entry.chain, vec!["кошки", "кошка"]);
        assert_eq!(entry.translation, "cat");
        assert!(entry.primary_definition_html.contains("cat"));
        assert!(entry
            .secondary_definition_html
            .as_deref()
            .is_some_and(|html| html.contains("genitive singular")));
        // Tables come from the lemma, highlighting the surface form.
        assert!(entry
            .grammar_tables_html
            .contains("<td class=\"rl-highlight-form\">ко\u{301}шки</td>"));
    }

    #[tokio::test]
    async fn cross_reference_cycles_terminate() {
        let source = MemorySource::new()
            .with_document("альфа", &ru_page("<ol><li>form of бета</li></ol>"))
            .with_document("бета", &ru_page("<ol><li>form of альфа</li></ol>"));
        let config = ResolverConfig {
            max_depth: 10,
            ..ResolverConfig::default()
        };
        let entry = found(resolver(&source, config).resolve("альфа").await.unwrap());
        assert_eq!(entry.chain, vec!["альфа", "бета"]);
        assert_eq!(source.fetch_count("альфа"), 1);
        assert!(entry
            .secondary_definition_html
            .as_deref()
            .is_some_and(|html| html.contains("form of бета")));
    }

    #[tokio::test]
    async fn depth_limit_stops_the_chain() {
        let source = MemorySource::new()
            .with_document("альфа", &ru_page("<ol><li>form of бета</li></ol>"))
            .with_document("бета", &ru_page("<ol><li>form of гамма</li></ol>"))
            .with_document("гамма", &ru_page("<ol><li>letter</li></ol>"));
        let entry = found(
            resolver(&source, ResolverConfig::default())
                .resolve("альфа")
                .await
                .unwrap(),
        );
        assert_eq!(entry.chain, vec!["альфа", "бета"]);
        assert_eq!(source.fetch_count("гамма"), 0);

        let single = ResolverConfig {
            max_depth: 1,
            ..ResolverConfig::default()
        };
        let entry = found(resolver(&source, single).resolve("альфа").await.unwrap());
        assert_eq!(entry.lemma, "альфа");
        assert_eq!(entry.secondary_definition_html, None);
    }

    #[tokio::test]
    async fn fuzzy_suggestions_are_the_last_resort() {
        let source = MemorySource::new().with_document("привет", &ru_page("<ol><li>hi</li></ol>"));
        let entry = found(
            resolver(&source, ResolverConfig::default())
                .resolve("привед")
                .await
                .unwrap(),
        );
        assert_eq!(entry.actual_word, "привет");
        assert_eq!(source.searches(), vec!["привед"]);
    }

    #[tokio::test]
    async fn timeouts_count_as_a_failed_step() {
        let source = MemorySource::new()
            .with_document("кот", &ru_page("<ol><li>tomcat</li></ol>"))
            .with_document("Кот", &ru_page("<ol><li>Kot, a surname</li></ol>"));
        let _gate = source.hold("кот");
        let config = ResolverConfig {
            request_timeout: Duration::from_millis(30),
            ..ResolverConfig::default()
        };
        let entry = found(resolver(&source, config).resolve("кот").await.unwrap());
        assert_eq!(entry.actual_word, "Кот");
    }

    #[tokio::test]
    async fn exhausted_cascade_is_not_found() {
        let source = MemorySource::new();
        let err = resolver(&source, ResolverConfig::default())
            .resolve("ничего")
            .await
            .unwrap_err();
        assert_eq!(err, LookupError::not_found("ничего"));
    }

    #[tokio::test]
    async fn all_transport_failures_surface_the_last_error() {
        let source = MemorySource::new();
        source.fail("xyz", LookupError::Network("connection reset".into()));
        source.fail("Xyz", LookupError::Network("connection reset".into()));
        let config = ResolverConfig {
            language: Language::parse("de"),
            ..ResolverConfig::default()
        };
        let err = resolver(&source, config).resolve("xyz").await.unwrap_err();
        assert_eq!(err, LookupError::Network("connection reset".into()));
    }

    #[tokio::test]
    async fn metalanguage_only_pages_are_suppressed_in_auto_mode() {
        let source = MemorySource::new()
            .with_document("dog", r#"<h2 id="English">English</h2><ol><li>a dog</li></ol>"#);
        let config = ResolverConfig {
            language: Language::Auto,
            ..ResolverConfig::default()
        };
        let resolution = resolver(&source, config).resolve("dog").await.unwrap();
        assert_eq!(resolution, Resolution::Suppressed);
    }

    #[tokio::test]
    async fn grammar_tables_can_be_turned_off() {
        let source = MemorySource::new().with_document(
            "кот",
            &ru_page("<ol><li>tomcat</li></ol><table><tr><td>кот</td></tr></table>"),
        );
        let config = ResolverConfig {
            show_grammar: false,
            ..ResolverConfig::default()
        };
        let entry = found(resolver(&source, config).resolve("кот").await.unwrap());
        assert!(entry.grammar_tables_html.is_empty());

        let entry = found(
            resolver(&source, ResolverConfig::default())
                .resolve("кот")
                .await
                .unwrap(),
        );
        assert!(entry.grammar_tables_html.contains("rl-highlight-form"));
    }

    #[test]
    fn source_links_point_at_the_lemma_section() {
        let source = MemorySource::new();
        let resolver = resolver(&source, ResolverConfig::default());
        let entry = ResolvedEntry {
            surface_word: "кошки".into(),
            actual_word: "кошки".into(),
            lemma: "кошка".into(),
            section: "Russian".into(),
            part_of_speech: None,
            primary_definition_html: String::new(),
            secondary_definition_html: None,
            grammar_tables_html: String::new(),
            translation: String::new(),
            chain: vec!["кошки".into(), "кошка".into()],
        };
        assert!(resolver.source_url(&entry).ends_with("#Russian"));
        assert!(resolver.source_url(&entry).starts_with("https://en.wiktionary.org/wiki/%D0%BA"));
    }
}
