//! Per-document session state shared by the annotator, controller and
//! pipeline: target language, result cache, the active lookup and the keys
//! known to have no usable entry.

use std::collections::HashSet;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::{Mutex, RwLock};

use crate::error::Result;
use crate::language::Language;
use crate::resolve::ResolvedEntry;
use crate::store::{SettingsStore, stored_language, stored_show_grammar};
use crate::text::fold;

/// Identifies one lookup request; compared against the active lookup when
/// the result arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTicket {
    key: String,
    generation: u64,
}

#[derive(Debug, Default)]
struct ActiveLookup {
    key: Option<String>,
    generation: u64,
}

pub struct Session {
    language: Language,
    show_grammar: bool,
    /// Folded surface form to entry; `None` records a suppressed lookup.
    cache: Mutex<LruCache<String, Option<ResolvedEntry>>>,
    active: Mutex<ActiveLookup>,
    dead: RwLock<HashSet<String>>,
}

impl Session {
    pub fn new(language: Language, show_grammar: bool) -> Self {
        Self {
            language,
            show_grammar,
            cache: Mutex::new(LruCache::unbounded()),
            active: Mutex::new(ActiveLookup::default()),
            dead: RwLock::new(HashSet::new()),
        }
    }

    /// Session with a bounded cache; least recently used entries go first.
    pub fn with_cache_capacity(language: Language, show_grammar: bool, capacity: NonZeroUsize) -> Self {
        let session = Self::new(language, show_grammar);
        *session.cache.lock() = LruCache::new(capacity);
        session
    }

    /// Reads the language and grammar toggle from persisted settings.
    pub fn from_store(store: &dyn SettingsStore) -> Result<Self> {
        Ok(Self::new(stored_language(store)?, stored_show_grammar(store)?))
    }

    pub fn language(&self) -> &Language {
        &self.language
    }

    pub fn show_grammar(&self) -> bool {
        self.show_grammar
    }

    /// `Some(None)` means the word was looked up and deliberately suppressed.
    pub fn cached(&self, word: &str) -> Option<Option<ResolvedEntry>> {
        self.cache.lock().get(&fold(word)).cloned()
    }

    /// Stores a result unless one is already cached; the first completion wins.
    pub fn cache_result(&self, word: &str, entry: Option<ResolvedEntry>) -> bool {
        let key = fold(word);
        let mut cache = self.cache.lock();
        if cache.contains(&key) {
            return false;
        }
        cache.put(key, entry);
        true
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Makes `word` the active lookup, superseding any earlier one.
    pub fn begin_lookup(&self, word: &str) -> LookupTicket {
        let mut active = self.active.lock();
        active.generation += 1;
        let key = fold(word);
        active.key = Some(key.clone());
        LookupTicket {
            key,
            generation: active.generation,
        }
    }

    /// Whether the lookup behind `ticket` is still the one being shown.
    pub fn is_current(&self, ticket: &LookupTicket) -> bool {
        let active = self.active.lock();
        active.generation == ticket.generation && active.key.as_deref() == Some(ticket.key.as_str())
    }

    pub fn active_word(&self) -> Option<String> {
        self.active.lock().key.clone()
    }

    /// Drops the active lookup, e.g. when the overlay hides.
    pub fn clear_active(&self) {
        let mut active = self.active.lock();
        active.generation += 1;
        active.key = None;
    }

    /// Records a key that has no usable entry; its markers get pruned.
    pub fn mark_dead(&self, word: &str) {
        self.dead.write().insert(fold(word));
    }

    pub fn is_dead(&self, word: &str) -> bool {
        self.dead.read().contains(&fold(word))
    }
}
