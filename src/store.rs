//! Settings and saved-word persistence.
//!
//! Values are JSON so a store can hold the same shapes a browser-side
//! storage area would: strings, booleans and lists of records.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{LookupError, Result};
use crate::language::Language;
use crate::text::fold;

pub const LANGUAGE_KEY: &str = "language";
pub const SHOW_GRAMMAR_KEY: &str = "showGrammar";
pub const SAVED_WORDS_KEY: &str = "savedWords";
pub const DEFAULT_LANGUAGE: &str = "ru";

/// Result of appending to a list that forbids duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOutcome {
    Accepted,
    Duplicate,
}

/// Key-value persistence collaborator.
pub trait SettingsStore: Send + Sync {
    fn load_setting(&self, key: &str) -> Result<Option<Value>>;

    fn save_setting(&self, key: &str, value: Value) -> Result<()>;

    /// The list stored under `key`; empty when absent.
    fn load_list(&self, key: &str) -> Result<Vec<Value>>;

    /// Appends `item` unless an element already satisfies `same(existing, item)`.
    fn append_if_absent(
        &self,
        key: &str,
        item: Value,
        same: &dyn Fn(&Value, &Value) -> bool,
    ) -> Result<SaveOutcome>;
}

/// A word the user chose to keep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedWord {
    /// Surface form as seen on the page.
    pub word: String,
    /// Headword it resolved to.
    pub base: String,
    pub translation: String,
    #[serde(rename = "date")]
    pub saved_at: DateTime<Utc>,
}

impl SavedWord {
    pub fn new(word: &str, base: &str, translation: &str) -> Self {
        Self {
            word: word.to_string(),
            base: base.to_string(),
            translation: translation.to_string(),
            saved_at: Utc::now(),
        }
    }

    /// Saved words are unique by surface form and headword, compared folded.
    pub fn same_entry(&self, other: &SavedWord) -> bool {
        fold(&self.word) == fold(&other.word) && fold(&self.base) == fold(&other.base)
    }
}

pub fn save_word(store: &dyn SettingsStore, entry: &SavedWord) -> Result<SaveOutcome> {
    let item = serde_json::to_value(entry).map_err(|err| LookupError::Storage(err.to_string()))?;
    store.append_if_absent(SAVED_WORDS_KEY, item, &|existing, candidate| {
        match (
            serde_json::from_value::<SavedWord>(existing.clone()),
            serde_json::from_value::<SavedWord>(candidate.clone()),
        ) {
            (Ok(a), Ok(b)) => a.same_entry(&b),
            _ => false,
        }
    })
}

/// Saved words in insertion order. Records that no longer parse are skipped.
pub fn saved_words(store: &dyn SettingsStore) -> Result<Vec<SavedWord>> {
    Ok(store
        .load_list(SAVED_WORDS_KEY)?
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(word) => Some(word),
            Err(err) => {
                warn!(error = %err, "skipping unreadable saved word");
                None
            }
        })
        .collect())
}

/// Target language setting, `ru` when unset.
pub fn stored_language(store: &dyn SettingsStore) -> Result<Language> {
    Ok(match store.load_setting(LANGUAGE_KEY)? {
        Some(Value::String(code)) => Language::parse(&code),
        _ => Language::parse(DEFAULT_LANGUAGE),
    })
}

/// Grammar-table toggle; anything but an explicit `false` means on.
pub fn stored_show_grammar(store: &dyn SettingsStore) -> Result<bool> {
    Ok(!matches!(store.load_setting(SHOW_GRAMMAR_KEY)?, Some(Value::Bool(false))))
}

#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn load_setting(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn save_setting(&self, key: &str, value: Value) -> Result<()> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }

    fn load_list(&self, key: &str) -> Result<Vec<Value>> {
        Ok(list_of(self.values.read().get(key)))
    }

    fn append_if_absent(
        &self,
        key: &str,
        item: Value,
        same: &dyn Fn(&Value, &Value) -> bool,
    ) -> Result<SaveOutcome> {
        let mut values = self.values.write();
        let mut list = list_of(values.get(key));
        if list.iter().any(|existing| same(existing, &item)) {
            return Ok(SaveOutcome::Duplicate);
        }
        list.push(item);
        values.insert(key.to_string(), Value::Array(list));
        Ok(SaveOutcome::Accepted)
    }
}

/// Store backed by a single JSON object on disk, rewritten on every change.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Map<String, Value>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(storage_error(&self.path, err)),
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(LookupError::Storage(format!(
                "{} does not hold a JSON object",
                self.path.display()
            ))),
            Err(err) => Err(storage_error(&self.path, err)),
        }
    }

    fn write(&self, map: Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| storage_error(parent, err))?;
        }
        let body = serde_json::to_string_pretty(&Value::Object(map))
            .map_err(|err| storage_error(&self.path, err))?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, body).map_err(|err| storage_error(&staging, err))?;
        fs::rename(&staging, &self.path).map_err(|err| storage_error(&self.path, err))
    }
}

impl SettingsStore for JsonFileStore {
    fn load_setting(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.lock.lock();
        Ok(self.read()?.get(key).cloned())
    }

    fn save_setting(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.lock.lock();
        let mut map = self.read()?;
        map.insert(key.to_string(), value);
        self.write(map)
    }

    fn load_list(&self, key: &str) -> Result<Vec<Value>> {
        let _guard = self.lock.lock();
        Ok(list_of(self.read()?.get(key)))
    }

    fn append_if_absent(
        &self,
        key: &str,
        item: Value,
        same: &dyn Fn(&Value, &Value) -> bool,
    ) -> Result<SaveOutcome> {
        let _guard = self.lock.lock();
        let mut map = self.read()?;
        let mut list = list_of(map.get(key));
        if list.iter().any(|existing| same(existing, &item)) {
            return Ok(SaveOutcome::Duplicate);
        }
        list.push(item);
        map.insert(key.to_string(), Value::Array(list));
        self.write(map)?;
        Ok(SaveOutcome::Accepted)
    }
}

fn list_of(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

fn storage_error(path: &Path, err: impl std::fmt::Display) -> LookupError {
    LookupError::Storage(format!("{}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn settings_default_when_absent() {
        let store = MemoryStore::new();
        assert_eq!(stored_language(&store).unwrap(), Language::parse("ru"));
        assert!(stored_show_grammar(&store).unwrap());

        store.save_setting(LANGUAGE_KEY, json!("de")).unwrap();
        store.save_setting(SHOW_GRAMMAR_KEY, json!(false)).unwrap();
        assert_eq!(stored_language(&store).unwrap(), Language::parse("de"));
        assert!(!stored_show_grammar(&store).unwrap());
    }

    #[test]
    fn saved_words_are_unique_by_word_and_base() {
        let store = MemoryStore::new();
        let first = SavedWord::new("говорящего", "говорить", "to speak");
        assert_eq!(save_word(&store, &first).unwrap(), SaveOutcome::Accepted);
        assert_eq!(
            save_word(&store, &SavedWord::new("Говорящего", "говорить", "")).unwrap(),
            SaveOutcome::Duplicate
        );
        assert_eq!(
            save_word(&store, &SavedWord::new("говорит", "говорить", "")).unwrap(),
            SaveOutcome::Accepted
        );
        let words = saved_words(&store).unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[0], first);
    }

    #[test]
    fn unreadable_records_are_skipped() {
        let store = MemoryStore::new();
        store
            .save_setting(SAVED_WORDS_KEY, json!([{ "oops": 1 }]))
            .unwrap();
        save_word(&store, &SavedWord::new("кот", "кот", "cat")).unwrap();
        assert_eq!(saved_words(&store).unwrap().len(), 1);
        assert_eq!(store.load_list(SAVED_WORDS_KEY).unwrap().len(), 2);
    }

    #[test]
    fn file_store_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = JsonFileStore::open(&path);
        assert_eq!(store.load_setting(LANGUAGE_KEY).unwrap(), None);
        store.save_setting(LANGUAGE_KEY, json!("uk")).unwrap();
        save_word(&store, &SavedWord::new("кіт", "кіт", "cat")).unwrap();

        let reopened = JsonFileStore::open(&path);
        assert_eq!(stored_language(&reopened).unwrap(), Language::parse("uk"));
        assert_eq!(
            save_word(&reopened, &SavedWord::new("кіт", "кіт", "tomcat")).unwrap(),
            SaveOutcome::Duplicate
        );
        let words = saved_words(&reopened).unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].translation, "cat");
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "[1, 2]").unwrap();
        let store = JsonFileStore::open(&path);
        assert!(matches!(
            store.load_setting(LANGUAGE_KEY),
            Err(LookupError::Storage(_))
        ));
    }
}
