//! Interaction controller: hover timing, lookup requests with a stale-result
//! guard, and the actions a user can take on a shown entry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{LookupError, Result};
use crate::resolve::{Resolution, ResolvedEntry, Resolver, ResolverConfig};
use crate::session::Session;
use crate::source::DictionarySource;
use crate::store::{SaveOutcome, SavedWord, SettingsStore, save_word};
use crate::text::{SOFT_HYPHEN, char_len};

/// Longest selection, in characters, that still counts as a word.
pub const MAX_SELECTION_CHARS: usize = 50;
pub const MIN_SELECTION_CHARS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timings {
    /// Pointer must rest on a token this long before a lookup starts.
    pub hover_delay: Duration,
    /// Delay when moving from one token to another while the overlay is up.
    pub switch_delay: Duration,
    /// Linger after the pointer leaves both token and overlay.
    pub hide_delay: Duration,
    /// Margin around the overlay that still counts as inside it.
    pub overlay_padding: f64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            hover_delay: Duration::from_millis(250),
            switch_delay: Duration::from_millis(200),
            hide_delay: Duration::from_millis(500),
            overlay_padding: 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn contains(&self, x: f64, y: f64, padding: f64) -> bool {
        x >= self.x - padding
            && x <= self.x + self.width + padding
            && y >= self.y - padding
            && y <= self.y + self.height + padding
    }
}

/// What the host should do after feeding an event or polling the clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Show(String),
    Hide,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Pending { word: String, due: Instant },
    Showing,
    Hiding { due: Instant },
}

/// Hover state machine, driven by pointer events and [`HoverMachine::poll`].
#[derive(Debug)]
pub struct HoverMachine {
    timings: Timings,
    phase: Phase,
    shown: Option<String>,
    over_marker: bool,
    over_overlay: bool,
}

impl HoverMachine {
    pub fn new(timings: Timings) -> Self {
        Self {
            timings,
            phase: Phase::Idle,
            shown: None,
            over_marker: false,
            over_overlay: false,
        }
    }

    /// Word currently on screen, if any.
    pub fn shown(&self) -> Option<&str> {
        self.shown.as_deref()
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    /// Earliest instant at which [`poll`](Self::poll) can fire.
    pub fn next_deadline(&self) -> Option<Instant> {
        match &self.phase {
            Phase::Pending { due, .. } | Phase::Hiding { due } => Some(*due),
            Phase::Idle | Phase::Showing => None,
        }
    }

    /// Pointer entered a marker. Ignored while the user holds a selection.
    pub fn hover_enter(&mut self, word: &str, now: Instant, selection_active: bool) {
        if selection_active {
            return;
        }
        self.over_marker = true;
        if self.shown.as_deref() == Some(word) {
            self.phase = Phase::Showing;
            return;
        }
        if matches!(&self.phase, Phase::Pending { word: pending, .. } if pending == word) {
            return;
        }
        let delay = if self.shown.is_some() {
            self.timings.switch_delay
        } else {
            self.timings.hover_delay
        };
        self.phase = Phase::Pending {
            word: word.to_string(),
            due: now + delay,
        };
    }

    pub fn hover_leave(&mut self, now: Instant) {
        self.over_marker = false;
        match self.phase {
            Phase::Pending { .. } if self.shown.is_none() => self.phase = Phase::Idle,
            // A pending switch is abandoned; the shown word stays while the
            // pointer is over the overlay.
            Phase::Pending { .. } | Phase::Showing if self.over_overlay => {
                self.phase = Phase::Showing
            }
            Phase::Pending { .. } | Phase::Showing => self.start_hiding(now),
            Phase::Idle | Phase::Hiding { .. } => {}
        }
    }

    /// Pointer moved to `(x, y)`; `overlay` is the overlay's current bounds.
    pub fn pointer_at(&mut self, x: f64, y: f64, overlay: Option<Rect>, now: Instant) {
        let inside = overlay.is_some_and(|r| r.contains(x, y, self.timings.overlay_padding));
        let was_inside = self.over_overlay;
        self.over_overlay = inside;
        if self.shown.is_none() {
            return;
        }
        if inside {
            if matches!(self.phase, Phase::Hiding { .. }) {
                self.phase = Phase::Showing;
            }
        } else if was_inside && !self.over_marker && self.phase == Phase::Showing {
            self.start_hiding(now);
        }
    }

    /// An explicit selection shows immediately. Selections starting inside the
    /// overlay and ones that are not a single word are ignored.
    pub fn select(&mut self, text: &str, inside_overlay: bool) -> Option<Trigger> {
        if inside_overlay {
            return None;
        }
        let word = selection_word(text)?;
        self.phase = Phase::Showing;
        self.shown = Some(word.clone());
        Some(Trigger::Show(word))
    }

    pub fn poll(&mut self, now: Instant) -> Option<Trigger> {
        match &self.phase {
            Phase::Pending { word, due } if now >= *due => {
                let word = word.clone();
                self.phase = Phase::Showing;
                self.shown = Some(word.clone());
                Some(Trigger::Show(word))
            }
            Phase::Hiding { due } if now >= *due => {
                self.phase = Phase::Idle;
                self.shown = None;
                Some(Trigger::Hide)
            }
            _ => None,
        }
    }

    fn start_hiding(&mut self, now: Instant) {
        self.phase = Phase::Hiding {
            due: now + self.timings.hide_delay,
        };
    }
}

/// Accepts a selection as a lookup word: trimmed, soft hyphens removed, and
/// between two and forty-nine characters.
pub fn selection_word(text: &str) -> Option<String> {
    let word: String = text.trim().chars().filter(|&c| c != SOFT_HYPHEN).collect();
    let len = char_len(&word);
    (MIN_SELECTION_CHARS..MAX_SELECTION_CHARS)
        .contains(&len)
        .then_some(word)
}

/// Rendering collaborator. Layout is entirely up to the implementation.
pub trait Overlay: Send {
    fn show_loading(&mut self, word: &str);
    fn show_entry(&mut self, entry: &ResolvedEntry, show_grammar: bool);
    fn show_message(&mut self, word: &str, message: &str);
    fn hide(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Served from the session cache without touching the pipeline.
    Cached,
    Rendered,
    /// Settled after the user moved on; nothing was rendered.
    Stale,
    /// No entry; the word's markers can be pruned.
    NotFound,
    Suppressed,
    Failed(LookupError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Copy,
    OpenSource,
    Save,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Copied(String),
    Open(String),
    Saved(SaveOutcome),
}

pub struct Controller<O: Overlay> {
    session: Arc<Session>,
    resolver: Resolver,
    overlay: Mutex<O>,
    store: Option<Arc<dyn SettingsStore>>,
}

impl<O: Overlay> Controller<O> {
    /// The session's language and grammar toggle override `config`.
    pub fn new(
        session: Arc<Session>,
        source: Arc<dyn DictionarySource>,
        config: ResolverConfig,
        overlay: O,
    ) -> Self {
        let config = ResolverConfig {
            language: session.language().clone(),
            show_grammar: session.show_grammar(),
            ..config
        };
        Self {
            session,
            resolver: Resolver::new(source, config),
            overlay: Mutex::new(overlay),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn with_overlay<R>(&self, f: impl FnOnce(&mut O) -> R) -> R {
        f(&mut self.overlay.lock())
    }

    /// Looks `word` up and renders the result if it is still the active
    /// lookup when the pipeline settles.
    pub async fn request_lookup(&self, word: &str) -> LookupOutcome {
        let ticket = self.session.begin_lookup(word);
        let show_grammar = self.session.show_grammar();

        if let Some(cached) = self.session.cached(word) {
            return match cached {
                Some(entry) => {
                    self.overlay.lock().show_entry(&entry, show_grammar);
                    LookupOutcome::Cached
                }
                None => {
                    self.overlay.lock().hide();
                    LookupOutcome::Suppressed
                }
            };
        }

        self.overlay.lock().show_loading(word);
        let result = self.resolver.resolve(word).await;
        let current = self.session.is_current(&ticket);

        match result {
            Ok(Resolution::Found(entry)) => {
                self.session.cache_result(word, Some(entry.clone()));
                if !current {
                    debug!(word, "discarding stale result");
                    return LookupOutcome::Stale;
                }
                self.overlay.lock().show_entry(&entry, show_grammar);
                LookupOutcome::Rendered
            }
            _ if !current => {
                debug!(word, "discarding stale result");
                LookupOutcome::Stale
            }
            Ok(Resolution::Suppressed) => {
                self.session.cache_result(word, None);
                self.session.mark_dead(word);
                self.overlay.lock().hide();
                LookupOutcome::Suppressed
            }
            Err(err @ LookupError::NotFound { .. }) => {
                self.session.mark_dead(word);
                self.overlay.lock().show_message(word, &err.user_message());
                LookupOutcome::NotFound
            }
            Err(err) => {
                warn!(word, error = %err, "lookup failed");
                self.overlay.lock().show_message(word, &err.user_message());
                LookupOutcome::Failed(err)
            }
        }
    }

    /// Hides the overlay and forgets the active lookup.
    pub fn dismiss(&self) {
        self.session.clear_active();
        self.overlay.lock().hide();
    }

    pub fn perform(&self, action: UserAction, entry: &ResolvedEntry) -> Result<ActionOutcome> {
        let headword = if entry.lemma.is_empty() {
            &entry.surface_word
        } else {
            &entry.lemma
        };
        match action {
            UserAction::Copy => Ok(ActionOutcome::Copied(headword.clone())),
            UserAction::OpenSource => Ok(ActionOutcome::Open(self.resolver.source_url(entry))),
            UserAction::Save => {
                let store = self
                    .store
                    .as_deref()
                    .ok_or_else(|| LookupError::Storage("no store configured".to_string()))?;
                let saved = SavedWord::new(&entry.surface_word, headword, &entry.translation);
                Ok(ActionOutcome::Saved(save_word(store, &saved)?))
            }
        }
    }
}
