//! Dictionary lookups over running text.
//!
//! The annotation side finds lookup-worthy tokens in a live text tree and
//! wraps them in markers; the resolution side turns a surface form into a
//! dictionary entry by way of case variants, suffix rules, fuzzy suggestions
//! and "form of" cross-references.

pub mod annotate;
pub mod controller;
pub mod dom;
pub mod error;
pub mod extract;
pub mod language;
pub mod morph;
pub mod resolve;
pub mod script;
pub mod session;
pub mod source;
pub mod store;
pub mod text;
pub mod wiktionary;

pub use annotate::{Annotator, Marker, marker_at};
pub use controller::{
    ActionOutcome, Controller, HoverMachine, LookupOutcome, Overlay, Rect, Timings, Trigger,
    UserAction, selection_word,
};
pub use dom::{Document, Mutation, NodeId};
pub use error::{LookupError, Result};
pub use extract::{Extraction, extract, html_to_text};
pub use language::Language;
pub use morph::generate_candidates;
pub use resolve::{Resolution, ResolvedEntry, Resolver, ResolverConfig};
pub use script::{Candidate, TokenPattern, classify};
pub use session::{LookupTicket, Session};
pub use source::{DictionarySource, MemorySource, SourceDocument};
pub use store::{JsonFileStore, MemoryStore, SaveOutcome, SavedWord, SettingsStore};
pub use text::lookup_key;
pub use wiktionary::{WiktionaryConfig, WiktionarySource};
