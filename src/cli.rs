use std::error::Error;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use atty::Stream;
use clap::{Args, Parser, Subcommand};
use glosso_rs::extract::{GridCell, definition_lines, table_grids};
use glosso_rs::store::{
    LANGUAGE_KEY, SHOW_GRAMMAR_KEY, saved_words, stored_language, stored_show_grammar,
};
use glosso_rs::{
    ActionOutcome, Annotator, Controller, Document, JsonFileStore, Language, LookupOutcome,
    Overlay, ResolvedEntry, ResolverConfig, SaveOutcome, Session, SettingsStore, UserAction,
    WiktionaryConfig, WiktionarySource, classify, extract, generate_candidates, lookup_key,
};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "GLOSSO_LOG";

#[derive(Parser, Debug)]
#[command(name = "glosso-rs", about = "Look words up the way a reader meets them", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    options: Options,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Options {
    /// Target language code, or `auto`. Defaults to the stored setting.
    #[arg(long = "lang", global = true)]
    language: Option<String>,

    /// Leave inflection tables out of lookups.
    #[arg(long, global = true)]
    no_tables: bool,

    /// Pages in a cross-reference chain, the surface page included.
    #[arg(long, global = true, default_value_t = 2)]
    depth: usize,

    /// Per-request budget in milliseconds.
    #[arg(long, global = true, default_value_t = 6000)]
    timeout_ms: u64,

    /// MediaWiki API endpoint.
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// JSON file holding settings and saved words.
    #[arg(long, global = true)]
    store: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve words against the online dictionary.
    Lookup {
        #[arg(required = true)]
        words: Vec<String>,
        /// Add each resolved word to the saved list.
        #[arg(long)]
        save: bool,
    },
    /// List lookup candidates in a piece of text.
    Tokens {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Annotate an HTML file (`-` for stdin) and print the result.
    Annotate {
        path: PathBuf,
        /// Print the markers instead of the annotated markup.
        #[arg(long)]
        markers: bool,
    },
    /// Show the headword guesses for an inflected form.
    Forms { word: String },
    /// Run extraction on a saved dictionary page.
    Extract {
        path: PathBuf,
        /// Surface form to highlight in tables.
        #[arg(long)]
        word: String,
    },
    /// List saved words.
    Saved,
    /// Show or change stored settings.
    Settings {
        /// New target language code.
        #[arg(long = "set-lang")]
        set_language: Option<String>,
        /// Whether lookups include inflection tables.
        #[arg(long = "set-grammar")]
        set_grammar: Option<bool>,
    },
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing();
    let options = &cli.options;
    match cli.command {
        Command::Lookup { words, save } => handle_lookup(options, words, save, cli.json),
        Command::Tokens { text } => handle_tokens(options, &text.join(" "), cli.json),
        Command::Annotate { path, markers } => handle_annotate(options, &path, markers, cli.json),
        Command::Forms { word } => handle_forms(options, &word, cli.json),
        Command::Extract { path, word } => handle_extract(options, &path, &word, cli.json),
        Command::Saved => handle_saved(options, cli.json),
        Command::Settings {
            set_language,
            set_grammar,
        } => handle_settings(options, set_language, set_grammar, cli.json),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn open_store(options: &Options) -> Option<Arc<dyn SettingsStore>> {
    options
        .store
        .as_ref()
        .map(|path| Arc::new(JsonFileStore::open(path)) as Arc<dyn SettingsStore>)
}

fn require_store(options: &Options) -> Result<Arc<dyn SettingsStore>, Box<dyn Error>> {
    open_store(options).ok_or_else(|| "this command needs --store <path>".into())
}

/// Flags win over stored settings, which win over defaults.
fn build_session(
    options: &Options,
    store: Option<&dyn SettingsStore>,
) -> Result<Session, Box<dyn Error>> {
    let language = match (&options.language, store) {
        (Some(code), _) => Language::parse(code),
        (None, Some(store)) => stored_language(store)?,
        (None, None) => ResolverConfig::default().language,
    };
    let show_grammar = !options.no_tables
        && match store {
            Some(store) => stored_show_grammar(store)?,
            None => true,
        };
    Ok(Session::new(language, show_grammar))
}

fn current_language(options: &Options) -> Result<Language, Box<dyn Error>> {
    let store = open_store(options);
    Ok(build_session(options, store.as_deref())?.language().clone())
}

/// Holds whatever the controller last asked to show.
#[derive(Default)]
struct CapturedOverlay {
    entry: Option<ResolvedEntry>,
    message: Option<String>,
}

impl Overlay for CapturedOverlay {
    fn show_loading(&mut self, word: &str) {
        debug!(word, "loading");
        self.entry = None;
        self.message = None;
    }

    fn show_entry(&mut self, entry: &ResolvedEntry, _show_grammar: bool) {
        self.entry = Some(entry.clone());
        self.message = None;
    }

    fn show_message(&mut self, _word: &str, message: &str) {
        self.entry = None;
        self.message = Some(message.to_string());
    }

    fn hide(&mut self) {
        self.entry = None;
        self.message = None;
    }
}

fn handle_lookup(
    options: &Options,
    words: Vec<String>,
    save: bool,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let store = open_store(options);
    if save && store.is_none() {
        return Err("--save needs --store <path>".into());
    }
    let session = Arc::new(build_session(options, store.as_deref())?);
    let mut source_config = WiktionaryConfig {
        timeout: Duration::from_millis(options.timeout_ms),
        ..WiktionaryConfig::default()
    };
    if let Some(endpoint) = &options.endpoint {
        source_config.endpoint = endpoint.clone();
    }
    let source = Arc::new(WiktionarySource::new(source_config)?);
    let config = ResolverConfig {
        request_timeout: Duration::from_millis(options.timeout_ms),
        max_depth: options.depth.max(1),
        ..ResolverConfig::default()
    };
    let mut controller = Controller::new(session.clone(), source, config, CapturedOverlay::default());
    if let Some(store) = store {
        controller = controller.with_store(store);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let mut payload = Vec::new();
    for word in words {
        let outcome = runtime.block_on(controller.request_lookup(&word));
        let (entry, message) =
            controller.with_overlay(|overlay| (overlay.entry.take(), overlay.message.take()));
        let url = match &entry {
            Some(entry) => match controller.perform(UserAction::OpenSource, entry)? {
                ActionOutcome::Open(url) => Some(url),
                _ => None,
            },
            None => None,
        };
        let saved = match (&entry, save) {
            (Some(entry), true) => match controller.perform(UserAction::Save, entry)? {
                ActionOutcome::Saved(outcome) => Some(outcome),
                _ => None,
            },
            _ => None,
        };

        if as_json {
            payload.push(json!({
                "word": word,
                "outcome": outcome_label(&outcome),
                "entry": entry,
                "message": message,
                "url": url,
                "saved": saved,
            }));
            continue;
        }
        match entry {
            Some(entry) => {
                print_entry(&entry, session.show_grammar());
                if let Some(url) = url {
                    println!("Source: {url}");
                }
                match saved {
                    Some(SaveOutcome::Accepted) => println!("Saved."),
                    Some(SaveOutcome::Duplicate) => println!("Already saved."),
                    None => {}
                }
            }
            None => match message {
                Some(message) => println!("{word}: {message}"),
                None => println!("{word}: nothing to show in {}", session.language()),
            },
        }
        println!();
    }
    if as_json {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    }
    Ok(())
}

fn outcome_label(outcome: &LookupOutcome) -> &'static str {
    match outcome {
        LookupOutcome::Cached | LookupOutcome::Rendered => "found",
        LookupOutcome::Stale => "stale",
        LookupOutcome::NotFound => "not_found",
        LookupOutcome::Suppressed => "suppressed",
        LookupOutcome::Failed(_) => "error",
    }
}

fn handle_tokens(options: &Options, text: &str, as_json: bool) -> Result<(), Box<dyn Error>> {
    let language = current_language(options)?;
    let candidates = classify(language.code()).candidates(text);
    if as_json {
        let payload: Vec<_> = candidates
            .iter()
            .map(|c| json!({ "text": c.text, "key": lookup_key(c.text), "start": c.start, "end": c.end }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    if candidates.is_empty() {
        println!("No candidates for {language}.");
        return Ok(());
    }
    let width = candidates
        .iter()
        .map(|c| c.text.chars().count())
        .max()
        .unwrap_or(4)
        .max("TOKEN".len());
    println!("{:<width$}  {:<width$}  {}", "TOKEN", "KEY", "BYTES", width = width);
    println!("{:-<width$}  {:-<width$}  {}", "", "", "-----", width = width);
    for c in &candidates {
        println!(
            "{:<width$}  {:<width$}  {}..{}",
            c.text,
            lookup_key(c.text),
            c.start,
            c.end,
            width = width
        );
    }
    Ok(())
}

fn read_input(path: &Path) -> Result<String, Box<dyn Error>> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    fs::read_to_string(path).map_err(|err| format!("{}: {err}", path.display()).into())
}

fn handle_annotate(
    options: &Options,
    path: &Path,
    markers_only: bool,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let html = read_input(path)?;
    let session = Arc::new(Session::new(current_language(options)?, true));
    let mut doc = Document::from_html(&html);
    let mut annotator = Annotator::new(session);
    let created = annotator.attach(&mut doc);
    debug!(markers = created, "annotated document");
    let root = doc.root();
    let markers = annotator.markers(&doc, root);

    if as_json {
        let html = (!markers_only).then(|| doc.inner_html(root));
        let payload = json!({
            "markers": markers.iter().map(|m| json!({ "text": m.text, "key": m.key })).collect::<Vec<_>>(),
            "html": html,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if markers_only {
        for marker in &markers {
            if marker.key == marker.text {
                println!("{}", marker.text);
            } else {
                println!("{} ({})", marker.text, marker.key);
            }
        }
    } else {
        println!("{}", doc.inner_html(root));
    }
    Ok(())
}

fn handle_forms(options: &Options, word: &str, as_json: bool) -> Result<(), Box<dyn Error>> {
    let language = current_language(options)?;
    let forms = generate_candidates(&lookup_key(word), &language);
    if as_json {
        let payload = json!({ "word": word, "language": language.code(), "candidates": forms });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if forms.is_empty() {
        println!("No suffix rules apply to \"{word}\" in {language}.");
    } else {
        for (rank, form) in forms.iter().enumerate() {
            println!("{:>3}. {form}", rank + 1);
        }
    }
    Ok(())
}

fn handle_extract(
    options: &Options,
    path: &Path,
    word: &str,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let html = read_input(path)?;
    let language = current_language(options)?;
    let extraction = extract(&html, &language, word);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&extraction)?);
        return Ok(());
    }
    let Some(section) = &extraction.section else {
        println!("No {language} section found.");
        return Ok(());
    };
    println!("Section: {section}");
    if let Some(pos) = &extraction.part_of_speech {
        println!("Part of speech: {pos}");
    }
    if let Some(lemma) = &extraction.cross_reference {
        println!("Form of: {lemma}");
    }
    render_definitions("Definitions", &extraction.definitions_html());
    render_tables(&extraction.grammar_tables_html());
    Ok(())
}

fn handle_saved(options: &Options, as_json: bool) -> Result<(), Box<dyn Error>> {
    let store = require_store(options)?;
    let words = saved_words(store.as_ref())?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&words)?);
        return Ok(());
    }
    if words.is_empty() {
        println!("No saved words.");
        return Ok(());
    }
    let width = words
        .iter()
        .map(|w| w.word.chars().count())
        .max()
        .unwrap_or(4)
        .max("WORD".len());
    let base_width = words
        .iter()
        .map(|w| w.base.chars().count())
        .max()
        .unwrap_or(4)
        .max("BASE".len());
    println!(
        "{:<width$}  {:<base_width$}  {:<10}  {}",
        "WORD", "BASE", "DATE", "TRANSLATION"
    );
    for saved in &words {
        println!(
            "{:<width$}  {:<base_width$}  {:<10}  {}",
            saved.word,
            saved.base,
            saved.saved_at.format("%Y-%m-%d"),
            saved.translation
        );
    }
    Ok(())
}

fn handle_settings(
    options: &Options,
    set_language: Option<String>,
    set_grammar: Option<bool>,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let store = require_store(options)?;
    if let Some(code) = set_language {
        let language = Language::parse(&code);
        store.save_setting(LANGUAGE_KEY, json!(language.code()))?;
    }
    if let Some(show) = set_grammar {
        store.save_setting(SHOW_GRAMMAR_KEY, json!(show))?;
    }
    let language = stored_language(store.as_ref())?;
    let show_grammar = stored_show_grammar(store.as_ref())?;
    if as_json {
        let payload = json!({ "language": language.code(), "showGrammar": show_grammar });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        let name = language.section_name().unwrap_or("auto-detect");
        println!("Language: {} ({name})", language.code());
        println!("Grammar tables: {}", if show_grammar { "on" } else { "off" });
    }
    Ok(())
}

fn print_entry(entry: &ResolvedEntry, show_grammar: bool) {
    let heading = if entry.lemma == entry.surface_word {
        entry.lemma.clone()
    } else {
        format!("{} → {}", entry.surface_word, entry.lemma)
    };
    match &entry.part_of_speech {
        Some(pos) => println!("{heading} ({pos}) [{}]", entry.section),
        None => println!("{heading} [{}]", entry.section),
    }
    if entry.actual_word != entry.surface_word && entry.actual_word != entry.lemma {
        println!("Matched page: {}", entry.actual_word);
    }
    if let Some(secondary) = &entry.secondary_definition_html {
        render_definitions(&format!("Form of {}", entry.lemma), secondary);
    }
    render_definitions("Definitions", &entry.primary_definition_html);
    if show_grammar {
        render_tables(&entry.grammar_tables_html);
    }
}

fn render_definitions(title: &str, html: &str) {
    let lines = definition_lines(html);
    if lines.is_empty() {
        return;
    }
    let body = lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{}. {}", i + 1, escape_markdown(line)))
        .collect::<Vec<_>>()
        .join("\n");
    render_markdown_block(title, &body);
}

fn render_tables(html: &str) {
    for (index, grid) in table_grids(html).iter().enumerate() {
        let body = grid_to_markdown(grid);
        render_markdown_block(&format!("Table {}", index + 1), &body);
    }
}

fn grid_to_markdown(grid: &[Vec<GridCell>]) -> String {
    let columns = grid.iter().map(Vec::len).max().unwrap_or(0);
    if columns == 0 {
        return String::new();
    }
    let mut out = String::new();
    for (i, row) in grid.iter().enumerate() {
        out.push('|');
        for col in 0..columns {
            let cell = row.get(col);
            let text = cell.map(|c| escape_markdown(&c.text)).unwrap_or_default();
            match cell {
                Some(c) if c.highlighted && !text.is_empty() => out.push_str(&format!("**{text}**")),
                _ => out.push_str(&text),
            }
            out.push('|');
        }
        out.push('\n');
        if i == 0 {
            out.push('|');
            out.push_str(&"-|".repeat(columns));
            out.push('\n');
        }
    }
    out
}

fn escape_markdown(text: &str) -> String {
    text.replace('|', "\\|").replace('*', "\\*")
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn render_markdown_block(title: &str, body: &str) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return;
    }
    println!("\n{title}:");
    if stdout_is_tty() {
        let skin = MadSkin::default();
        let formatted = FmtText::from(&skin, trimmed, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{trimmed}");
    }
}
