//! Pulls definitions, a form-of cross-reference and inflection tables out of a
//! rendered dictionary page.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::Serialize;

use crate::dom::VOID_TAGS;
use crate::language::{Language, METALANGUAGE};
use crate::text::{char_len, escape_html, fold};

/// Class added to the table cell holding the looked-up form.
pub const HIGHLIGHT_CLASS: &str = "rl-highlight-form";
/// Class of the inert spans that replace hyperlinks.
pub const LINK_CLASS: &str = "rl-link";

/// Words that follow "of" in ordinary prose and are never headwords.
const CROSS_REF_STOPLIST: &[&str] = &[
    "all", "it", "us", "them", "him", "her", "me", "you", "one", "this", "that", "the", "a", "an",
    "some", "any", "these", "those",
];

/// Classes of elements dropped from tables: transliterations, references and
/// annotations.
const TABLE_NOISE_CLASSES: &[&str] = &["tr", "mention-tr", "reference", "mw-ref", "annotation-paren"];
const TABLE_NOISE_TAGS: &[&str] = &["sup", "style", "script"];
const DEFINITION_NOISE_CLASSES: &[&str] = &["reference", "mw-ref"];
const DEFINITION_NOISE_TAGS: &[&str] = &["style", "script"];

const DECORATIVE_GLYPHS: &[char] = &[
    '△', '▲', '▽', '▼', '¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹', '⁰',
];

static CROSS_REF_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bof\s+([\p{L}\p{M}\-]+)").expect("cross-reference pattern compiles"));
static ID_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[id]").expect("id selector parses"));
static H2_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("h2").expect("h2 selector parses"));
static TABLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("table selector parses"));
static OL_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("ol").expect("ol selector parses"));
static ROW_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("tr selector parses"));
static SUBHEADING_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h3, h4, h5").expect("subheading selector parses"));
static LEMMA_LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".form-of-definition-link a, .use-with-mention .mention a")
        .expect("lemma link selector parses")
});

/// Everything taken from one page for one language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Extraction {
    /// Name of the language section that was read, if one was found.
    pub section: Option<String>,
    pub part_of_speech: Option<String>,
    /// Inner HTML of each definition item, links made inert.
    pub definitions: Vec<String>,
    /// Case-folded headword this entry is a form of.
    pub cross_reference: Option<String>,
    /// Cleaned inflection tables.
    pub tables: Vec<String>,
    /// Set in auto mode when the page only has a metalanguage section.
    pub only_metalanguage: bool,
}

impl Extraction {
    /// A page counts as a hit only when it has a section for the language.
    pub fn is_usable(&self) -> bool {
        self.section.is_some()
    }

    pub fn definitions_html(&self) -> String {
        if self.definitions.is_empty() {
            return String::new();
        }
        let mut out = String::from("<ol>");
        for item in &self.definitions {
            out.push_str("<li>");
            out.push_str(item);
            out.push_str("</li>");
        }
        out.push_str("</ol>");
        out
    }

    pub fn grammar_tables_html(&self) -> String {
        self.tables.concat()
    }

    /// Plain text of the first definition.
    pub fn first_gloss(&self) -> Option<String> {
        self.definitions.first().map(|item| html_to_text(item))
    }
}

/// Reads the section for `language` out of `html`. Cells equal to
/// `target` (after folding) are highlighted in the tables.
pub fn extract(html: &str, language: &Language, target: &str) -> Extraction {
    let document = Html::parse_document(html);
    let mut extraction = Extraction::default();

    let heading = match language.section_anchor() {
        Some(anchor) => find_anchored_heading(&document, &anchor),
        None => {
            let (heading, only_metalanguage) = first_foreign_heading(&document);
            extraction.only_metalanguage = only_metalanguage;
            heading
        }
    };
    let Some(heading) = heading else {
        return extraction;
    };
    extraction.section = Some(collapse_whitespace(&heading.text().collect::<String>()));

    let target = fold(target);
    let start = heading
        .parent()
        .and_then(ElementRef::wrap)
        .filter(|parent| has_any_class(parent, &["mw-heading"]))
        .unwrap_or(heading);

    let mut last_subheading: Option<String> = None;
    for sibling in start.next_siblings().filter_map(ElementRef::wrap) {
        if sibling.value().name() == "h2" || sibling.select(&H2_SELECTOR).next().is_some() {
            break;
        }
        if let Some(title) = subheading_text(&sibling) {
            last_subheading = Some(title);
        }
        if sibling.value().name() == "ol" {
            if extraction.part_of_speech.is_none() && extraction.definitions.is_empty() {
                extraction.part_of_speech = last_subheading.clone();
            }
            collect_definitions(&sibling, &mut extraction);
        }
        for table in tables_in(&sibling) {
            extraction.tables.push(clean_table(&table, &target));
        }
    }
    extraction
}

/// The h2 carrying `anchor`, either as its own id or on a child span.
fn find_anchored_heading<'a>(document: &'a Html, anchor: &str) -> Option<ElementRef<'a>> {
    document
        .select(&ID_SELECTOR)
        .filter(|el| el.value().attr("id") == Some(anchor))
        .find_map(|el| {
            if el.value().name() == "h2" {
                Some(el)
            } else {
                el.ancestors()
                    .filter_map(ElementRef::wrap)
                    .find(|a| a.value().name() == "h2")
            }
        })
}

/// First language heading that is not the metalanguage, and whether the page
/// had nothing but metalanguage headings.
fn first_foreign_heading(document: &Html) -> (Option<ElementRef<'_>>, bool) {
    let mut saw_metalanguage = false;
    for h2 in document.select(&H2_SELECTOR) {
        if is_inside_class(&h2, &["toc"]) || h2.value().attr("id") == Some("mw-toc-heading") {
            continue;
        }
        let name = collapse_whitespace(&h2.text().collect::<String>());
        if name == METALANGUAGE {
            saw_metalanguage = true;
            continue;
        }
        return (Some(h2), false);
    }
    (None, saw_metalanguage)
}

fn subheading_text(el: &ElementRef<'_>) -> Option<String> {
    let heading = match el.value().name() {
        "h3" | "h4" | "h5" => Some(*el),
        _ if has_any_class(el, &["mw-heading"]) => el.select(&SUBHEADING_SELECTOR).next(),
        _ => None,
    }?;
    let text = collapse_whitespace(&heading.text().collect::<String>());
    (!text.is_empty()).then_some(text)
}

fn collect_definitions(list: &ElementRef<'_>, extraction: &mut Extraction) {
    for item in list.children().filter_map(ElementRef::wrap) {
        if item.value().name() != "li" {
            continue;
        }
        if item.text().all(|t| t.trim().is_empty()) {
            continue;
        }
        let mut html = String::new();
        let cleaner = Cleaner::definitions();
        cleaner.write_children(&item, &mut html);
        extraction.definitions.push(html);

        if extraction.cross_reference.is_none() {
            extraction.cross_reference = cross_reference_in(&item);
        }
    }
}

/// The headword a definition item points at: a structural form-of link when
/// present, otherwise the word after "of" in the item's own text.
fn cross_reference_in(item: &ElementRef<'_>) -> Option<String> {
    let structural = item
        .select(&LEMMA_LINK_SELECTOR)
        .map(|link| fold(link.text().collect::<String>().trim()))
        .find(|word| is_headword_like(word));
    if structural.is_some() {
        return structural;
    }
    let mut prose = String::new();
    own_text(item, &mut prose);
    CROSS_REF_PATTERN
        .captures_iter(&prose)
        .map(|caps| fold(caps[1].trim_matches('-')))
        .find(|word| is_headword_like(word))
}

fn is_headword_like(word: &str) -> bool {
    char_len(word) > 1 && !CROSS_REF_STOPLIST.contains(&word)
}

/// Text of a definition item without its nested lists (examples, quotations,
/// sub-senses).
fn own_text(el: &ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(inner) if matches!(inner.name(), "ul" | "ol" | "dl") => {}
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    own_text(&child_el, out);
                }
            }
            _ => {}
        }
    }
}

/// Tables in a section element that are not decorative or nested in another
/// collected table.
fn tables_in<'a>(el: &ElementRef<'a>) -> Vec<ElementRef<'a>> {
    let mut candidates = Vec::new();
    if el.value().name() == "table" {
        candidates.push(*el);
    }
    candidates.extend(el.select(&TABLE_SELECTOR));
    candidates
        .into_iter()
        .filter(|table| {
            !has_any_class(table, &["audiotable"])
                && !is_inside_class(table, &["toc", "sister-project"])
                && !table
                    .ancestors()
                    .filter_map(ElementRef::wrap)
                    .any(|a| a.value().name() == "table")
        })
        .collect()
}

fn clean_table(table: &ElementRef<'_>, target: &str) -> String {
    let mut out = String::new();
    Cleaner::tables(target).write_element(table, &mut out);
    out
}

fn has_any_class(el: &ElementRef<'_>, classes: &[&str]) -> bool {
    el.value().classes().any(|c| classes.contains(&c))
}

fn is_inside_class(el: &ElementRef<'_>, classes: &[&str]) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| has_any_class(&a, classes) || a.value().attr("id").is_some_and(|id| classes.contains(&id)))
}

/// Serializes markup with noise removed and links made inert. In table mode
/// it also strips decorative glyphs, blanks punctuation-only cells and
/// highlights the cell holding the target form.
struct Cleaner<'t> {
    noise_classes: &'static [&'static str],
    noise_tags: &'static [&'static str],
    link_class: Option<&'static str>,
    target: Option<&'t str>,
}

impl<'t> Cleaner<'t> {
    fn definitions() -> Self {
        Self {
            noise_classes: DEFINITION_NOISE_CLASSES,
            noise_tags: DEFINITION_NOISE_TAGS,
            link_class: Some(LINK_CLASS),
            target: None,
        }
    }

    fn tables(target: &'t str) -> Self {
        Self {
            noise_classes: TABLE_NOISE_CLASSES,
            noise_tags: TABLE_NOISE_TAGS,
            link_class: None,
            target: Some(target),
        }
    }

    fn in_table_mode(&self) -> bool {
        self.target.is_some()
    }

    fn is_noise(&self, el: &ElementRef<'_>) -> bool {
        self.noise_tags.contains(&el.value().name()) || has_any_class(el, self.noise_classes)
    }

    fn write_children(&self, el: &ElementRef<'_>, out: &mut String) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => self.write_text(text, out),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.write_element(&child_el, out);
                    }
                }
                _ => {}
            }
        }
    }

    fn write_text(&self, text: &str, out: &mut String) {
        if self.in_table_mode() {
            let kept: String = text.chars().filter(|c| !DECORATIVE_GLYPHS.contains(c)).collect();
            out.push_str(&escape_html(&kept));
        } else {
            out.push_str(&escape_html(text));
        }
    }

    fn write_element(&self, el: &ElementRef<'_>, out: &mut String) {
        if self.is_noise(el) {
            return;
        }
        let name = el.value().name();
        if name == "a" {
            match self.link_class {
                Some(class) => {
                    out.push_str("<span class=\"");
                    out.push_str(class);
                    out.push_str("\">");
                }
                None => out.push_str("<span>"),
            }
            self.write_children(el, out);
            out.push_str("</span>");
            return;
        }

        let mut inner = String::new();
        let mut extra_class = None;
        if !VOID_TAGS.contains(&name) {
            self.write_children(el, &mut inner);
        }
        if self.in_table_mode() && matches!(name, "td" | "th") {
            let text = html_to_text(&inner);
            if !text.chars().any(char::is_alphanumeric) {
                inner.clear();
            } else if name == "td" && self.target.is_some_and(|t| cell_matches(&text, t)) {
                extra_class = Some(HIGHLIGHT_CLASS);
            }
        }

        out.push('<');
        out.push_str(name);
        let mut wrote_class = false;
        for (key, value) in el.value().attrs() {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            if key == "class" {
                wrote_class = true;
                match extra_class {
                    Some(extra) => out.push_str(&escape_html(&format!("{value} {extra}"))),
                    None => out.push_str(&escape_html(value)),
                }
            } else {
                out.push_str(&escape_html(value));
            }
            out.push('"');
        }
        if let (Some(extra), false) = (extra_class, wrote_class) {
            out.push_str(" class=\"");
            out.push_str(extra);
            out.push('"');
        }
        out.push('>');
        if VOID_TAGS.contains(&name) {
            return;
        }
        out.push_str(&inner);
        out.push_str("</");
        out.push_str(name);
        out.push('>');
    }
}

/// A cell matches when the folded target equals one of its comma- or
/// slash-separated forms.
fn cell_matches(cell_text: &str, folded_target: &str) -> bool {
    fold(cell_text)
        .split([',', '/'])
        .any(|form| form.trim() == folded_target)
}

/// Visible text of an HTML fragment with whitespace runs collapsed.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    collapse_whitespace(&fragment.root_element().text().collect::<String>())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Plain text of each top-level item in a definitions list.
pub fn definition_lines(definitions_html: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(definitions_html);
    let Some(list) = fragment.select(&OL_SELECTOR).next() else {
        return Vec::new();
    };
    list.children()
        .filter_map(ElementRef::wrap)
        .filter(|item| item.value().name() == "li")
        .map(|item| collapse_whitespace(&item.text().collect::<String>()))
        .filter(|line| !line.is_empty())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GridCell {
    pub text: String,
    pub header: bool,
    pub highlighted: bool,
}

/// Cleaned tables as rows of cells, for renderers that cannot show HTML.
pub fn table_grids(tables_html: &str) -> Vec<Vec<Vec<GridCell>>> {
    let fragment = Html::parse_fragment(tables_html);
    fragment
        .select(&TABLE_SELECTOR)
        .filter(|table| {
            !table
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| a.value().name() == "table")
        })
        .map(|table| {
            table
                .select(&ROW_SELECTOR)
                .map(|row| {
                    row.children()
                        .filter_map(ElementRef::wrap)
                        .filter(|cell| matches!(cell.value().name(), "td" | "th"))
                        .map(|cell| GridCell {
                            text: collapse_whitespace(&cell.text().collect::<String>()),
                            header: cell.value().name() == "th",
                            highlighted: has_any_class(&cell, &[HIGHLIGHT_CLASS]),
                        })
                        .collect::<Vec<_>>()
                })
                .filter(|row| !row.is_empty())
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ru() -> Language {
        Language::parse("ru")
    }

    const PAGE: &str = r#"<div class="mw-parser-output">
<div class="mw-heading mw-heading2"><h2 id="English">English</h2></div>
<ol><li>an English sense</li></ol>
<div class="mw-heading mw-heading2"><h2 id="Russian">Russian</h2></div>
<div class="mw-heading mw-heading3"><h3 id="Pronunciation">Pronunciation</h3></div>
<table class="audiotable"><tr><td>audio</td></tr></table>
<div class="mw-heading mw-heading3"><h3 id="Participle">Participle</h3></div>
<p><strong>говоря́щий</strong></p>
<ol>
<li><span class="form-of-definition">present active participle of <span class="form-of-definition-link"><a href="/wiki/говорить">говори́ть</a></span></span><sup class="reference">[1]</sup>
<dl><dd>an example of nothing</dd></dl></li>
<li>speaking, talking</li>
<li>  </li>
</ol>
<div class="NavFrame"><table class="inflection-table">
<tr><th>case</th><th>masc.</th></tr>
<tr><td>nom.</td><td><a href="/wiki/x">говоря́щий</a><sup>△</sup></td></tr>
<tr><td>gen.</td><td>говоря́щего<span class="tr">govorjáščevo</span></td></tr>
<tr><td>short</td><td>—</td></tr>
</table></div>
<div class="mw-heading mw-heading2"><h2 id="Ukrainian">Ukrainian</h2></div>
<ol><li>a Ukrainian sense</li></ol>
</div>"#;

    #[test]
    fn reads_only_the_requested_section() {
        let extraction = extract(PAGE, &ru(), "говорящего");
        assert_eq!(extraction.section.as_deref(), Some("Russian"));
        assert_eq!(extraction.definitions.len(), 2);
        assert!(extraction.definitions_html().starts_with("<ol><li>"));
        assert!(!extraction.definitions_html().contains("Ukrainian"));
        assert!(!extraction.definitions_html().contains("English"));
        assert_eq!(extraction.part_of_speech.as_deref(), Some("Participle"));
    }

    #[test]
    fn structural_link_gives_the_cross_reference() {
        let extraction = extract(PAGE, &ru(), "говорящего");
        assert_eq!(extraction.cross_reference.as_deref(), Some("говорить"));
        let first = &extraction.definitions[0];
        assert!(first.contains("<span class=\"rl-link\">говори\u{301}ть</span>"));
        assert!(!first.contains("<a "));
        assert!(!first.contains("[1]"));
    }

    #[test]
    fn tables_are_cleaned_and_highlighted() {
        let extraction = extract(PAGE, &ru(), "говоря\u{301}щего");
        assert_eq!(extraction.tables.len(), 1);
        let table = &extraction.tables[0];
        assert!(!table.contains("audio"));
        assert!(!table.contains("govorjáščevo"));
        assert!(!table.contains('△'));
        assert!(!table.contains("<a "));
        assert!(!table.contains('—'));
        assert!(table.contains("<td class=\"rl-highlight-form\">говоря\u{301}щего</td>"));
        assert_eq!(table.matches(HIGHLIGHT_CLASS).count(), 1);
    }

    #[test]
    fn multi_value_cells_match_any_part() {
        let html = r#"<h2 id="Polish">Polish</h2>
<table><tr><td>forms, formy</td><td>form</td><td>formy/formie</td><td>formya</td></tr></table>"#;
        let extraction = extract(html, &Language::parse("pl"), "Formy");
        let table = &extraction.tables[0];
        assert_eq!(table.matches(HIGHLIGHT_CLASS).count(), 2);
        assert!(table.contains("<td class=\"rl-highlight-form\">forms, formy</td>"));
        assert!(table.contains("<td>form</td>"));
        assert!(table.contains("<td>formya</td>"));

        let only_first = extract(
            r#"<h2 id="Polish">Polish</h2><table><tr><td>forms, formy</td><td>x</td></tr></table>"#,
            &Language::parse("pl"),
            "formy",
        );
        assert_eq!(only_first.tables[0].matches(HIGHLIGHT_CLASS).count(), 1);
    }

    #[test]
    fn textual_cross_reference_skips_stoplist() {
        let html = r#"<h2 id="German">German</h2><ol>
<li>first of all, a greeting</li>
<li>inflection of <i>Haus</i>:
<ol><li>dative plural of nothing</li></ol></li></ol>"#;
        let extraction = extract(html, &Language::parse("de"), "Häusern");
        assert_eq!(extraction.cross_reference.as_deref(), Some("haus"));
        assert_eq!(extraction.definitions.len(), 2);
    }

    #[test]
    fn missing_section_is_empty_not_an_error() {
        let extraction = extract(PAGE, &Language::parse("de"), "x");
        assert!(!extraction.is_usable());
        assert!(extraction.definitions.is_empty());
        assert_eq!(extraction.cross_reference, None);
        assert!(extraction.tables.is_empty());
    }

    #[test]
    fn tables_without_prose_are_still_usable() {
        let html = r#"<h2 id="Russian">Russian</h2><p>see below</p>
<table class="inflection-table"><tr><td>кот</td></tr></table>"#;
        let extraction = extract(html, &ru(), "кот");
        assert!(extraction.is_usable());
        assert!(extraction.definitions.is_empty());
        assert_eq!(extraction.tables.len(), 1);
    }

    #[test]
    fn auto_mode_takes_the_first_foreign_section() {
        let extraction = extract(PAGE, &Language::Auto, "говорящего");
        assert_eq!(extraction.section.as_deref(), Some("Russian"));
        assert!(!extraction.only_metalanguage);

        let english = extract(
            r#"<h2 id="English">English</h2><ol><li>a dog</li></ol>"#,
            &Language::Auto,
            "dog",
        );
        assert!(english.only_metalanguage);
        assert!(!english.is_usable());
    }

    #[test]
    fn unmapped_codes_behave_like_auto() {
        let extraction = extract(PAGE, &Language::parse("xx"), "говорящего");
        assert_eq!(extraction.section.as_deref(), Some("Russian"));
    }

    #[test]
    fn legacy_headline_spans_are_found() {
        let html = r#"<h2><span class="mw-headline" id="Spanish">Spanish</span></h2>
<h3><span class="mw-headline" id="Noun">Noun</span></h3>
<ol><li>house</li></ol><h2><span id="Ladino">Ladino</span></h2><ol><li>home</li></ol>"#;
        let extraction = extract(html, &Language::parse("es"), "casa");
        assert_eq!(extraction.section.as_deref(), Some("Spanish"));
        assert_eq!(extraction.part_of_speech.as_deref(), Some("Noun"));
        assert_eq!(extraction.definitions, vec!["house".to_string()]);
        assert_eq!(extraction.first_gloss().as_deref(), Some("house"));
    }

    #[test]
    fn definition_lines_are_top_level_items() {
        let html = "<ol><li>cat <ol><li>nested</li></ol></li><li> <b>tomcat</b> </li></ol>";
        assert_eq!(definition_lines(html), vec!["cat nested", "tomcat"]);
        assert!(definition_lines("").is_empty());
    }

    #[test]
    fn grids_keep_headers_and_highlights() {
        let html = format!(
            r#"<table><tr><th>case</th><th>sg</th></tr><tr><td>gen.</td><td class="{HIGHLIGHT_CLASS}">ко́шки</td></tr></table>"#
        );
        let grids = table_grids(&html);
        assert_eq!(grids.len(), 1);
        assert_eq!(grids[0].len(), 2);
        assert!(grids[0][0][0].header);
        assert_eq!(grids[0][1][1].text, "ко́шки");
        assert!(grids[0][1][1].highlighted);
        assert!(!grids[0][1][0].highlighted);
    }

    #[test]
    fn text_of_markup() {
        assert_eq!(html_to_text("<b>speaking</b>,\n  <i>talking</i>"), "speaking, talking");
    }
}
