//! Heuristic back-formation of dictionary headwords from inflected forms.
//!
//! Each language with a table gets an ordered list of `(ending, replacement)`
//! rules. Rules are tried longest ending first; for every rule whose ending
//! closes the surface form, `stem + replacement` becomes a candidate.

use once_cell::sync::Lazy;

use crate::language::Language;

/// Shortest stem a rule may leave behind, in characters.
pub const MIN_STEM_CHARS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuffixRule {
    pub ending: &'static str,
    pub replacement: &'static str,
}

#[derive(Debug)]
pub struct SuffixTable {
    rules: Vec<SuffixRule>,
}

impl SuffixTable {
    fn new(pairs: &[(&'static str, &'static str)]) -> Self {
        let mut rules: Vec<SuffixRule> = pairs
            .iter()
            .map(|&(ending, replacement)| SuffixRule { ending, replacement })
            .collect();
        // Stable: rules with equal-length endings keep their listed order.
        rules.sort_by_key(|rule| std::cmp::Reverse(rule.ending.chars().count()));
        Self { rules }
    }

    pub fn rules(&self) -> &[SuffixRule] {
        &self.rules
    }

    /// Candidate headwords for `surface`, in rule order, without duplicates and
    /// never including `surface` itself.
    pub fn generate_candidates(&self, surface: &str) -> Vec<String> {
        let surface_chars = surface.chars().count();
        let mut out: Vec<String> = Vec::new();
        for rule in &self.rules {
            let Some(stem) = surface.strip_suffix(rule.ending) else {
                continue;
            };
            if surface_chars - rule.ending.chars().count() < MIN_STEM_CHARS {
                continue;
            }
            let candidate = format!("{stem}{}", rule.replacement);
            if candidate != surface && !out.contains(&candidate) {
                out.push(candidate);
            }
        }
        out
    }
}

static RUSSIAN: Lazy<SuffixTable> = Lazy::new(|| {
    SuffixTable::new(&[
        // reflexive participles
        ("ящимися", "ться"),
        ("ящимся", "ться"),
        ("ящиеся", "ться"),
        ("ящийся", "ться"),
        ("ющимися", "ться"),
        ("ющимся", "ться"),
        ("ющиеся", "ться"),
        ("ющийся", "ться"),
        ("ившимися", "ться"),
        ("ившимся", "ться"),
        ("ившиеся", "ться"),
        ("ившийся", "ться"),
        ("ащимися", "ть"),
        ("ащимся", "ть"),
        ("ащиеся", "ть"),
        ("ащийся", "ть"),
        // passive participles
        ("ённых", "ённый"),
        ("енных", "енный"),
        ("анных", "анный"),
        ("янных", "янный"),
        ("ённым", "ённый"),
        ("енным", "енный"),
        ("анным", "анный"),
        ("янным", "янный"),
        ("ённой", "ённый"),
        ("енной", "енный"),
        ("анной", "анный"),
        ("янной", "янный"),
        ("ённом", "ённый"),
        ("енном", "енный"),
        ("анном", "анный"),
        ("янном", "янный"),
        ("ённую", "ённый"),
        ("енную", "енный"),
        ("анную", "анный"),
        ("янную", "янный"),
        ("енными", "енный"),
        ("анными", "анный"),
        ("ённые", "ённый"),
        ("енные", "енный"),
        // adjectives
        ("ыми", "ый"),
        ("ими", "ий"),
        ("ому", "ый"),
        ("ему", "ий"),
        ("ого", "ый"),
        ("его", "ий"),
        ("ой", "ый"),
        ("ей", "ий"),
        ("ую", "ый"),
        ("юю", "ий"),
        ("ые", "ый"),
        ("ие", "ий"),
        ("ых", "ый"),
        ("их", "ий"),
        ("ом", "ий"),
        ("ом", "ый"),
        // nouns
        ("ам", "а"),
        ("ям", "я"),
        ("ов", ""),
        ("ев", ""),
        ("ей", "ь"),
        ("ами", "а"),
        ("ями", "я"),
        ("ах", "а"),
        ("ях", "я"),
        // verbs
        ("ишь", "ить"),
        ("ешь", "ать"),
        ("ёшь", "ть"),
        ("ит", "ить"),
        ("ет", "ать"),
        ("ёт", "ть"),
        ("им", "ить"),
        ("ем", "ать"),
        ("ём", "ть"),
        ("ите", "ить"),
        ("ете", "ать"),
        ("ёте", "ть"),
        ("ят", "ить"),
        ("ют", "ать"),
        ("ут", "ть"),
        ("ил", "ить"),
        ("ал", "ать"),
        ("ял", "ять"),
        ("ел", "еть"),
        ("ила", "ить"),
        ("ала", "ать"),
        ("яла", "ять"),
        ("ела", "еть"),
        ("или", "ить"),
        ("али", "ать"),
        ("яли", "ять"),
        ("ели", "еть"),
        ("ло", "ть"),
        ("ли", "ть"),
        ("ла", "ть"),
        // bare case endings
        ("а", ""),
        ("у", ""),
        ("е", ""),
        ("и", ""),
        ("ы", ""),
        ("й", ""),
    ])
});

/// Suffix table for a language code, if the language has one.
pub fn table_for(code: &str) -> Option<&'static SuffixTable> {
    match code {
        "ru" => Some(&*RUSSIAN),
        _ => None,
    }
}

/// Candidates for `surface` under `language`; empty for languages without a
/// table, including auto-detect.
pub fn generate_candidates(surface: &str, language: &Language) -> Vec<String> {
    table_for(language.code())
        .map(|table| table.generate_candidates(surface))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ru(word: &str) -> Vec<String> {
        generate_candidates(word, &Language::parse("ru"))
    }

    #[test]
    fn rules_are_longest_ending_first() {
        let table = table_for("ru").unwrap();
        let lengths: Vec<usize> = table.rules().iter().map(|r| r.ending.chars().count()).collect();
        assert!(lengths.windows(2).all(|pair| pair[0] >= pair[1]));
        assert_eq!(table.rules()[0].ending, "ившимися");
    }

    #[test]
    fn adjectival_genitive_reaches_the_headword() {
        let forms = ru("говорящего");
        assert_eq!(forms.first().map(String::as_str), Some("говорящий"));
        assert!(!forms.contains(&"говорящего".to_string()));
    }

    #[test]
    fn equal_length_rules_keep_listed_order() {
        // "ом" maps to both "ий" and "ый"; "ий" is listed first.
        let forms = ru("новом");
        let ij = forms.iter().position(|f| f == "новий").unwrap();
        let yj = forms.iter().position(|f| f == "новый").unwrap();
        assert!(ij < yj);
    }

    #[test]
    fn verbs_and_participles() {
        assert!(ru("говорит").contains(&"говорить".to_string()));
        assert_eq!(ru("занимающимися").first().map(String::as_str), Some("заниматься"));
        assert!(ru("книгами").contains(&"книга".to_string()));
    }

    #[test]
    fn stem_must_stay_viable() {
        // Stripping "ой" from "мой" leaves too little.
        assert!(!ru("мой").contains(&"мый".to_string()));
        assert!(ru("да").is_empty());
    }

    #[test]
    fn output_has_no_duplicates() {
        let forms = ru("красными");
        let mut sorted = forms.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), forms.len());
    }

    #[test]
    fn languages_without_tables_yield_nothing() {
        assert!(generate_candidates("Häuser", &Language::parse("de")).is_empty());
        assert!(generate_candidates("говорящего", &Language::Auto).is_empty());
    }
}
