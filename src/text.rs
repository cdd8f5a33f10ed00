//! Normalization of surface text into lookup keys.

use std::ops::RangeInclusive;

use unicode_normalization::UnicodeNormalization;

pub const SOFT_HYPHEN: char = '\u{00AD}';

/// Combining Diacritical Marks block. Vowel signs and viramas of other
/// scripts are spelling, not diacritics, and live outside it.
const COMBINING_DIACRITICS: RangeInclusive<char> = '\u{0300}'..='\u{036F}';

/// Cleans a surface token into the key used for lookups.
///
/// The text is NFC-composed first, so letters with a precomposed form
/// (`й`, `ё`, `é`) keep their marks. Marks that still stand alone after
/// composition and belong to the Combining Diacritical Marks block are
/// dropped; in practice these are stress accents such as the acute in
/// `говори́т`. Soft hyphens are removed. Case is preserved.
pub fn lookup_key(surface: &str) -> String {
    surface
        .nfc()
        .filter(|ch| *ch != SOFT_HYPHEN && !COMBINING_DIACRITICS.contains(ch))
        .collect()
}

/// Case-folded lookup key, used for cache keys and all comparisons.
pub fn fold(surface: &str) -> String {
    lookup_key(surface).to_lowercase()
}

/// Upper-cases the first character, leaving the rest untouched.
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Minimal HTML escaping for text and attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_stress_accents_and_soft_hyphens() {
        assert_eq!(lookup_key("говори\u{301}т"), "говорит");
        assert_eq!(lookup_key("Ver\u{AD}hand\u{AD}lung"), "Verhandlung");
    }

    #[test]
    fn keeps_precomposed_letters() {
        assert_eq!(lookup_key("говорящий"), "говорящий");
        assert_eq!(lookup_key("café"), "café");
        // decomposed input is recomposed rather than stripped
        assert_eq!(lookup_key("e\u{308}lan"), "ëlan");
        assert_eq!(lookup_key("е\u{308}лка"), "ёлка");
    }

    #[test]
    fn keeps_vowel_signs_of_other_scripts() {
        assert_eq!(lookup_key("हिन्दी"), "हिन्दी");
        assert_eq!(lookup_key("ที่"), "ที่");
        assert_eq!(lookup_key("বাংলা"), "বাংলা");
        assert_eq!(fold("ភាសាខ្មែរ"), "ភាសាខ្មែរ");
    }

    #[test]
    fn folding_and_capitalizing() {
        assert_eq!(fold("Говори\u{301}т"), "говорит");
        assert_eq!(capitalize("haus"), "Haus");
        assert_eq!(capitalize("ёлка"), "Ёлка");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
    }
}
