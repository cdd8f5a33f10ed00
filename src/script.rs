//! Per-language token patterns used to find lookup candidates in raw text.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::language::Language;

/// What counts as a lookup candidate for one language.
///
/// `presence_test` is a cheap superset check; text that fails it is never
/// scanned with `match_expression`.
#[derive(Debug)]
pub struct TokenPattern {
    match_expression: Regex,
    presence_test: Regex,
    min_chars: usize,
}

/// A run of source text matching a [`TokenPattern`], with byte offsets into
/// the text it was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

impl TokenPattern {
    fn new(class: &str, min_chars: usize, presence: &str) -> Self {
        Self {
            match_expression: Regex::new(&format!("[{class}]{{{min_chars},}}"))
                .expect("token pattern compiles"),
            presence_test: Regex::new(presence).expect("presence test compiles"),
            min_chars,
        }
    }

    pub fn is_present(&self, text: &str) -> bool {
        self.presence_test.is_match(text)
    }

    pub fn min_chars(&self) -> usize {
        self.min_chars
    }

    /// Finds every candidate in `text`, left to right.
    ///
    /// Hyphens and apostrophes at either edge of a run are not part of the
    /// candidate, and a candidate must contain at least one letter.
    pub fn candidates<'a>(&self, text: &'a str) -> Vec<Candidate<'a>> {
        if !self.is_present(text) {
            return Vec::new();
        }
        self.match_expression
            .find_iter(text)
            .filter_map(|m| {
                let raw = m.as_str();
                let trimmed_start = raw.trim_start_matches(is_edge_punct);
                let start = m.start() + (raw.len() - trimmed_start.len());
                let trimmed = trimmed_start.trim_end_matches(is_edge_punct);
                let end = start + trimmed.len();
                let candidate = &text[start..end];
                let letters = candidate.chars().filter(|c| c.is_alphabetic()).count();
                if letters == 0 || candidate.chars().count() < self.min_chars {
                    return None;
                }
                Some(Candidate {
                    text: candidate,
                    start,
                    end,
                })
            })
            .collect()
    }
}

fn is_edge_punct(ch: char) -> bool {
    matches!(ch, '-' | '\'' | '\u{2019}' | '\u{00AD}')
}

const SOFT: &str = r"\x{AD}";
const CYRILLIC_MARKS: &str = r"\x{300}\x{301}\x{AD}";

struct ScriptRule {
    codes: &'static [&'static str],
    class: &'static str,
    min_chars: usize,
    presence: &'static str,
    extra: &'static str,
}

const fn rule(
    codes: &'static [&'static str],
    class: &'static str,
    min_chars: usize,
    presence: &'static str,
    extra: &'static str,
) -> ScriptRule {
    ScriptRule {
        codes,
        class,
        min_chars,
        presence,
        extra,
    }
}

static SCRIPT_RULES: &[ScriptRule] = &[
    // Cyrillic
    rule(&["ru"], r"а-яА-ЯёЁ\-", 2, r"[а-яА-ЯёЁ]", CYRILLIC_MARKS),
    rule(&["uk"], r"а-яА-ЯёЁіїєґІЇЄҐ'’\-", 2, r"[а-яА-ЯіїєґІЇЄҐ]", CYRILLIC_MARKS),
    rule(&["be"], r"а-яА-ЯёЁіўІЎ'’\-", 2, r"[а-яА-ЯіўІЎ]", CYRILLIC_MARKS),
    rule(&["bg"], r"а-яА-Я\-", 2, r"[а-яА-Я]", CYRILLIC_MARKS),
    rule(&["sr"], r"а-яА-ЯђјљњћџЂЈЉЊЋЏ\-", 2, r"(?i)[а-яђјљњћџ]", CYRILLIC_MARKS),
    rule(&["mk"], r"а-яА-ЯѓѕјљњќџЃЅЈЉЊЌЏ\-", 2, r"(?i)[а-яѓѕќџ]", CYRILLIC_MARKS),
    rule(&["mn"], r"а-яА-ЯёЁөүӨҮ\-", 2, r"[а-яА-ЯөүӨҮ]", CYRILLIC_MARKS),
    rule(&["kk"], r"а-яА-ЯәғқңөұүһіӘҒҚҢӨҰҮҺІ\-", 2, r"(?i)[а-яәғқңұүһі]", CYRILLIC_MARKS),
    // Latin with diacritics
    rule(&["de"], r"a-zA-ZäöüÄÖÜß\-", 2, r"[a-zA-ZäöüÄÖÜß]", SOFT),
    rule(&["fr"], r"a-zA-ZàâäéèêëïîôùûüÿçœæÀÂÄÉÈÊËÏÎÔÙÛÜŸÇŒÆ'’\-", 2, r"[a-zA-Z]", SOFT),
    rule(&["es"], r"a-zA-ZáéíóúüñÁÉÍÓÚÜÑ\-", 2, r"[a-zA-Z]", SOFT),
    rule(&["it"], r"a-zA-ZàèéìíîòóùúÀÈÉÌÍÎÒÓÙÚ\-", 2, r"[a-zA-Z]", SOFT),
    rule(&["pt"], r"a-zA-ZàáâãçéêíóôõúÀÁÂÃÇÉÊÍÓÔÕÚ\-", 2, r"[a-zA-Z]", SOFT),
    rule(&["pl"], r"a-zA-ZąćęłńóśźżĄĆĘŁŃÓŚŹŻ\-", 2, r"[a-zA-Ząćęłńóśźż]", SOFT),
    rule(&["cs"], r"a-zA-ZáčďéěíňóřšťúůýžÁČĎÉĚÍŇÓŘŠŤÚŮÝŽ\-", 2, r"[a-zA-Z]", SOFT),
    rule(&["sk"], r"a-zA-ZáäčďéíĺľňóôŕšťúýžÁÄČĎÉÍĹĽŇÓÔŔŠŤÚÝŽ\-", 2, r"[a-zA-Z]", SOFT),
    rule(&["hu"], r"a-zA-ZáéíóöőúüűÁÉÍÓÖŐÚÜŰ\-", 2, r"[a-zA-Z]", SOFT),
    rule(&["ro"], r"a-zA-ZăâîșțĂÂÎȘȚ\-", 2, r"[a-zA-Z]", SOFT),
    rule(&["hr"], r"a-zA-ZčćđšžČĆĐŠŽ\-", 2, r"[a-zA-Z]", SOFT),
    rule(&["sl"], r"a-zA-ZčšžČŠŽ\-", 2, r"[a-zA-Z]", SOFT),
    rule(&["sv"], r"a-zA-ZåäöÅÄÖ\-", 2, r"[a-zA-ZåäöÅÄÖ]", SOFT),
    rule(&["da", "no"], r"a-zA-ZæøåÆØÅ\-", 2, r"[a-zA-ZæøåÆØÅ]", SOFT),
    rule(&["fi"], r"a-zA-ZäöÄÖ\-", 2, r"[a-zA-ZäöÄÖ]", SOFT),
    rule(&["is"], r"a-zA-ZáðéíóúýþæöÁÐÉÍÓÚÝÞÆÖ\-", 2, r"[a-zA-Z]", SOFT),
    rule(&["lt"], r"a-zA-ZąčęėįšųūžĄČĘĖĮŠŲŪŽ\-", 2, r"[a-zA-Z]", SOFT),
    rule(&["lv"], r"a-zA-ZāčēģīķļņšūžĀČĒĢĪĶĻŅŠŪŽ\-", 2, r"[a-zA-Z]", SOFT),
    rule(&["et"], r"a-zA-ZäöõüšžÄÖÕÜŠŽ\-", 2, r"[a-zA-Z]", SOFT),
    rule(&["sq"], r"a-zA-ZçëÇË\-", 2, r"[a-zA-Z]", SOFT),
    rule(&["ca"], r"a-zA-ZàçèéíïòóúüÀÇÈÉÍÏÒÓÚÜ·'’\-", 2, r"[a-zA-Z]", SOFT),
    rule(&["cy"], r"a-zA-ZâêîôûŵŷÂÊÎÔÛŴŶ\-", 2, r"[a-zA-Z]", SOFT),
    rule(&["ga"], r"a-zA-ZáéíóúÁÉÍÓÚ\-", 2, r"[a-zA-Z]", SOFT),
    rule(&["tr"], r"a-zA-ZçğıöşüÇĞİÖŞÜ\-", 2, r"[a-zA-Z]", SOFT),
    rule(&["az"], r"a-zA-ZçəğıöşüÇƏĞİÖŞÜ\-", 2, r"[a-zA-Z]", SOFT),
    rule(
        &["vi"],
        r"a-zA-ZàáạảãăắằẳẵặâấầẩẫậèéẹẻẽêếềểễệìíịỉĩòóọỏõôốồổỗộơớờởỡợùúụủũưứừửữựỳýỵỷỹđĐ\-",
        2,
        r"[a-zA-Zàáạảãăắằẳẵặâấầẩẫậ]",
        SOFT,
    ),
    rule(&["af"], r"a-zA-ZêëïôûÊËÏÔÛ'’\-", 2, r"[a-zA-Z]", SOFT),
    rule(&["eo"], r"a-zA-ZĉĝĥĵŝŭĈĜĤĴŜŬ\-", 2, r"[a-zA-Z]", SOFT),
    rule(
        &["nl", "eu", "id", "ms", "tl", "sw", "la", "uz"],
        r"a-zA-Z'’\-",
        2,
        r"[a-zA-Z]",
        SOFT,
    ),
    // Greek
    rule(&["el", "grc"], r"α-ωΑ-Ωά-ώΆ-Ώἀ-ῼ\-", 2, r"[α-ωΑ-Ωἀ-ῼ]", SOFT),
    // Scripts written without spaces: any run of the script is a candidate
    rule(
        &["ja"],
        r"\x{3040}-\x{309F}\x{30A0}-\x{30FF}\x{4E00}-\x{9FFF}",
        1,
        r"[\x{3040}-\x{309F}\x{30A0}-\x{30FF}\x{4E00}-\x{9FFF}]",
        "",
    ),
    rule(&["zh"], r"\x{4E00}-\x{9FFF}", 1, r"[\x{4E00}-\x{9FFF}]", ""),
    rule(
        &["ko"],
        r"\x{AC00}-\x{D7AF}\x{1100}-\x{11FF}",
        1,
        r"[\x{AC00}-\x{D7AF}]",
        "",
    ),
    rule(&["th"], r"\x{0E00}-\x{0E7F}", 2, r"[\x{0E00}-\x{0E7F}]", ""),
    rule(&["km"], r"\x{1780}-\x{17FF}", 2, r"[\x{1780}-\x{17FF}]", ""),
    rule(&["my"], r"\x{1000}-\x{109F}", 2, r"[\x{1000}-\x{109F}]", ""),
    rule(&["lo"], r"\x{0E80}-\x{0EFF}", 2, r"[\x{0E80}-\x{0EFF}]", ""),
    // South Asian
    rule(&["hi", "ne", "sa"], r"\x{0900}-\x{097F}", 2, r"[\x{0900}-\x{097F}]", ""),
    rule(&["bn"], r"\x{0980}-\x{09FF}", 2, r"[\x{0980}-\x{09FF}]", ""),
    rule(&["ta"], r"\x{0B80}-\x{0BFF}", 2, r"[\x{0B80}-\x{0BFF}]", ""),
    rule(&["te"], r"\x{0C00}-\x{0C7F}", 2, r"[\x{0C00}-\x{0C7F}]", ""),
    rule(&["pa"], r"\x{0A00}-\x{0A7F}", 2, r"[\x{0A00}-\x{0A7F}]", ""),
    rule(&["si"], r"\x{0D80}-\x{0DFF}", 2, r"[\x{0D80}-\x{0DFF}]", ""),
    // Right-to-left scripts tokenize like any other
    rule(&["ar", "ur"], r"\x{0600}-\x{06FF}", 2, r"[\x{0600}-\x{06FF}]", ""),
    rule(
        &["fa"],
        r"\x{0600}-\x{06FF}\x{0750}-\x{077F}",
        2,
        r"[\x{0600}-\x{06FF}]",
        "",
    ),
    rule(&["he"], r"\x{0590}-\x{05FF}", 2, r"[\x{0590}-\x{05FF}]", ""),
    // Caucasian
    rule(&["ka"], r"\x{10A0}-\x{10FF}", 2, r"[\x{10A0}-\x{10FF}]", ""),
    rule(&["hy"], r"\x{0530}-\x{058F}", 2, r"[\x{0530}-\x{058F}]", ""),
];

static PATTERNS: Lazy<HashMap<&'static str, TokenPattern>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for rule in SCRIPT_RULES {
        for &code in rule.codes {
            let class = format!("{}{}", rule.class, rule.extra);
            map.insert(code, TokenPattern::new(&class, rule.min_chars, rule.presence));
        }
    }
    map
});

static DEFAULT_PATTERN: Lazy<TokenPattern> = Lazy::new(|| {
    TokenPattern::new(
        r"\p{Script=Latin}\p{Script=Cyrillic}\p{Script=Greek}\p{M}'\x{2019}\-\x{AD}",
        2,
        r"[\p{Script=Latin}\p{Script=Cyrillic}\p{Script=Greek}]",
    )
});

/// Token pattern for a language code; `auto` and unknown codes get the mixed
/// Latin/Cyrillic/Greek default.
pub fn classify(language_code: &str) -> &'static TokenPattern {
    PATTERNS
        .get(language_code)
        .unwrap_or_else(|| &*DEFAULT_PATTERN)
}

pub fn pattern_for(language: &Language) -> &'static TokenPattern {
    classify(language.code())
}

pub fn default_pattern() -> &'static TokenPattern {
    &DEFAULT_PATTERN
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words<'a>(pattern: &TokenPattern, text: &'a str) -> Vec<&'a str> {
        pattern.candidates(text).into_iter().map(|c| c.text).collect()
    }

    #[test]
    fn russian_tokens_with_stress_marks() {
        let pattern = classify("ru");
        assert_eq!(
            words(pattern, "Он говори\u{301}т: «Привет, мир!» и ушёл."),
            vec!["Он", "говори\u{301}т", "Привет", "мир", "ушёл"]
        );
        // Single letters are below the minimum
        assert!(words(pattern, "и в к").is_empty());
    }

    #[test]
    fn presence_test_short_circuits() {
        let pattern = classify("ru");
        assert!(!pattern.is_present("only latin text"));
        assert!(pattern.candidates("only latin text").is_empty());
    }

    #[test]
    fn offsets_point_into_source() {
        let text = "ein gro\u{AD}ßes Haus";
        let pattern = classify("de");
        let found = pattern.candidates(text);
        assert_eq!(found.len(), 3);
        for c in &found {
            assert_eq!(&text[c.start..c.end], c.text);
        }
        assert_eq!(found[1].text, "gro\u{AD}ßes");
    }

    #[test]
    fn edge_hyphens_are_trimmed() {
        let pattern = classify("de");
        assert_eq!(words(pattern, "--Haus- und -- Hof"), vec!["Haus", "und", "Hof"]);
    }

    #[test]
    fn unknown_and_auto_fall_back_to_default() {
        let auto = classify("auto");
        assert!(std::ptr::eq(auto, default_pattern()));
        assert!(std::ptr::eq(classify("xx"), default_pattern()));
        assert_eq!(
            words(auto, "l’homme говорит λόγος 漢字"),
            vec!["l’homme", "говорит", "λόγος"]
        );
    }

    #[test]
    fn scripts_without_spaces_match_runs() {
        assert_eq!(words(classify("ja"), "これは日本語です。"), vec!["これは日本語です"]);
        assert_eq!(words(classify("zh"), "中"), vec!["中"]);
    }

    #[test]
    fn right_to_left_scripts() {
        assert_eq!(words(classify("he"), "שלום עולם"), vec!["שלום", "עולם"]);
        assert_eq!(words(classify("ar"), "مرحبا بالعالم"), vec!["مرحبا", "بالعالم"]);
    }

    #[test]
    fn two_letter_words_are_candidates() {
        assert_eq!(words(classify("es"), "de la casa"), vec!["de", "la", "casa"]);
    }
}
