use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Language the dictionary source itself is written in. Its section is never
/// picked by auto-detection.
pub const METALANGUAGE: &str = "English";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageInfo {
    pub code: &'static str,
    pub name: &'static str,
}

const fn lang(code: &'static str, name: &'static str) -> LanguageInfo {
    LanguageInfo { code, name }
}

static LANGUAGES: &[LanguageInfo] = &[
    lang("af", "Afrikaans"),
    lang("ar", "Arabic"),
    lang("az", "Azerbaijani"),
    lang("be", "Belarusian"),
    lang("bg", "Bulgarian"),
    lang("bn", "Bengali"),
    lang("ca", "Catalan"),
    lang("cs", "Czech"),
    lang("cy", "Welsh"),
    lang("da", "Danish"),
    lang("de", "German"),
    lang("el", "Greek"),
    lang("eo", "Esperanto"),
    lang("es", "Spanish"),
    lang("et", "Estonian"),
    lang("eu", "Basque"),
    lang("fa", "Persian"),
    lang("fi", "Finnish"),
    lang("fr", "French"),
    lang("ga", "Irish"),
    lang("grc", "Ancient Greek"),
    lang("he", "Hebrew"),
    lang("hi", "Hindi"),
    lang("hr", "Croatian"),
    lang("hu", "Hungarian"),
    lang("hy", "Armenian"),
    lang("id", "Indonesian"),
    lang("is", "Icelandic"),
    lang("it", "Italian"),
    lang("ja", "Japanese"),
    lang("ka", "Georgian"),
    lang("kk", "Kazakh"),
    lang("km", "Khmer"),
    lang("ko", "Korean"),
    lang("la", "Latin"),
    lang("lo", "Lao"),
    lang("lt", "Lithuanian"),
    lang("lv", "Latvian"),
    lang("mk", "Macedonian"),
    lang("mn", "Mongolian"),
    lang("ms", "Malay"),
    lang("my", "Burmese"),
    lang("ne", "Nepali"),
    lang("nl", "Dutch"),
    lang("no", "Norwegian"),
    lang("pa", "Punjabi"),
    lang("pl", "Polish"),
    lang("pt", "Portuguese"),
    lang("ro", "Romanian"),
    lang("ru", "Russian"),
    lang("sa", "Sanskrit"),
    lang("si", "Sinhalese"),
    lang("sk", "Slovak"),
    lang("sl", "Slovene"),
    lang("sq", "Albanian"),
    lang("sr", "Serbo-Croatian"),
    lang("sv", "Swedish"),
    lang("sw", "Swahili"),
    lang("ta", "Tamil"),
    lang("te", "Telugu"),
    lang("th", "Thai"),
    lang("tl", "Tagalog"),
    lang("tr", "Turkish"),
    lang("uk", "Ukrainian"),
    lang("ur", "Urdu"),
    lang("uz", "Uzbek"),
    lang("vi", "Vietnamese"),
    lang("zh", "Chinese"),
];

pub fn known_languages() -> &'static [LanguageInfo] {
    LANGUAGES
}

pub fn language_info(code: &str) -> Option<&'static LanguageInfo> {
    LANGUAGES.iter().find(|info| info.code == code)
}

/// Turns a section name into the heading anchor the dictionary renders.
pub fn anchor_for(name: &str) -> String {
    name.replace(' ', "_")
}

/// Target language of a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Language {
    /// Pick the first non-metalanguage section of each document.
    #[default]
    Auto,
    Code(String),
}

impl Language {
    pub fn parse(code: &str) -> Self {
        let code = code.trim().to_lowercase();
        if code.is_empty() || code == "auto" {
            Language::Auto
        } else {
            Language::Code(code)
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Language::Auto => "auto",
            Language::Code(code) => code,
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Language::Auto)
    }

    /// Dictionary section name for this language, if one is mapped.
    pub fn section_name(&self) -> Option<&'static str> {
        match self {
            Language::Auto => None,
            Language::Code(code) => language_info(code).map(|info| info.name),
        }
    }

    pub fn section_anchor(&self) -> Option<String> {
        self.section_name().map(anchor_for)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Language::parse(s))
    }
}

impl From<String> for Language {
    fn from(value: String) -> Self {
        Language::parse(&value)
    }
}

impl From<Language> for String {
    fn from(value: Language) -> Self {
        value.code().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codes() {
        assert_eq!(Language::parse("auto"), Language::Auto);
        assert_eq!(Language::parse(""), Language::Auto);
        assert_eq!(Language::parse(" RU "), Language::Code("ru".into()));
    }

    #[test]
    fn section_anchors() {
        assert_eq!(Language::parse("ru").section_anchor().as_deref(), Some("Russian"));
        assert_eq!(
            Language::parse("grc").section_anchor().as_deref(),
            Some("Ancient_Greek")
        );
        assert_eq!(Language::parse("xx").section_anchor(), None);
        assert_eq!(Language::Auto.section_anchor(), None);
    }

    #[test]
    fn registry_codes_are_unique() {
        let mut codes: Vec<_> = known_languages().iter().map(|l| l.code).collect();
        codes.sort_unstable();
        let before = codes.len();
        codes.dedup();
        assert_eq!(before, codes.len());
    }

    #[test]
    fn serde_uses_plain_codes() {
        let json = serde_json::to_string(&Language::parse("de")).unwrap();
        assert_eq!(json, "\"de\"");
        let back: Language = serde_json::from_str("\"auto\"").unwrap();
        assert!(back.is_auto());
    }
}
