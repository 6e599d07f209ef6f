//! Character-set classification: what counts as English, what needs
//! translating, and which scripts a fragment is written in.
//!
//! [`contains_non_english`] is the crate's definition of "done". It gates the
//! corrective prompt, the force-English fallback, the archive scan and the
//! output validator, so it must stay total and deterministic: every `char`
//! is classified by code point alone.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;

/// Typographic and currency symbols above U+00FF that English text uses.
const ALLOWED_SYMBOLS: &[char] = &[
    '•', '·', '–', '—', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '…', '™', '®', '©', '°',
    '±', '²', '³', '¹', 'º', '¼', '½', '¾', '×', '÷', '€', '£', '¥', '¢',
];

/// Mathematical Operators block.
const MATH_OPERATORS: std::ops::RangeInclusive<u32> = 0x2200..=0x22FF;

/// Whether a single character is acceptable in English output.
pub fn is_english_safe(c: char) -> bool {
    let code = c as u32;
    code <= 0xFF || ALLOWED_SYMBOLS.contains(&c) || MATH_OPERATORS.contains(&code)
}

/// `true` when any character of `text` falls outside the English-safe set.
pub fn contains_non_english(text: &str) -> bool {
    text.chars().any(|c| !is_english_safe(c))
}

/// Replace every character that is not English-safe with `placeholder`.
///
/// Last-resort fallback: the result always passes [`contains_non_english`],
/// at the cost of losing whatever the replaced characters meant. Applying it
/// twice yields the same string as applying it once.
pub fn force_english(text: &str, placeholder: char) -> String {
    let placeholder = if is_english_safe(placeholder) {
        placeholder
    } else {
        '?'
    };
    text.chars()
        .map(|c| if is_english_safe(c) { c } else { placeholder })
        .collect()
}

// ── Skip classification ──────────────────────────────────────────────────

static RE_SYMBOLS_ONLY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^[\d\s.,\-+%$€£¥/:;°=*#@&()\[\]{}"'\\|<>~`^_]+$"#).unwrap()
});

static RE_PART_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9\-_./\s]{0,29}$").unwrap());

static RE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(?:https?://|www\.)\S+$").unwrap());

static RE_EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.+\-]+@[A-Za-z0-9_.\-]+$").unwrap());

static RE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Za-z]:\\\S*|/[\w.\-]+(?:/[\w.\-]*)*)$").unwrap()
});

/// Decide whether `text` can pass through untranslated.
///
/// True for blank text, tiny non-alphabetic tokens, pure numbers/symbols,
/// part-number-like tokens, URLs, e-mail addresses, filesystem paths, and
/// anything already made only of English-safe characters.
pub fn should_skip(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return true;
    }

    if text.chars().count() <= 2 && !text.chars().any(char::is_alphabetic) {
        return true;
    }

    if RE_SYMBOLS_ONLY.is_match(text) {
        return true;
    }

    if RE_PART_NUMBER.is_match(text) && !contains_non_english(text) {
        return true;
    }

    if RE_URL.is_match(text) || RE_EMAIL.is_match(text) || RE_PATH.is_match(text) {
        return true;
    }

    !contains_non_english(text)
}

/// `true` when `text` is short enough to be kept as a terminology entry:
/// at most 50 characters and at most 5 whitespace-separated words.
pub fn is_term(text: &str) -> bool {
    text.chars().count() <= 50 && text.split_whitespace().count() <= 5
}

// ── Language detection ───────────────────────────────────────────────────

/// Scripts recognised by [`detect_languages`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Chinese,
    Korean,
    Japanese,
    Arabic,
    Cyrillic,
    Thai,
    Hindi,
    Hebrew,
    Greek,
    Vietnamese,
}

impl Language {
    pub const ALL: [Language; 10] = [
        Language::Chinese,
        Language::Korean,
        Language::Japanese,
        Language::Arabic,
        Language::Cyrillic,
        Language::Thai,
        Language::Hindi,
        Language::Hebrew,
        Language::Greek,
        Language::Vietnamese,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Chinese => "chinese",
            Language::Korean => "korean",
            Language::Japanese => "japanese",
            Language::Arabic => "arabic",
            Language::Cyrillic => "cyrillic",
            Language::Thai => "thai",
            Language::Hindi => "hindi",
            Language::Hebrew => "hebrew",
            Language::Greek => "greek",
            Language::Vietnamese => "vietnamese",
        }
    }

    fn pattern(self) -> &'static Regex {
        // Indexed by discriminant; order matches `Language::ALL`.
        static PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
            [
                r"[\x{4E00}-\x{9FFF}\x{3400}-\x{4DBF}]",
                r"[\x{AC00}-\x{D7AF}\x{1100}-\x{11FF}]",
                r"[\x{3040}-\x{309F}\x{30A0}-\x{30FF}]",
                r"[\x{0600}-\x{06FF}]",
                r"[\x{0400}-\x{04FF}]",
                r"[\x{0E00}-\x{0E7F}]",
                r"[\x{0900}-\x{097F}]",
                r"[\x{0590}-\x{05FF}]",
                r"[\x{0370}-\x{03FF}]",
                r"[\x{1E00}-\x{1EFF}]",
            ]
            .into_iter()
            .map(|re| Regex::new(re).unwrap())
            .collect()
        });

        &PATTERNS[self as usize]
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every script that appears in `text`. Mixed-script text yields several.
pub fn detect_languages(text: &str) -> BTreeSet<Language> {
    Language::ALL
        .into_iter()
        .filter(|lang| lang.pattern().is_match(text))
        .collect()
}

/// Upper-cased, comma-separated list for prompt hints, e.g. `"CHINESE, GREEK"`.
pub fn language_hint(langs: &BTreeSet<Language>) -> String {
    langs
        .iter()
        .map(|l| l.as_str().to_uppercase())
        .collect::<Vec<_>>()
        .join(", ")
}
