//! Prompts for translation and vision analysis.
//!
//! Centralising every prompt here keeps prompt wording out of the retry and
//! parsing logic, and lets unit tests inspect prompts without a model.

use crate::language::{language_hint, Language};
use std::collections::BTreeSet;

/// Shared translation rules, prefixed by an optional language hint.
///
/// Used as the system instruction for both the single-item and the batch path.
pub fn translation_system_prompt(langs: &BTreeSet<Language>) -> String {
    let hint = if langs.is_empty() {
        String::new()
    } else {
        format!(
            "\nDETECTED LANGUAGES: {} - pay special attention to these scripts.\n",
            language_hint(langs)
        )
    };

    format!(
        r#"You are an expert translator of technical and business documents.
{hint}
## TASK
Translate ALL non-English text into fluent, professional English.

## 1. OUTPUT CHARACTER SET
- Every script other than Latin must become English: Chinese, Korean, Japanese,
  Hindi, Thai, Arabic, Russian, Greek, Hebrew, Vietnamese and any other.
- Output ONLY: A-Z, a-z, 0-9 and standard punctuation (.,;:!?'"()-/)

## 2. PRESERVE VERBATIM (DO NOT TRANSLATE)
- Model and part numbers: D5SB60, ABC-123, 0402-001160
- Measurements: 10V, 25°C, 100mA, 50Hz, 4.5mm
- Dates: 2024-01-15, 21.07.23, 2024/01/15
- Chemical formulas: H2O, CO2, NaCl
- Mathematical expressions: x², ±0.5%, ≤100
- URLs and e-mail addresses
- Version strings: v1.0, Rev.A, Ver.2.1
- Standard abbreviations: N/A, TBD, PCB, IC

## 3. QUALITY
- Natural, professional English with industry-standard terminology
- Keep technical meaning exact

## 4. OUTPUT FORMAT
- Return ONLY the translated text
- NO explanations, notes or metadata
- NO quotation marks around the output
- NO prefixes such as "Translation:", "Translated:" or "English:"
- NO mention of translation, translation tools or AI
- Preserve line breaks
- The result must read as native English content"#
    )
}

/// User payload for a single-item translation.
pub fn single_user_prompt(text: &str, context: Option<&str>) -> String {
    match context {
        Some(ctx) if !ctx.is_empty() => {
            format!("Context: {ctx}\n\nTranslate to English:\n\n{text}")
        }
        _ => format!("Translate to English:\n\n{text}"),
    }
}

/// System instruction for the corrective request.
pub const STRICT_SYSTEM_PROMPT: &str =
    "You are a strict translator. Your output must be 100% English with NO exceptions.";

/// User payload for the corrective request, naming the scripts still present.
pub fn strict_user_prompt(text: &str, remaining: &BTreeSet<Language>) -> String {
    let langs = if remaining.is_empty() {
        "non-English".to_string()
    } else {
        language_hint(remaining)
    };
    format!(
        "CRITICAL: The text still contains {langs} characters.\n\n\
         Convert EVERYTHING to pure English. Use transliteration for names where \
         a direct translation is not possible.\n\n\
         Text with non-English characters:\n{text}\n\n\
         Output ONLY English letters (A-Z, a-z), digits (0-9) and basic punctuation."
    )
}

/// User payload for one batch chunk: a numbered list and the JSON reply shape.
pub fn batch_user_prompt(
    texts: &[&str],
    context: Option<&str>,
    langs: &BTreeSet<Language>,
) -> String {
    let numbered = texts
        .iter()
        .enumerate()
        .map(|(i, t)| format!("[{}] {}", i + 1, t))
        .collect::<Vec<_>>()
        .join("\n");
    let context_hint = context
        .filter(|c| !c.is_empty())
        .map(|c| format!("\nDocument context: {c}\n"))
        .unwrap_or_default();
    let lang_hint = if langs.is_empty() {
        String::new()
    } else {
        format!("\nDetected languages: {}\n", language_hint(langs))
    };

    format!(
        r#"Translate each numbered item to professional English.
{context_hint}{lang_hint}
REQUIREMENTS:
1. Output must be 100% professional English
2. NO Chinese, Korean, Japanese, Hindi, Thai, Arabic, Russian or any other non-Latin script
3. Keep numbers, dates, model numbers, measurements and technical terms exactly
4. NO mention of translation or AI tools
5. Return ONLY valid JSON, no explanations

OUTPUT FORMAT - return exactly this JSON structure, one object per item:
[{{"id": 1, "text": "English translation"}}, {{"id": 2, "text": "English translation"}}]

Items to translate:
{numbered}"#
    )
}

/// System instruction for the vision pass: structural decomposition and
/// translation in one round-trip, answered as a single JSON object.
pub const VISION_SYSTEM_PROMPT: &str = r#"You are an expert document analyst and translator. Analyse the attached page image precisely.

## TASK
1. Identify the complete structure: headings, paragraphs, tables, forms, lists, captions
2. Translate ALL non-English text into fluent, professional English
3. Preserve the document hierarchy and reading order

## TRANSLATION
- Every output string MUST be 100% English
- NO Chinese, Korean, Japanese, Hindi, Thai, Arabic, Russian or any other non-Latin script
- Keep model numbers, part numbers, dates, measurements, formulas and URLs unchanged

## STRUCTURE
- Separate table header rows from data rows
- Detect headings by visual styling (larger, bold, centred)
- Keep numbered and bulleted lists as list items
- Identify form fields and their labels

## OUTPUT FORMAT
Return ONE JSON object with exactly this structure:
{
    "page_type": "datasheet" | "form" | "report" | "specification" | "general",
    "title": "Page title if visible",
    "tables": [
        {
            "title": "Table caption if any",
            "columns": ["Header 1", "Header 2"],
            "rows": [["Cell 1-1", "Cell 1-2"], ["Cell 2-1", "Cell 2-2"]],
            "notes": "Table footnotes if any"
        }
    ],
    "text_blocks": [
        {
            "type": "heading" | "subheading" | "paragraph" | "list_item" | "caption" | "note",
            "text": "English text",
            "style": {"bold": true, "level": 1}
        }
    ],
    "forms": [
        {"field_label": "Label", "field_value": "Value or empty"}
    ]
}

- Extract ALL visible text, top to bottom, left to right
- NO mention of translation or AI tools
- Return only the JSON object"#;

/// User payload accompanying the page image.
pub const VISION_USER_PROMPT: &str = "Analyse and translate this page. Reply with the JSON object only.";
