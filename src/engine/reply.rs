//! Defensive parsing of model replies.
//!
//! Model output is untrusted text. Batch and page replies are parsed into
//! explicit tagged values with a fallback variant instead of failing: code
//! fences are stripped, the first balanced JSON array/object is extracted,
//! and field aliases the models commonly produce are accepted.

use crate::page::{BlockKind, BlockStyle, FormField, PageStructure, Table, TextBlock};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static RE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[A-Za-z]*[ \t]*\r?\n?").unwrap());

/// Prefixes models put in front of a plain translation.
const WRAPPER_PREFIXES: &[&str] = &["\"", "'", "Translation:", "English:", "Translated:", "Result:"];

/// One `{id, text}` pair of a batch reply. `id` is 1-based, as in the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub id: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchReply {
    Items(Vec<BatchItem>),
    /// No JSON array could be recovered.
    Malformed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageReply {
    Parsed(PageStructure),
    /// No usable JSON object: the raw reply becomes one paragraph.
    Fallback { raw: String },
}

impl PageReply {
    pub fn is_fallback(&self) -> bool {
        matches!(self, PageReply::Fallback { .. })
    }

    pub fn into_structure(self) -> PageStructure {
        match self {
            PageReply::Parsed(page) => page,
            PageReply::Fallback { raw } => PageStructure::single_paragraph(raw),
        }
    }
}

/// Remove markdown code fences, keeping their content.
pub fn strip_code_fences(raw: &str) -> String {
    RE_FENCE.replace_all(raw, "").trim().to_string()
}

/// Strip wrapper quoting and "Translation:"-style prefixes from a plain reply.
///
/// A trailing quote is removed only when the text does not also start with
/// one. If nothing is left, `original` is returned.
pub fn clean_translation(raw: &str, original: &str) -> String {
    let mut text = raw.trim();
    for prefix in WRAPPER_PREFIXES {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest.trim();
        }
    }
    for suffix in ["\"", "'"] {
        if text.ends_with(suffix) && !text.starts_with(suffix) {
            text = text[..text.len() - suffix.len()].trim();
        }
    }
    if text.is_empty() {
        original.to_string()
    } else {
        text.to_string()
    }
}

/// Find the balanced `open … close` span starting at byte `start`, honouring
/// JSON string literals and escapes.
fn balanced_span(s: &str, start: usize, open: u8, close: u8) -> Option<&str> {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&s[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// First substring that parses as a JSON value of the wanted shape.
fn first_json(s: &str, open: u8, close: u8) -> Option<Value> {
    s.bytes()
        .enumerate()
        .filter(|&(_, b)| b == open)
        .filter_map(|(i, _)| balanced_span(s, i, open, close))
        .find_map(|span| serde_json::from_str::<Value>(span).ok())
}

fn as_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items.iter().map(as_text).collect::<Vec<_>>().join("\n"),
        Value::Object(_) => v.to_string(),
    }
}

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k))
}

fn item_id(v: &Value) -> Option<usize> {
    match v {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().trim_matches(['[', ']']).parse().ok(),
        _ => None,
    }
}

// ── Batch replies ────────────────────────────────────────────────────────

/// Parse a batch reply into `{id, text}` items.
///
/// Accepts `id` or `index` (number or numeric string) and `text`,
/// `translation` or `english`. A bare array of strings is read positionally.
/// Items without a usable id or text are dropped; the caller translates the
/// ids it did not get back individually.
pub fn parse_batch_reply(raw: &str) -> BatchReply {
    let body = strip_code_fences(raw);
    let items = match first_json(&body, b'[', b']') {
        Some(Value::Array(items)) => items,
        _ => {
            return BatchReply::Malformed {
                reason: "no JSON array in reply".to_string(),
            }
        }
    };

    let parsed = items
        .iter()
        .enumerate()
        .filter_map(|(pos, item)| match item {
            Value::Object(obj) => {
                let id = field(obj, &["id", "index"]).and_then(item_id)?;
                let text = field(obj, &["text", "translation", "english"])
                    .map(as_text)?;
                Some(BatchItem { id, text })
            }
            Value::String(s) => Some(BatchItem {
                id: pos + 1,
                text: s.clone(),
            }),
            _ => None,
        })
        .collect();

    BatchReply::Items(parsed)
}

// ── Page replies ─────────────────────────────────────────────────────────

/// Parse a vision reply into a page structure.
///
/// Missing optional keys default to empty. Anything that is not a JSON
/// object carrying at least one of `title`, `text_blocks`, `tables` or
/// `forms` yields [`PageReply::Fallback`].
pub fn parse_page_reply(raw: &str) -> PageReply {
    let body = strip_code_fences(raw);
    let obj = match first_json(&body, b'{', b'}') {
        Some(Value::Object(obj))
            if ["title", "text_blocks", "tables", "forms"]
                .iter()
                .any(|k| obj.contains_key(*k)) =>
        {
            obj
        }
        _ => {
            return PageReply::Fallback {
                raw: body,
            }
        }
    };

    let page_type = obj
        .get("page_type")
        .map(as_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "general".to_string());

    PageReply::Parsed(PageStructure {
        page_type,
        title: obj.get("title").map(as_text).unwrap_or_default(),
        text_blocks: array(&obj, "text_blocks").filter_map(text_block).collect(),
        tables: array(&obj, "tables").filter_map(table).collect(),
        forms: array(&obj, "forms").filter_map(form_field).collect(),
    })
}

fn array<'a>(obj: &'a Map<String, Value>, key: &str) -> impl Iterator<Item = &'a Value> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter())
        .into_iter()
        .flatten()
}

fn text_block(v: &Value) -> Option<TextBlock> {
    let obj = v.as_object()?;
    let text = field(obj, &["text", "content"]).map(as_text)?;
    if text.trim().is_empty() {
        return None;
    }
    let kind = field(obj, &["type", "kind"])
        .and_then(Value::as_str)
        .map(BlockKind::from_label)
        .unwrap_or(BlockKind::Paragraph);
    let style = obj.get("style").and_then(Value::as_object);
    let bold = style
        .and_then(|s| s.get("bold"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let level = style
        .and_then(|s| s.get("level"))
        .and_then(Value::as_u64)
        .unwrap_or(1)
        .clamp(1, 6) as u8;
    Some(TextBlock {
        kind,
        text,
        style: BlockStyle { bold, level },
    })
}

fn table(v: &Value) -> Option<Table> {
    let obj = v.as_object()?;
    let columns: Vec<String> = obj
        .get("columns")
        .and_then(Value::as_array)
        .map(|c| c.iter().map(as_text).collect())
        .unwrap_or_default();
    let rows: Vec<Vec<String>> = obj
        .get("rows")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|row| match row {
                    Value::Array(cells) => cells.iter().map(as_text).collect(),
                    other => vec![as_text(other)],
                })
                .collect()
        })
        .unwrap_or_default();
    if columns.is_empty() && rows.is_empty() {
        return None;
    }
    Some(Table {
        title: obj.get("title").map(as_text).unwrap_or_default(),
        columns,
        rows,
        notes: obj.get("notes").map(as_text).unwrap_or_default(),
    })
}

fn form_field(v: &Value) -> Option<FormField> {
    let obj = v.as_object()?;
    let label = field(obj, &["field_label", "label"]).map(as_text)?;
    Some(FormField {
        label,
        value: field(obj, &["field_value", "value"])
            .map(as_text)
            .unwrap_or_default(),
    })
}
