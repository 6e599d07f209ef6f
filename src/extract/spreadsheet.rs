//! Spreadsheet (`.xlsx` / `.xlsm`) adapter.
//!
//! Works on the package XML directly. Cell text, header/footer sections and
//! comment bodies are located by byte span when the workbook is opened and
//! rewritten in place on [`TranslatableDocument::apply`], so every member the
//! adapter does not touch is carried over byte-for-byte.
//!
//! A translated shared string is rewritten in place. A cell whose
//! translation differs from the one already written for its shared entry is
//! repointed to a newly appended entry instead, so positions stay
//! independent.
//!
//! Subordinate cells of a merged region are blanked on apply: only the
//! anchor keeps a value, as Excel shows it.

use super::fragment::{Fragment, HeaderPart, Location, SectionPos, TranslatableDocument};
use super::package::{
    apply_edits, attr, parse_relationships, rels_path_for, resolve_target, scan, Package,
    TextEdit,
};
use crate::error::TranslateError;
use crate::language::contains_non_english;
use once_cell::sync::Lazy;
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Context hint sent with every spreadsheet fragment.
pub const CONTEXT: &str = "Excel document";

const DEFAULT_WORKBOOK: &str = "xl/workbook.xml";
const DEFAULT_SHARED_STRINGS: &str = "xl/sharedStrings.xml";

static RE_FORMAT_CODES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:&"[^"]*"|&\d+|&K[0-9A-Fa-f]{6}|&[BIUSEXYbiusexy])*"#).unwrap()
});

static RE_UNIQUE_COUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\buniqueCount="\d+""#).unwrap());

static RE_EMPTY_SST: Lazy<Regex> = Lazy::new(|| Regex::new(r"<sst([^>]*?)\s*/>").unwrap());

// ── Cell references ──────────────────────────────────────────────────────

/// A1-style reference for a 1-based row and column.
pub fn cell_ref(row: u32, col: u32) -> String {
    let mut letters = Vec::new();
    let mut n = col;
    while n > 0 {
        letters.push((b'A' + ((n - 1) % 26) as u8) as char);
        n = (n - 1) / 26;
    }
    let mut out: String = letters.into_iter().rev().collect();
    out.push_str(&row.to_string());
    out
}

/// Parse an A1-style reference (absolute markers allowed) into `(row, col)`.
pub fn parse_cell_ref(reference: &str) -> Option<(u32, u32)> {
    let r = reference.trim().replace('$', "");
    let split = r.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = r.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let col = letters.chars().try_fold(0u32, |acc, c| {
        acc.checked_mul(26)?
            .checked_add(c.to_ascii_uppercase() as u32 - 'A' as u32 + 1)
    })?;
    let row: u32 = digits.parse().ok()?;
    (row > 0).then_some((row, col))
}

/// A merged region. Only its top-left anchor carries translatable content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedRange {
    pub first: (u32, u32),
    pub last: (u32, u32),
}

impl MergedRange {
    pub fn parse(reference: &str) -> Option<Self> {
        let (a, b) = reference.split_once(':').unwrap_or((reference, reference));
        let (r1, c1) = parse_cell_ref(a)?;
        let (r2, c2) = parse_cell_ref(b)?;
        Some(Self {
            first: (r1.min(r2), c1.min(c2)),
            last: (r1.max(r2), c1.max(c2)),
        })
    }

    pub fn contains(&self, row: u32, col: u32) -> bool {
        (self.first.0..=self.last.0).contains(&row) && (self.first.1..=self.last.1).contains(&col)
    }

    /// Inside the region but not its anchor.
    pub fn is_subordinate(&self, row: u32, col: u32) -> bool {
        self.contains(row, col) && (row, col) != self.first
    }
}

// ── Header / footer sections ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderSection {
    /// `None` for text before the first `&L`/`&C`/`&R` marker, which Excel
    /// shows centred.
    marker: Option<SectionPos>,
    /// Leading font/size/colour codes, kept verbatim.
    prefix: String,
    text: String,
}

impl HeaderSection {
    fn new(marker: Option<SectionPos>, body: &str) -> Self {
        let split = RE_FORMAT_CODES.find(body).map_or(0, |m| m.end());
        Self {
            marker,
            prefix: body[..split].to_string(),
            text: body[split..].to_string(),
        }
    }

    fn position(&self) -> SectionPos {
        self.marker.unwrap_or(SectionPos::Center)
    }
}

fn split_header(raw: &str) -> Vec<HeaderSection> {
    let mut sections = Vec::new();
    let mut marker = None;
    let mut body = String::new();
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '&' {
            body.push(c);
            continue;
        }
        let Some(&next) = chars.peek() else {
            body.push(c);
            break;
        };
        let pos = match next {
            'L' => Some(SectionPos::Left),
            'C' => Some(SectionPos::Center),
            'R' => Some(SectionPos::Right),
            _ => None,
        };
        chars.next();
        match pos {
            Some(pos) => {
                if marker.is_some() || !body.is_empty() {
                    sections.push(HeaderSection::new(marker, &body));
                }
                marker = Some(pos);
                body.clear();
            }
            // Code pairs stay together so "&&L" is a literal, not a marker.
            None => {
                body.push(c);
                body.push(next);
            }
        }
    }
    if marker.is_some() || !body.is_empty() {
        sections.push(HeaderSection::new(marker, &body));
    }
    sections
}

fn join_header(sections: &[HeaderSection]) -> String {
    let mut out = String::new();
    for s in sections {
        match s.marker {
            Some(SectionPos::Left) => out.push_str("&L"),
            Some(SectionPos::Center) => out.push_str("&C"),
            Some(SectionPos::Right) => out.push_str("&R"),
            None => {}
        }
        out.push_str(&s.prefix);
        out.push_str(&s.text);
    }
    out
}

// ── Scanned model ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum CellSource {
    /// `t="s"`: span of the `<v>` index text.
    Shared { value: Range<usize>, index: usize },
    /// `t="inlineStr"`: inner span of `<is>`.
    Inline { inner: Range<usize> },
}

#[derive(Debug, Clone)]
struct SheetCell {
    row: u32,
    col: u32,
    text: String,
    source: CellSource,
}

/// A subordinate merged cell that still carries a value.
#[derive(Debug, Clone)]
struct CoveredCell {
    /// The whole `<c>…</c>` element.
    element: Range<usize>,
    /// Its start tag rebuilt without value type or content.
    blank: String,
}

#[derive(Debug, Clone)]
struct HeaderText {
    part: HeaderPart,
    inner: Range<usize>,
    sections: Vec<HeaderSection>,
}

#[derive(Debug, Clone)]
struct CommentText {
    cell: String,
    inner: Range<usize>,
    text: String,
}

#[derive(Debug, Clone)]
struct CommentsPart {
    part: String,
    xml: String,
    comments: Vec<CommentText>,
}

#[derive(Debug, Clone)]
struct Sheet {
    name: String,
    part: String,
    xml: String,
    cells: Vec<SheetCell>,
    merged: Vec<MergedRange>,
    covered: Vec<CoveredCell>,
    headers: Vec<HeaderText>,
    comments: Option<CommentsPart>,
}

impl Sheet {
    fn is_subordinate(&self, row: u32, col: u32) -> bool {
        self.merged.iter().any(|m| m.is_subordinate(row, col))
    }
}

#[derive(Debug, Clone)]
struct SharedStrings {
    part: String,
    xml: String,
    strings: Vec<String>,
    /// Inner span of each `<si>`; `None` for `<si/>`.
    spans: Vec<Option<Range<usize>>>,
}

/// Per-document write counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpreadsheetCounters {
    pub cells: usize,
    pub header_footer_segments: usize,
    pub comments: usize,
}

impl SpreadsheetCounters {
    pub fn total(&self) -> usize {
        self.cells + self.header_footer_segments + self.comments
    }
}

/// An opened workbook.
#[derive(Debug, Clone)]
pub struct SpreadsheetDocument {
    source: PathBuf,
    package: Package,
    shared: Option<SharedStrings>,
    sheets: Vec<Sheet>,
    counters: SpreadsheetCounters,
    applied: bool,
}

impl SpreadsheetDocument {
    pub fn open(path: &Path) -> Result<Self, TranslateError> {
        Self::from_package(Package::open(path)?, path)
    }

    pub fn from_package(package: Package, source: &Path) -> Result<Self, TranslateError> {
        let workbook_part = office_document(&package)?;
        let workbook_xml =
            package
                .text(&workbook_part)?
                .ok_or_else(|| TranslateError::InvalidDocument {
                    path: source.to_path_buf(),
                    detail: format!("missing workbook part '{workbook_part}'"),
                })?;

        let rels = match package.text(&rels_path_for(&workbook_part))? {
            Some(xml) => parse_relationships(&workbook_part, &xml)?,
            None => Vec::new(),
        };
        let targets: HashMap<&str, String> = rels
            .iter()
            .filter(|r| !r.external)
            .map(|r| (r.id.as_str(), resolve_target(&workbook_part, &r.target)))
            .collect();

        let shared_part = rels
            .iter()
            .find(|r| r.rel_type.ends_with("/sharedStrings"))
            .map(|r| resolve_target(&workbook_part, &r.target))
            .unwrap_or_else(|| DEFAULT_SHARED_STRINGS.to_string());
        let shared = match package.text(&shared_part)? {
            Some(xml) => {
                let (strings, spans) = scan_shared_strings(&shared_part, &xml)?.into_iter().unzip();
                Some(SharedStrings {
                    strings,
                    spans,
                    part: shared_part,
                    xml,
                })
            }
            None => None,
        };

        let mut entries = Vec::new();
        scan(&workbook_part, &workbook_xml, |event, _| {
            if let Event::Start(e) | Event::Empty(e) = event {
                if e.local_name().as_ref() == b"sheet" {
                    if let (Some(name), Some(id)) = (attr(e, b"name"), attr(e, b"id")) {
                        entries.push((name, id));
                    }
                }
            }
            Ok(())
        })?;

        let mut sheets = Vec::with_capacity(entries.len());
        for (name, id) in entries {
            let Some(part) = targets.get(id.as_str()).cloned() else {
                warn!("sheet '{}' has no relationship target ({}); skipped", name, id);
                continue;
            };
            let Some(xml) = package.text(&part)? else {
                warn!("sheet '{}' part '{}' is missing; skipped", name, part);
                continue;
            };
            let scanned = scan_sheet(&part, &xml)?;
            let covered = scanned
                .elements
                .into_iter()
                .filter(|e| scanned.merged.iter().any(|m| m.is_subordinate(e.row, e.col)))
                .map(|e| CoveredCell {
                    element: e.span,
                    blank: e.blank,
                })
                .collect();
            let cells = scanned
                .cells
                .into_iter()
                .filter_map(|raw| {
                    let text = match &raw.source {
                        CellSource::Shared { index, .. } => {
                            shared.as_ref()?.strings.get(*index)?.clone()
                        }
                        CellSource::Inline { .. } => raw.inline_text,
                    };
                    Some(SheetCell {
                        row: raw.row,
                        col: raw.col,
                        text,
                        source: raw.source,
                    })
                })
                .collect();
            let comments = load_comments(&package, &part)?;
            sheets.push(Sheet {
                name,
                part,
                xml,
                cells,
                merged: scanned.merged,
                covered,
                headers: scanned.headers,
                comments,
            });
        }

        debug!(
            "opened workbook {} ({} sheets, {} shared strings)",
            source.display(),
            sheets.len(),
            shared.as_ref().map_or(0, |s| s.strings.len())
        );
        Ok(Self {
            source: source.to_path_buf(),
            package,
            shared,
            sheets,
            counters: SpreadsheetCounters::default(),
            applied: false,
        })
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Text of a cell as read at open time.
    pub fn cell_text(&self, sheet: &str, row: u32, col: u32) -> Option<&str> {
        self.sheets
            .iter()
            .find(|s| s.name == sheet)?
            .cells
            .iter()
            .find(|c| c.row == row && c.col == col)
            .map(|c| c.text.as_str())
    }

    /// Counters from the last [`TranslatableDocument::apply`].
    pub fn counters(&self) -> SpreadsheetCounters {
        self.counters
    }

    pub fn save(&self, path: &Path) -> Result<(), TranslateError> {
        self.package.write_to(path)
    }
}

impl TranslatableDocument for SpreadsheetDocument {
    fn fragments(&self) -> Vec<Fragment> {
        let mut out = Vec::new();
        let mut push = |text: &str, location: Location| {
            if contains_non_english(text) {
                out.extend(Fragment::new(text, location).map(|f| f.with_context(CONTEXT)));
            }
        };
        for sheet in &self.sheets {
            for cell in &sheet.cells {
                if sheet.is_subordinate(cell.row, cell.col) {
                    continue;
                }
                push(
                    &cell.text,
                    Location::Cell {
                        sheet: sheet.name.clone(),
                        row: cell.row,
                        col: cell.col,
                    },
                );
            }
            for header in &sheet.headers {
                for section in &header.sections {
                    push(
                        &section.text,
                        Location::HeaderFooter {
                            sheet: sheet.name.clone(),
                            part: header.part,
                            position: section.position(),
                        },
                    );
                }
            }
            for comment in sheet.comments.iter().flat_map(|c| &c.comments) {
                push(
                    &comment.text,
                    Location::Comment {
                        sheet: sheet.name.clone(),
                        cell: comment.cell.clone(),
                    },
                );
            }
        }
        out
    }

    fn apply(&mut self, translations: &HashMap<Location, String>) -> usize {
        if self.applied {
            warn!(
                "{}: translations already applied; open the output again to re-apply",
                self.source.display()
            );
            return 0;
        }
        self.applied = true;

        let base = self.shared.as_ref().map_or(0, |s| s.strings.len());
        // Shared entries rewritten in place, by index.
        let mut in_place: HashMap<usize, String> = HashMap::new();
        let mut appended: Vec<String> = Vec::new();
        let mut appended_index: HashMap<String, usize> = HashMap::new();
        let mut counters = SpreadsheetCounters::default();
        let mut updates: Vec<(String, String)> = Vec::new();

        for sheet in &self.sheets {
            let mut edits: Vec<TextEdit> = sheet
                .covered
                .iter()
                .map(|c| TextEdit::new(c.element.clone(), c.blank.clone()))
                .collect();
            if !edits.is_empty() {
                debug!(
                    "{}: blanked {} merged subordinate cells",
                    sheet.name,
                    edits.len()
                );
            }

            for cell in &sheet.cells {
                let location = Location::Cell {
                    sheet: sheet.name.clone(),
                    row: cell.row,
                    col: cell.col,
                };
                let Some(translated) = changed(translations.get(&location), &cell.text) else {
                    continue;
                };
                match &cell.source {
                    CellSource::Shared { value, index } => {
                        let Some(shared) = &self.shared else {
                            continue;
                        };
                        let rewritable = matches!(shared.spans.get(*index), Some(Some(_)));
                        let same = in_place.get(index).map(|w| w == translated);
                        match same {
                            Some(true) => {}
                            None if rewritable => {
                                in_place.insert(*index, translated.clone());
                            }
                            _ => {
                                let idx = *appended_index
                                    .entry(translated.clone())
                                    .or_insert_with(|| {
                                        appended.push(translated.clone());
                                        base + appended.len() - 1
                                    });
                                edits.push(TextEdit::new(value.clone(), idx.to_string()));
                            }
                        }
                    }
                    CellSource::Inline { inner } => {
                        edits.push(TextEdit::new(inner.clone(), preserved_t(translated)));
                    }
                }
                counters.cells += 1;
            }

            for header in &sheet.headers {
                let mut sections = header.sections.clone();
                let mut touched = false;
                for section in sections.iter_mut() {
                    let location = Location::HeaderFooter {
                        sheet: sheet.name.clone(),
                        part: header.part,
                        position: section.position(),
                    };
                    if let Some(t) = changed(translations.get(&location), &section.text) {
                        section.text = t.clone();
                        counters.header_footer_segments += 1;
                        touched = true;
                    }
                }
                if touched {
                    edits.push(TextEdit::new(
                        header.inner.clone(),
                        partial_escape(&join_header(&sections)).into_owned(),
                    ));
                }
            }

            if !edits.is_empty() {
                updates.push((sheet.part.clone(), apply_edits(&sheet.xml, edits)));
            }

            if let Some(part) = &sheet.comments {
                let mut edits = Vec::new();
                for comment in &part.comments {
                    let location = Location::Comment {
                        sheet: sheet.name.clone(),
                        cell: comment.cell.clone(),
                    };
                    if let Some(t) = changed(translations.get(&location), &comment.text) {
                        edits.push(TextEdit::new(
                            comment.inner.clone(),
                            format!("<r>{}</r>", preserved_t(t)),
                        ));
                        counters.comments += 1;
                    }
                }
                if !edits.is_empty() {
                    updates.push((part.part.clone(), apply_edits(&part.xml, edits)));
                }
            }
        }

        if let Some(shared) = &self.shared {
            if !in_place.is_empty() || !appended.is_empty() {
                let edits = in_place
                    .iter()
                    .filter_map(|(idx, text)| {
                        let span = shared.spans.get(*idx)?.clone()?;
                        Some(TextEdit::new(span, preserved_t(text)))
                    })
                    .collect();
                let mut xml = apply_edits(&shared.xml, edits);
                if !appended.is_empty() {
                    xml = append_shared_strings(&xml, &appended, base + appended.len());
                }
                updates.push((shared.part.clone(), xml));
            }
        }

        for (part, xml) in updates {
            self.package.set(&part, xml.into_bytes());
        }

        info!(
            "{}: wrote {} cells, {} header/footer segments, {} comments",
            self.source.display(),
            counters.cells,
            counters.header_footer_segments,
            counters.comments
        );
        self.counters = counters;
        counters.total()
    }
}

fn changed<'a>(translation: Option<&'a String>, source: &str) -> Option<&'a String> {
    translation.filter(|t| t.as_str() != source)
}

fn preserved_t(text: &str) -> String {
    format!("<t xml:space=\"preserve\">{}</t>", partial_escape(text))
}

fn append_shared_strings(xml: &str, strings: &[String], unique: usize) -> String {
    let items: String = strings
        .iter()
        .map(|s| format!("<si>{}</si>", preserved_t(s)))
        .collect();
    let out = match xml.rfind("</sst>") {
        Some(pos) => format!("{}{}{}", &xml[..pos], items, &xml[pos..]),
        None => RE_EMPTY_SST
            .replace(xml, |caps: &regex::Captures| {
                format!("<sst{}>{}</sst>", &caps[1], items)
            })
            .into_owned(),
    };
    RE_UNIQUE_COUNT
        .replace(&out, format!("uniqueCount=\"{unique}\"").as_str())
        .into_owned()
}

// ── Part scanners ────────────────────────────────────────────────────────

/// Main workbook part from the root relationships, or the conventional path.
fn office_document(package: &Package) -> Result<String, TranslateError> {
    let Some(xml) = package.text("_rels/.rels")? else {
        return Ok(DEFAULT_WORKBOOK.to_string());
    };
    Ok(parse_relationships("_rels/.rels", &xml)?
        .into_iter()
        .find(|r| r.rel_type.ends_with("/officeDocument"))
        .map(|r| resolve_target("", &r.target))
        .unwrap_or_else(|| DEFAULT_WORKBOOK.to_string()))
}

/// Visible text of each `<si>` with its inner span.
fn scan_shared_strings(
    part: &str,
    xml: &str,
) -> Result<Vec<(String, Option<Range<usize>>)>, TranslateError> {
    let mut strings = Vec::new();
    let mut current: Option<(usize, String)> = None;
    let mut in_t = false;
    let mut in_rph = false;
    scan(part, xml, |event, span| {
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some((span.end, String::new())),
                b"t" => in_t = true,
                b"rPh" => in_rph = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => {
                strings.push((String::new(), None))
            }
            Event::Text(t) if in_t && !in_rph => {
                if let Some((_, buf)) = current.as_mut() {
                    buf.push_str(&t.unescape().map_err(|e| TranslateError::xml(part, e))?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.extend(
                    current
                        .take()
                        .map(|(start, text)| (text, Some(start..span.start))),
                ),
                b"t" => in_t = false,
                b"rPh" => in_rph = false,
                _ => {}
            },
            _ => {}
        }
        Ok(())
    })?;
    Ok(strings)
}

struct RawCell {
    row: u32,
    col: u32,
    source: CellSource,
    inline_text: String,
}

/// Any `<c>` element with content, for merged-region blanking.
struct CellElement {
    row: u32,
    col: u32,
    span: Range<usize>,
    blank: String,
}

/// Parser state for the `<c>` element being read.
#[derive(Default)]
struct OpenCell {
    row: u32,
    col: u32,
    start: usize,
    blank: String,
    kind: Option<String>,
    value_start: Option<usize>,
    value: Option<Range<usize>>,
    value_text: String,
    inline_start: Option<usize>,
    inline: Option<Range<usize>>,
    inline_text: String,
    in_v: bool,
    in_t: bool,
    in_rph: bool,
}

impl OpenCell {
    fn finish(self) -> Option<RawCell> {
        match self.kind.as_deref() {
            Some("s") => Some(RawCell {
                row: self.row,
                col: self.col,
                source: CellSource::Shared {
                    value: self.value?,
                    index: self.value_text.trim().parse().ok()?,
                },
                inline_text: String::new(),
            }),
            Some("inlineStr") => Some(RawCell {
                row: self.row,
                col: self.col,
                source: CellSource::Inline {
                    inner: self.inline?,
                },
                inline_text: self.inline_text,
            }),
            // Numbers, booleans, errors and formula results stay as they are.
            _ => None,
        }
    }
}

#[derive(Default)]
struct SheetScan {
    cells: Vec<RawCell>,
    elements: Vec<CellElement>,
    merged: Vec<MergedRange>,
    headers: Vec<HeaderText>,
}

/// Running position for `<row>`/`<c>` elements whose `r` is omitted: the
/// next row, or the column after the previous cell.
#[derive(Default)]
struct Cursor {
    row: u32,
    col: u32,
}

impl Cursor {
    fn enter_row(&mut self, e: &BytesStart<'_>) {
        self.row = attr(e, b"r")
            .and_then(|r| r.trim().parse().ok())
            .unwrap_or(self.row + 1);
        self.col = 0;
    }

    fn enter_cell(&mut self, part: &str, e: &BytesStart<'_>) -> (u32, u32) {
        let (row, col) = match attr(e, b"r") {
            Some(r) => parse_cell_ref(&r).unwrap_or_else(|| {
                debug!("{}: unreadable cell reference '{}'; using position", part, r);
                (self.row, self.col + 1)
            }),
            None => (self.row.max(1), self.col + 1),
        };
        self.row = row;
        self.col = col;
        (row, col)
    }
}

/// `<c>` start tag without `t` and without content, as a self-closing tag.
fn blank_cell(e: &BytesStart<'_>) -> String {
    let mut out = String::from("<");
    out.push_str(&String::from_utf8_lossy(e.name().as_ref()));
    for a in e.attributes().flatten() {
        if a.key.local_name().as_ref() == b"t" {
            continue;
        }
        out.push(' ');
        out.push_str(&String::from_utf8_lossy(a.key.as_ref()));
        out.push_str("=\"");
        out.push_str(&String::from_utf8_lossy(&a.value));
        out.push('"');
    }
    out.push_str("/>");
    out
}

fn scan_sheet(part: &str, xml: &str) -> Result<SheetScan, TranslateError> {
    let mut out = SheetScan::default();
    let mut cursor = Cursor::default();
    let mut cell: Option<OpenCell> = None;
    let mut header: Option<(HeaderPart, usize, String)> = None;

    scan(part, xml, |event, span| {
        match event {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                cursor.enter_row(e);
            }
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                cursor.enter_cell(part, e);
            }
            Event::Start(e) => match e.local_name().as_ref() {
                b"c" => {
                    let (row, col) = cursor.enter_cell(part, e);
                    cell = Some(OpenCell {
                        row,
                        col,
                        start: span.start,
                        blank: blank_cell(e),
                        kind: attr(e, b"t"),
                        ..OpenCell::default()
                    });
                }
                b"v" => {
                    if let Some(c) = cell.as_mut() {
                        c.in_v = true;
                        c.value_start = Some(span.end);
                    }
                }
                b"is" => {
                    if let Some(c) = cell.as_mut() {
                        c.inline_start = Some(span.end);
                    }
                }
                b"t" => {
                    if let Some(c) = cell.as_mut() {
                        c.in_t = true;
                    }
                }
                b"rPh" => {
                    if let Some(c) = cell.as_mut() {
                        c.in_rph = true;
                    }
                }
                b"oddHeader" => header = Some((HeaderPart::OddHeader, span.end, String::new())),
                b"oddFooter" => header = Some((HeaderPart::OddFooter, span.end, String::new())),
                b"mergeCell" => out.merged.extend(attr(e, b"ref").and_then(|r| MergedRange::parse(&r))),
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"mergeCell" => {
                out.merged
                    .extend(attr(e, b"ref").and_then(|r| MergedRange::parse(&r)));
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| TranslateError::xml(part, e))?;
                if let Some((_, _, buf)) = header.as_mut() {
                    buf.push_str(&text);
                } else if let Some(c) = cell.as_mut() {
                    if c.in_v {
                        c.value_text.push_str(&text);
                    } else if c.in_t && !c.in_rph {
                        c.inline_text.push_str(&text);
                    }
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"c" => {
                    if let Some(c) = cell.take() {
                        out.elements.push(CellElement {
                            row: c.row,
                            col: c.col,
                            span: c.start..span.end,
                            blank: c.blank.clone(),
                        });
                        out.cells.extend(c.finish());
                    }
                }
                b"v" => {
                    if let Some(c) = cell.as_mut() {
                        c.in_v = false;
                        c.value = c.value_start.map(|s| s..span.start);
                    }
                }
                b"is" => {
                    if let Some(c) = cell.as_mut() {
                        c.inline = c.inline_start.map(|s| s..span.start);
                    }
                }
                b"t" => {
                    if let Some(c) = cell.as_mut() {
                        c.in_t = false;
                    }
                }
                b"rPh" => {
                    if let Some(c) = cell.as_mut() {
                        c.in_rph = false;
                    }
                }
                b"oddHeader" | b"oddFooter" => {
                    if let Some((part, start, raw)) = header.take() {
                        out.headers.push(HeaderText {
                            part,
                            inner: start..span.start,
                            sections: split_header(&raw),
                        });
                    }
                }
                _ => {}
            },
            _ => {}
        }
        Ok(())
    })?;
    Ok(out)
}

fn load_comments(package: &Package, sheet_part: &str) -> Result<Option<CommentsPart>, TranslateError> {
    let Some(rels_xml) = package.text(&rels_path_for(sheet_part))? else {
        return Ok(None);
    };
    let Some(part) = parse_relationships(sheet_part, &rels_xml)?
        .into_iter()
        .find(|r| !r.external && r.rel_type.ends_with("/comments"))
        .map(|r| resolve_target(sheet_part, &r.target))
    else {
        return Ok(None);
    };
    let Some(xml) = package.text(&part)? else {
        return Ok(None);
    };

    let mut comments = Vec::new();
    let mut reference: Option<String> = None;
    let mut body: Option<(usize, String)> = None;
    let mut in_t = false;
    let mut in_rph = false;
    scan(&part, &xml, |event, span| {
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"comment" => reference = attr(e, b"ref"),
                b"text" => body = Some((span.end, String::new())),
                b"t" => in_t = true,
                b"rPh" => in_rph = true,
                _ => {}
            },
            Event::Text(t) if in_t && !in_rph => {
                if let Some((_, buf)) = body.as_mut() {
                    buf.push_str(&t.unescape().map_err(|e| TranslateError::xml(part.as_str(), e))?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"text" => {
                    if let (Some(cell), Some((start, text))) = (reference.clone(), body.take()) {
                        comments.push(CommentText {
                            cell,
                            inner: start..span.start,
                            text,
                        });
                    }
                }
                b"comment" => reference = None,
                b"t" => in_t = false,
                b"rPh" => in_rph = false,
                _ => {}
            },
            _ => {}
        }
        Ok(())
    })?;

    Ok(Some(CommentsPart {
        part,
        xml,
        comments,
    }))
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! A small workbook exercising every location kind.

    use crate::extract::package::{fixtures::package, Package};

    pub const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="报价" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

    pub const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/></Relationships>"#;

    pub const SHARED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="4" uniqueCount="3"><si><t>产品型号: ABC-123, 重量: 10kg</t></si><si><r><rPr><b/></rPr><t>价</t></r><r><t>格</t></r><rPh><t>カカク</t></rPh></si><si><t>Total</t></si></sst>"#;

    pub const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row><row r="2"><c r="A2" t="s"><v>1</v></c><c r="B2" t="inlineStr"><is><t>合并</t></is></c><c r="C2" t="inlineStr"><is><t>隐藏</t></is></c><c r="D2"><v>42</v></c><c r="E2" t="s"><v>2</v></c></row></sheetData><mergeCells count="1"><mergeCell ref="B2:C3"/></mergeCells><headerFooter><oddHeader>&amp;L&amp;"Arial,Bold"机密&amp;CPage &amp;P&amp;R报告</oddHeader><oddFooter>页脚</oddFooter></headerFooter></worksheet>"#;

    pub const SHEET_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments" Target="../comments1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/vmlDrawing" Target="../drawings/vmlDrawing1.vml"/></Relationships>"#;

    pub const COMMENTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<comments xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><authors><author>Li</author></authors><commentList><comment ref="A1" authorId="0"><text><r><rPr><b/></rPr><t>Li:</t></r><r><t xml:space="preserve">请检查</t></r></text></comment></commentList></comments>"#;

    pub const VML: &str = r#"<xml xmlns:v="urn:schemas-microsoft-com:vml"><v:shape><v:textbox><div>备注</div></v:textbox></v:shape></xml>"#;

    pub fn workbook() -> Package {
        package(&[
            ("[Content_Types].xml", "<Types/>"),
            ("xl/workbook.xml", WORKBOOK),
            ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
            ("xl/sharedStrings.xml", SHARED),
            ("xl/worksheets/sheet1.xml", SHEET),
            ("xl/worksheets/_rels/sheet1.xml.rels", SHEET_RELS),
            ("xl/comments1.xml", COMMENTS),
            ("xl/drawings/vmlDrawing1.vml", VML),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn sheet(name: &str) -> String {
        name.to_string()
    }

    fn open() -> SpreadsheetDocument {
        SpreadsheetDocument::from_package(fixtures::workbook(), Path::new("book.xlsx")).unwrap()
    }

    fn reopen(doc: &SpreadsheetDocument) -> SpreadsheetDocument {
        SpreadsheetDocument::from_package(doc.package().clone(), Path::new("book.xlsx")).unwrap()
    }

    #[test]
    fn cell_refs() {
        assert_eq!(cell_ref(1, 1), "A1");
        assert_eq!(cell_ref(10, 26), "Z10");
        assert_eq!(cell_ref(3, 27), "AA3");
        assert_eq!(parse_cell_ref("$AB$3"), Some((3, 28)));
        assert_eq!(parse_cell_ref("A0"), None);
        assert_eq!(parse_cell_ref("12"), None);
    }

    #[test]
    fn merged_ranges() {
        let m = MergedRange::parse("B2:C3").unwrap();
        assert!(!m.is_subordinate(2, 2));
        assert!(m.is_subordinate(2, 3));
        assert!(m.is_subordinate(3, 2));
        assert!(!m.contains(1, 2));
    }

    #[test]
    fn header_sections_split_and_rejoin() {
        let raw = "&L&\"Arial,Bold\"机密&CPage &P&R报告";
        let sections = split_header(raw);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].prefix, "&\"Arial,Bold\"");
        assert_eq!(sections[0].text, "机密");
        assert_eq!(sections[1].text, "Page &P");
        assert_eq!(sections[2].position(), SectionPos::Right);
        assert_eq!(join_header(&sections), raw);

        let plain = split_header("页脚");
        assert_eq!(plain.len(), 1);
        assert_eq!(plain[0].position(), SectionPos::Center);
        assert_eq!(join_header(&plain), "页脚");
    }

    #[test]
    fn reads_cells_with_rich_runs() {
        let doc = open();
        assert_eq!(doc.sheet_names(), vec!["报价"]);
        assert_eq!(doc.cell_text("报价", 1, 1), Some("产品型号: ABC-123, 重量: 10kg"));
        // Phonetic runs are not part of the visible text.
        assert_eq!(doc.cell_text("报价", 1, 2), Some("价格"));
        assert_eq!(doc.cell_text("报价", 2, 2), Some("合并"));
        // Numeric cells are not text.
        assert_eq!(doc.cell_text("报价", 2, 4), None);
    }

    #[test]
    fn fragments_skip_english_and_merged_subordinates() {
        let doc = open();
        let locations: Vec<String> = doc
            .fragments()
            .iter()
            .map(|f| f.location.to_string())
            .collect();
        assert!(locations.contains(&"报价!A1".to_string()));
        assert!(locations.contains(&"报价!B2".to_string()));
        assert!(!locations.contains(&"报价!C2".to_string()));
        assert!(!locations.contains(&"报价!E2".to_string()));
        // Two header sections and the footer; "Page &P" is English.
        let headers = doc
            .fragments()
            .into_iter()
            .filter(|f| matches!(f.location, Location::HeaderFooter { .. }))
            .count();
        assert_eq!(headers, 3);
        assert!(doc
            .fragments()
            .iter()
            .any(|f| f.text == "Li:请检查" && f.context.as_deref() == Some(CONTEXT)));
    }

    #[test]
    fn apply_writes_each_position_independently() {
        let mut doc = open();
        let mut t = HashMap::new();
        t.insert(
            Location::Cell { sheet: sheet("报价"), row: 1, col: 1 },
            "Product model: ABC-123, Weight: 10kg".to_string(),
        );
        t.insert(
            Location::Cell { sheet: sheet("报价"), row: 1, col: 2 },
            "Price".to_string(),
        );
        // A2 shares string 1 with B1 but gets its own translation.
        t.insert(
            Location::Cell { sheet: sheet("报价"), row: 2, col: 1 },
            "Unit price".to_string(),
        );
        t.insert(
            Location::Cell { sheet: sheet("报价"), row: 2, col: 2 },
            "Merged & <ok>".to_string(),
        );
        t.insert(
            Location::HeaderFooter {
                sheet: sheet("报价"),
                part: HeaderPart::OddHeader,
                position: SectionPos::Left,
            },
            "Confidential".to_string(),
        );
        t.insert(
            Location::Comment { sheet: sheet("报价"), cell: "A1".into() },
            "Li: please check".to_string(),
        );

        assert_eq!(doc.apply(&t), 6);
        assert_eq!(
            doc.counters(),
            SpreadsheetCounters { cells: 4, header_footer_segments: 1, comments: 1 }
        );

        let after = reopen(&doc);
        assert_eq!(after.cell_text("报价", 1, 1), Some("Product model: ABC-123, Weight: 10kg"));
        assert_eq!(after.cell_text("报价", 1, 2), Some("Price"));
        assert_eq!(after.cell_text("报价", 2, 1), Some("Unit price"));
        assert_eq!(after.cell_text("报价", 2, 2), Some("Merged & <ok>"));
        assert_eq!(after.cell_text("报价", 2, 3), None);
        assert_eq!(after.cell_text("报价", 2, 5), Some("Total"));

        // Entries 0 and 1 are rewritten in place; only A2's differing
        // translation needs a new entry.
        let shared = after.package().text("xl/sharedStrings.xml").unwrap().unwrap();
        assert!(shared.contains(r#"uniqueCount="4""#));
        assert!(shared.contains(r#"count="4""#));
        assert!(!shared.contains("产品型号"));
        assert!(!shared.contains("カカク"));
        assert!(shared.contains(r#"<si><t xml:space="preserve">Price</t></si>"#));
        assert!(shared.ends_with(r#"<si><t xml:space="preserve">Unit price</t></si></sst>"#));

        let sheet_xml = after.package().text("xl/worksheets/sheet1.xml").unwrap().unwrap();
        assert!(sheet_xml.contains("&amp;L&amp;\"Arial,Bold\"Confidential&amp;CPage &amp;P&amp;R报告"));

        let comments = after.package().text("xl/comments1.xml").unwrap().unwrap();
        assert!(comments.contains(r#"<text><r><t xml:space="preserve">Li: please check</t></r></text>"#));

        // Untouched members are carried over byte-for-byte.
        assert_eq!(
            after.package().get("xl/drawings/vmlDrawing1.vml"),
            Some(fixtures::VML.as_bytes())
        );
    }

    #[test]
    fn unchanged_translations_leave_parts_alone() {
        let mut doc = open();
        let mut t = HashMap::new();
        t.insert(
            Location::Cell { sheet: sheet("报价"), row: 1, col: 2 },
            "价格".to_string(),
        );
        assert_eq!(doc.apply(&t), 0);
        assert_eq!(
            doc.package().get("xl/sharedStrings.xml"),
            Some(fixtures::SHARED.as_bytes())
        );
        assert_eq!(
            doc.package().get("xl/comments1.xml"),
            Some(fixtures::COMMENTS.as_bytes())
        );
        // The sheet changes only where the merge covers C2.
        let sheet_xml = doc.package().text("xl/worksheets/sheet1.xml").unwrap().unwrap();
        assert_eq!(
            sheet_xml,
            fixtures::SHEET.replace(
                r#"<c r="C2" t="inlineStr"><is><t>隐藏</t></is></c>"#,
                r#"<c r="C2"/>"#
            )
        );
        assert_eq!(doc.apply(&t), 0);
    }

    #[test]
    fn merged_subordinates_are_blanked_keeping_style() {
        let sheet = r#"<worksheet><sheetData><row r="4"><c r="A4" s="2" t="s"><v>0</v></c><c r="B4" s="2" t="s"><v>0</v></c><c r="C4" s="5"><f>1+1</f><v>2</v></c></row></sheetData><mergeCells count="1"><mergeCell ref="A4:C4"/></mergeCells></worksheet>"#;
        let mut pkg = fixtures::workbook();
        pkg.set("xl/worksheets/sheet1.xml", sheet.as_bytes().to_vec());
        let mut doc = SpreadsheetDocument::from_package(pkg, Path::new("book.xlsx")).unwrap();

        let anchors: Vec<String> = doc.fragments().iter().map(|f| f.location.to_string()).collect();
        assert!(anchors.contains(&"报价!A4".to_string()));
        assert!(!anchors.contains(&"报价!B4".to_string()));

        doc.apply(&HashMap::new());
        let xml = doc.package().text("xl/worksheets/sheet1.xml").unwrap().unwrap();
        assert_eq!(
            xml,
            r#"<worksheet><sheetData><row r="4"><c r="A4" s="2" t="s"><v>0</v></c><c r="B4" s="2"/><c r="C4" s="5"/></row></sheetData><mergeCells count="1"><mergeCell ref="A4:C4"/></mergeCells></worksheet>"#
        );
    }

    #[test]
    fn cells_without_reference_take_their_position() {
        let sheet = r#"<worksheet><sheetData><row><c t="inlineStr"><is><t>甲</t></is></c><c/><c t="inlineStr"><is><t>乙</t></is></c></row><row r="5"><c t="inlineStr"><is><t>丙</t></is></c></row></sheetData></worksheet>"#;
        let mut pkg = fixtures::workbook();
        pkg.set("xl/worksheets/sheet1.xml", sheet.as_bytes().to_vec());
        let doc = SpreadsheetDocument::from_package(pkg, Path::new("book.xlsx")).unwrap();
        assert_eq!(doc.cell_text("报价", 1, 1), Some("甲"));
        assert_eq!(doc.cell_text("报价", 1, 3), Some("乙"));
        assert_eq!(doc.cell_text("报价", 5, 1), Some("丙"));
    }

    #[test]
    fn empty_shared_table_is_expanded() {
        let xml = r#"<sst xmlns="x" count="0" uniqueCount="0"/>"#;
        let out = append_shared_strings(xml, &["A".into()], 1);
        assert_eq!(
            out,
            r#"<sst xmlns="x" count="0" uniqueCount="1"><si><t xml:space="preserve">A</t></si></sst>"#
        );
    }

    #[test]
    fn missing_workbook_is_invalid() {
        let pkg = crate::extract::package::fixtures::package(&[("a.txt", "x")]);
        let err = SpreadsheetDocument::from_package(pkg, Path::new("x.xlsx")).unwrap_err();
        assert!(matches!(err, TranslateError::InvalidDocument { .. }));
    }
}
