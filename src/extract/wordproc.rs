//! Word-processor (`.docx`) reader.
//!
//! The body of `word/document.xml` is read in order into paragraphs and
//! tables. Translation happens in memory; the translated body is handed to
//! the document generator as one [`PageStructure`] rather than patched back
//! into the source package.

use super::fragment::{Fragment, Location, TranslatableDocument};
use super::package::{attr, scan, Package};
use crate::error::TranslateError;
use crate::page::{BlockKind, BlockStyle, PageStructure, Table, TextBlock};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Context hint sent with every word-processor fragment.
pub const CONTEXT: &str = "Word document";

const DOCUMENT_PART: &str = "word/document.xml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordParagraph {
    pub text: String,
    pub kind: BlockKind,
    pub level: u8,
}

/// Rows of cell texts. A cell's paragraphs are joined with `\n`.
pub type WordTable = Vec<Vec<String>>;

#[derive(Debug, Clone, Default)]
pub struct WordDocument {
    pub paragraphs: Vec<WordParagraph>,
    pub tables: Vec<WordTable>,
}

/// Paragraph role from its style id and numbering.
fn classify(style: Option<&str>, numbered: bool) -> (BlockKind, u8) {
    let style = style.unwrap_or_default();
    let lower = style.to_ascii_lowercase();
    if lower == "title" {
        return (BlockKind::Heading, 1);
    }
    if lower == "subtitle" {
        return (BlockKind::Subheading, 1);
    }
    if let Some(n) = lower.strip_prefix("heading") {
        let level = n.trim().parse::<u8>().unwrap_or(1).clamp(1, 6);
        return (BlockKind::Heading, level);
    }
    if lower == "caption" {
        return (BlockKind::Caption, 1);
    }
    if numbered || lower.starts_with("list") {
        return (BlockKind::ListItem, 1);
    }
    (BlockKind::Paragraph, 1)
}

#[derive(Default)]
struct ParaState {
    text: String,
    style: Option<String>,
    numbered: bool,
}

/// A closed paragraph goes to the open table cell, or to the body when it
/// is outside any table.
fn finish_paragraph(
    p: ParaState,
    cell: Option<&mut Vec<String>>,
    depth: usize,
    doc: &mut WordDocument,
) {
    match cell {
        Some(c) => c.push(p.text),
        None if depth == 0 => {
            let (kind, level) = classify(p.style.as_deref(), p.numbered);
            doc.paragraphs.push(WordParagraph {
                text: p.text,
                kind,
                level,
            });
        }
        None => {}
    }
}

impl WordDocument {
    pub fn open(path: &Path) -> Result<Self, TranslateError> {
        Self::from_package(&Package::open(path)?, path)
    }

    pub fn from_package(package: &Package, source: &Path) -> Result<Self, TranslateError> {
        let xml = package
            .text(DOCUMENT_PART)?
            .ok_or_else(|| TranslateError::InvalidDocument {
                path: source.to_path_buf(),
                detail: format!("missing '{DOCUMENT_PART}'"),
            })?;
        let doc = Self::parse(&xml)?;
        debug!(
            "read {}: {} paragraphs, {} tables",
            source.display(),
            doc.paragraphs.len(),
            doc.tables.len()
        );
        Ok(doc)
    }

    /// Parse a `document.xml` body. Nested tables are flattened into the
    /// cell of the outermost table that contains them.
    pub fn parse(xml: &str) -> Result<Self, TranslateError> {
        let mut doc = WordDocument::default();
        let mut para: Option<ParaState> = None;
        let mut in_text = false;
        let mut in_run = false;
        let mut depth = 0usize;
        let mut table: WordTable = Vec::new();
        let mut cell: Option<Vec<String>> = None;

        scan(DOCUMENT_PART, xml, |event, _| {
            use quick_xml::events::Event;
            match event {
                Event::Start(e) | Event::Empty(e) => {
                    let empty = matches!(event, Event::Empty(_));
                    match e.local_name().as_ref() {
                        b"tbl" if !empty => {
                            depth += 1;
                            if depth == 1 {
                                table = Vec::new();
                            }
                        }
                        b"tr" if depth == 1 && !empty => table.push(Vec::new()),
                        b"tc" if depth == 1 => {
                            if empty {
                                if let Some(row) = table.last_mut() {
                                    row.push(String::new());
                                }
                            } else {
                                cell = Some(Vec::new());
                            }
                        }
                        b"p" if empty => {
                            finish_paragraph(ParaState::default(), cell.as_mut(), depth, &mut doc)
                        }
                        b"p" => para = Some(ParaState::default()),
                        b"r" if !empty => in_run = true,
                        b"pStyle" => {
                            if let Some(p) = para.as_mut() {
                                p.style = attr(e, b"val");
                            }
                        }
                        b"numPr" => {
                            if let Some(p) = para.as_mut() {
                                p.numbered = true;
                            }
                        }
                        b"t" if !empty => in_text = true,
                        b"tab" if in_run => {
                            if let Some(p) = para.as_mut() {
                                p.text.push('\t');
                            }
                        }
                        b"br" | b"cr" if in_run => {
                            if let Some(p) = para.as_mut() {
                                p.text.push('\n');
                            }
                        }
                        _ => {}
                    }
                }
                Event::Text(t) if in_text => {
                    if let Some(p) = para.as_mut() {
                        p.text
                            .push_str(&t.unescape().map_err(|e| TranslateError::xml(DOCUMENT_PART, e))?);
                    }
                }
                Event::End(e) => match e.local_name().as_ref() {
                    b"t" => in_text = false,
                    b"r" => in_run = false,
                    b"p" => {
                        if let Some(p) = para.take() {
                            finish_paragraph(p, cell.as_mut(), depth, &mut doc);
                        }
                    }
                    b"tc" if depth == 1 => {
                        if let (Some(c), Some(row)) = (cell.take(), table.last_mut()) {
                            row.push(c.join("\n"));
                        }
                    }
                    b"tbl" => {
                        if depth == 1 {
                            doc.tables.push(std::mem::take(&mut table));
                        }
                        depth = depth.saturating_sub(1);
                    }
                    _ => {}
                },
                _ => {}
            }
            Ok(())
        })?;
        Ok(doc)
    }

    /// One page: paragraphs as blocks, each table with its first row as
    /// columns. Blank paragraphs are dropped.
    pub fn into_page(self) -> PageStructure {
        let text_blocks = self
            .paragraphs
            .into_iter()
            .filter(|p| !p.text.trim().is_empty())
            .map(|p| TextBlock {
                kind: p.kind,
                text: p.text,
                style: BlockStyle {
                    bold: p.kind == BlockKind::Heading,
                    level: p.level,
                },
            })
            .collect();
        let tables = self
            .tables
            .into_iter()
            .filter(|t| !t.is_empty())
            .map(|mut rows| {
                let columns = rows.remove(0);
                Table {
                    columns,
                    rows,
                    ..Table::default()
                }
            })
            .collect();
        PageStructure {
            page_type: "document".to_string(),
            text_blocks,
            tables,
            ..PageStructure::default()
        }
    }
}

impl TranslatableDocument for WordDocument {
    fn fragments(&self) -> Vec<Fragment> {
        let paragraphs = self
            .paragraphs
            .iter()
            .enumerate()
            .filter_map(|(i, p)| Fragment::new(p.text.clone(), Location::Paragraph(i)));
        let cells = self.tables.iter().enumerate().flat_map(|(t, rows)| {
            rows.iter().enumerate().flat_map(move |(r, row)| {
                row.iter().enumerate().filter_map(move |(c, text)| {
                    Fragment::new(
                        text.clone(),
                        Location::TableCell {
                            table: t,
                            row: r,
                            col: c,
                        },
                    )
                })
            })
        });
        paragraphs
            .chain(cells)
            .map(|f| f.with_context(CONTEXT))
            .collect()
    }

    fn apply(&mut self, translations: &HashMap<Location, String>) -> usize {
        let mut written = 0;
        for (location, text) in translations {
            let slot = match *location {
                Location::Paragraph(i) => self.paragraphs.get_mut(i).map(|p| &mut p.text),
                Location::TableCell { table, row, col } => self
                    .tables
                    .get_mut(table)
                    .and_then(|t| t.get_mut(row))
                    .and_then(|r| r.get_mut(col)),
                _ => None,
            };
            if let Some(slot) = slot {
                *slot = text.clone();
                written += 1;
            }
        }
        written
    }
}
