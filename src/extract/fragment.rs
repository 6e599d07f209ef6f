//! Fragments, their positions, and the adapter contract.

use crate::engine::TranslationEngine;
use crate::error::TranslateError;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

/// Which header/footer of a worksheet a segment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HeaderPart {
    OddHeader,
    OddFooter,
}

/// Left / centre / right section of a header or footer (`&L`, `&C`, `&R`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SectionPos {
    Left,
    Center,
    Right,
}

/// Stable positional key into a source document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Location {
    /// 1-based row and column of a worksheet cell.
    Cell { sheet: String, row: u32, col: u32 },
    HeaderFooter {
        sheet: String,
        part: HeaderPart,
        position: SectionPos,
    },
    /// Cell comment, keyed by its A1 reference.
    Comment { sheet: String, cell: String },
    /// Top-level body paragraph, 0-based.
    Paragraph(usize),
    /// Table cell, all 0-based.
    TableCell { table: usize, row: usize, col: usize },
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Cell { sheet, row, col } => {
                write!(f, "{sheet}!{}", super::spreadsheet::cell_ref(*row, *col))
            }
            Location::HeaderFooter {
                sheet,
                part,
                position,
            } => write!(f, "{sheet} {part:?} {position:?}"),
            Location::Comment { sheet, cell } => write!(f, "{sheet}!{cell} (comment)"),
            Location::Paragraph(i) => write!(f, "paragraph {i}"),
            Location::TableCell { table, row, col } => {
                write!(f, "table {table} r{row} c{col}")
            }
        }
    }
}

/// A unit of translatable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    pub location: Location,
    pub context: Option<String>,
}

impl Fragment {
    /// `None` for empty or whitespace-only text, which is never queued.
    pub fn new(text: impl Into<String>, location: Location) -> Option<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return None;
        }
        Some(Self {
            text,
            location,
            context: None,
        })
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// A document whose text leaves can be enumerated and rewritten in place.
pub trait TranslatableDocument {
    /// Every fragment that should be considered for translation.
    fn fragments(&self) -> Vec<Fragment>;

    /// Write translations back to the positions they were read from.
    /// Unknown locations are ignored. Returns the number of positions written.
    fn apply(&mut self, translations: &HashMap<Location, String>) -> usize;
}

/// Translate every fragment of `doc` and write the results back.
///
/// Fragments are grouped by context so each group is one batch call with
/// its own hint. Returns `(fragments, positions written)`.
pub async fn translate_document<D: TranslatableDocument + ?Sized>(
    doc: &mut D,
    engine: &mut TranslationEngine,
) -> Result<(usize, usize), TranslateError> {
    let fragments = doc.fragments();
    let total = fragments.len();

    let mut groups: BTreeMap<Option<String>, Vec<Fragment>> = BTreeMap::new();
    for fragment in fragments {
        groups
            .entry(fragment.context.clone())
            .or_default()
            .push(fragment);
    }

    let mut translations = HashMap::with_capacity(total);
    for (context, group) in groups {
        debug!(
            "translating {} fragments (context: {:?})",
            group.len(),
            context
        );
        let texts: Vec<&str> = group.iter().map(|f| f.text.as_str()).collect();
        let translated = engine.translate_batch(&texts, context.as_deref()).await?;
        translations.extend(
            group
                .into_iter()
                .map(|f| f.location)
                .zip(translated),
        );
    }

    let written = doc.apply(&translations);
    Ok((total, written))
}
