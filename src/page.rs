//! Structured page content.
//!
//! A [`PageStructure`] is what the vision pass returns for one PDF page or
//! image, and what the word-processor reader produces for a `.docx` body. The
//! document generator ([`crate::docgen`]) renders a sequence of them.

use serde::Serialize;

/// Role of a text block on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Heading,
    Subheading,
    Paragraph,
    ListItem,
    Caption,
    Note,
}

impl BlockKind {
    /// Map a model-supplied label to a kind. Unknown labels become paragraphs.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "heading" | "title" | "header" => BlockKind::Heading,
            "subheading" | "sub_heading" | "subtitle" => BlockKind::Subheading,
            "list_item" | "list" | "bullet" => BlockKind::ListItem,
            "caption" => BlockKind::Caption,
            "note" | "footnote" => BlockKind::Note,
            _ => BlockKind::Paragraph,
        }
    }
}

/// Style hints. `level` is only meaningful for headings and is kept in 1–6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockStyle {
    pub bold: bool,
    pub level: u8,
}

impl Default for BlockStyle {
    fn default() -> Self {
        Self {
            bold: false,
            level: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextBlock {
    pub kind: BlockKind,
    pub text: String,
    pub style: BlockStyle,
}

impl TextBlock {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Paragraph,
            text: text.into(),
            style: BlockStyle::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormField {
    pub label: String,
    pub value: String,
}

/// One logical page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageStructure {
    pub page_type: String,
    pub title: String,
    pub text_blocks: Vec<TextBlock>,
    pub tables: Vec<Table>,
    pub forms: Vec<FormField>,
}

impl Default for PageStructure {
    fn default() -> Self {
        Self {
            page_type: "general".to_string(),
            title: String::new(),
            text_blocks: Vec::new(),
            tables: Vec::new(),
            forms: Vec::new(),
        }
    }
}

impl PageStructure {
    /// Degraded page: the whole text as a single paragraph.
    pub fn single_paragraph(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut page = Self::default();
        if !text.trim().is_empty() {
            page.text_blocks.push(TextBlock::paragraph(text.trim()));
        }
        page
    }

    /// Number of renderable items (blocks, tables and form rows).
    pub fn item_count(&self) -> usize {
        self.text_blocks.len() + self.tables.len() + self.forms.len()
    }

    /// Mutable access to every string the generator will render, in reading
    /// order: title, blocks, forms, then tables.
    pub fn texts_mut(&mut self) -> Vec<&mut String> {
        let mut out: Vec<&mut String> = vec![&mut self.title];
        out.extend(self.text_blocks.iter_mut().map(|b| &mut b.text));
        for field in &mut self.forms {
            out.push(&mut field.label);
            out.push(&mut field.value);
        }
        for table in &mut self.tables {
            out.push(&mut table.title);
            out.extend(table.columns.iter_mut());
            for row in &mut table.rows {
                out.extend(row.iter_mut());
            }
            out.push(&mut table.notes);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_kind_labels() {
        assert_eq!(BlockKind::from_label("heading"), BlockKind::Heading);
        assert_eq!(BlockKind::from_label("List Item"), BlockKind::ListItem);
        assert_eq!(BlockKind::from_label("list-item"), BlockKind::ListItem);
        assert_eq!(BlockKind::from_label("NOTE"), BlockKind::Note);
        assert_eq!(BlockKind::from_label("sidebar"), BlockKind::Paragraph);
    }

    #[test]
    fn single_paragraph_page() {
        let page = PageStructure::single_paragraph("  raw reply  ");
        assert_eq!(page.page_type, "general");
        assert_eq!(page.text_blocks, vec![TextBlock::paragraph("raw reply")]);
        assert!(PageStructure::single_paragraph("  ").text_blocks.is_empty());
    }

    #[test]
    fn texts_mut_visits_everything() {
        let mut page = PageStructure {
            title: "T".into(),
            text_blocks: vec![TextBlock::paragraph("p")],
            forms: vec![FormField {
                label: "l".into(),
                value: "v".into(),
            }],
            tables: vec![Table {
                title: "tt".into(),
                columns: vec!["c".into()],
                rows: vec![vec!["r".into()]],
                notes: "n".into(),
            }],
            ..Default::default()
        };
        for s in page.texts_mut() {
            s.push('!');
        }
        assert_eq!(page.title, "T!");
        assert_eq!(page.forms[0].value, "v!");
        assert_eq!(page.tables[0].rows[0][0], "r!");
        assert_eq!(page.tables[0].notes, "n!");
        assert_eq!(page.item_count(), 3);
    }
}
