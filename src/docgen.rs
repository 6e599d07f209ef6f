//! Word-processor document generator.
//!
//! Renders a sequence of [`PageStructure`]s into a `.docx` package written
//! directly as WordprocessingML: a title page in its own section (no footer),
//! then one content section with a centred `PAGE` field in the footer. All
//! formatting is direct run/paragraph formatting, so the package carries no
//! `styles.xml`.
//!
//! ## Layout
//!
//! ```text
//! ┌ title section ──────────────┐   ┌ content section ─────────────┐
//! │ <stem, title-cased>   32pt   │   │                     Page N   │
//! │ ──────────────────           │   │ <page title>         18pt    │
//! │ Professional English ...     │   │ ─────────────────────────    │
//! │ Document Date: <date>        │   │ blocks, Form Data, tables    │
//! └──────────────────────────────┘   │           - N -  (footer)    │
//!                                    └──────────────────────────────┘
//! ```

use crate::error::TranslateError;
use crate::extract::package::Package;
use crate::page::{BlockKind, FormField, PageStructure, Table, TextBlock};
use chrono::NaiveDate;
use quick_xml::escape::partial_escape;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, info};

// ── Page geometry (twips) ────────────────────────────────────────────────

/// US Letter, 8.5 × 11 in.
const PAGE_WIDTH: u32 = 12240;
const PAGE_HEIGHT: u32 = 15840;
/// 1 in on every side.
const MARGIN: u32 = 1440;
const CONTENT_WIDTH: u32 = PAGE_WIDTH - 2 * MARGIN;

// ── Palette ──────────────────────────────────────────────────────────────

pub mod palette {
    pub const HEADER_BG: &str = "1F4788";
    pub const HEADER_TEXT: &str = "FFFFFF";
    pub const HEADER_BORDER: &str = "0D2447";
    pub const ROW_EVEN: &str = "F8FAFC";
    pub const ROW_ODD: &str = "FFFFFF";
    pub const BORDER: &str = "9CA3AF";
    pub const TEXT: &str = "1F2937";
    pub const TEXT_LIGHT: &str = "6B7280";
    pub const ACCENT: &str = "1F4788";
    pub const ACCENT_LIGHT: &str = "3B82F6";
}

const FOOTER_REL_ID: &str = "rIdFooter1";

// ── Formatting primitives ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct RunFmt {
    /// Points.
    size: u32,
    bold: bool,
    italic: bool,
    color: &'static str,
    font: &'static str,
}

impl RunFmt {
    const fn new(size: u32, color: &'static str) -> Self {
        Self {
            size,
            bold: false,
            italic: false,
            color,
            font: "Calibri",
        }
    }

    fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    fn font(mut self, font: &'static str) -> Self {
        self.font = font;
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ParaFmt {
    align: Option<&'static str>,
    /// Points.
    before: u32,
    after: u32,
    /// Twips.
    indent_left: u32,
    hanging: u32,
    /// 240ths of a line.
    line: Option<u32>,
    keep_next: bool,
}

impl ParaFmt {
    const fn aligned(align: &'static str) -> Self {
        Self {
            align: Some(align),
            before: 0,
            after: 0,
            indent_left: 0,
            hanging: 0,
            line: None,
            keep_next: false,
        }
    }

    fn spacing(mut self, before: u32, after: u32) -> Self {
        self.before = before;
        self.after = after;
        self
    }

    fn indent(mut self, left: u32, hanging: u32) -> Self {
        self.indent_left = left;
        self.hanging = hanging;
        self
    }

    fn properties(&self) -> String {
        let mut ppr = String::new();
        if self.keep_next {
            ppr.push_str("<w:keepNext/>");
        }
        if self.before > 0 || self.after > 0 || self.line.is_some() {
            let _ = write!(
                ppr,
                r#"<w:spacing w:before="{}" w:after="{}""#,
                self.before * 20,
                self.after * 20
            );
            if let Some(line) = self.line {
                let _ = write!(ppr, r#" w:line="{line}" w:lineRule="auto""#);
            }
            ppr.push_str("/>");
        }
        if self.indent_left > 0 || self.hanging > 0 {
            let _ = write!(ppr, r#"<w:ind w:left="{}""#, self.indent_left);
            if self.hanging > 0 {
                let _ = write!(ppr, r#" w:hanging="{}""#, self.hanging);
            }
            ppr.push_str("/>");
        }
        if let Some(align) = self.align {
            let _ = write!(ppr, r#"<w:jc w:val="{align}"/>"#);
        }
        ppr
    }
}

/// One run; line breaks in `text` become `<w:br/>`.
fn run(text: &str, fmt: &RunFmt) -> String {
    let mut xml = String::from("<w:r><w:rPr>");
    let _ = write!(
        xml,
        r#"<w:rFonts w:ascii="{0}" w:hAnsi="{0}" w:cs="{0}"/>"#,
        fmt.font
    );
    if fmt.bold {
        xml.push_str("<w:b/>");
    }
    if fmt.italic {
        xml.push_str("<w:i/>");
    }
    let _ = write!(
        xml,
        r#"<w:color w:val="{}"/><w:sz w:val="{}"/></w:rPr>"#,
        fmt.color,
        fmt.size * 2
    );
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            xml.push_str("<w:br/>");
        }
        let _ = write!(xml, r#"<w:t xml:space="preserve">{}</w:t>"#, partial_escape(line));
    }
    xml.push_str("</w:r>");
    xml
}

fn paragraph(fmt: &ParaFmt, runs: &[String]) -> String {
    let ppr = fmt.properties();
    let mut xml = String::from("<w:p>");
    if !ppr.is_empty() {
        let _ = write!(xml, "<w:pPr>{ppr}</w:pPr>");
    }
    for r in runs {
        xml.push_str(r);
    }
    xml.push_str("</w:p>");
    xml
}

fn empty_paragraph() -> String {
    "<w:p/>".to_string()
}

fn page_break() -> String {
    r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#.to_string()
}

/// Page size and margins, optionally with the page-number footer.
fn section_properties(with_footer: bool) -> String {
    let mut xml = String::from("<w:sectPr>");
    if with_footer {
        let _ = write!(
            xml,
            r#"<w:footerReference w:type="default" r:id="{FOOTER_REL_ID}"/>"#
        );
    }
    let _ = write!(
        xml,
        r#"<w:pgSz w:w="{PAGE_WIDTH}" w:h="{PAGE_HEIGHT}"/><w:pgMar w:top="{MARGIN}" w:right="{MARGIN}" w:bottom="{MARGIN}" w:left="{MARGIN}" w:header="720" w:footer="720" w:gutter="0"/></w:sectPr>"#
    );
    xml
}

// ── Tables ───────────────────────────────────────────────────────────────

struct CellFmt {
    shading: &'static str,
    border: &'static str,
    /// Eighths of a point: left/right, top, bottom.
    width: u32,
    top: u32,
    bottom: u32,
}

impl CellFmt {
    const fn plain(shading: &'static str, border: &'static str, width: u32) -> Self {
        Self {
            shading,
            border,
            width,
            top: width,
            bottom: width,
        }
    }
}

fn cell(width: u32, fmt: &CellFmt, content: String) -> String {
    format!(
        concat!(
            r#"<w:tc><w:tcPr><w:tcW w:w="{w}" w:type="dxa"/><w:tcBorders>"#,
            r#"<w:top w:val="single" w:sz="{top}" w:color="{c}"/>"#,
            r#"<w:left w:val="single" w:sz="{side}" w:color="{c}"/>"#,
            r#"<w:bottom w:val="single" w:sz="{bottom}" w:color="{c}"/>"#,
            r#"<w:right w:val="single" w:sz="{side}" w:color="{c}"/>"#,
            r#"</w:tcBorders><w:shd w:val="clear" w:color="auto" w:fill="{fill}"/>"#,
            r#"<w:vAlign w:val="center"/></w:tcPr>{content}</w:tc>"#
        ),
        w = width,
        top = fmt.top,
        side = fmt.width,
        bottom = fmt.bottom,
        c = fmt.border,
        fill = fmt.shading,
        content = content,
    )
}

fn table_open(cols: usize, align: &str) -> (String, u32) {
    let col_width = CONTENT_WIDTH / cols.max(1) as u32;
    let mut xml = format!(
        r#"<w:tbl><w:tblPr><w:tblW w:w="{CONTENT_WIDTH}" w:type="dxa"/><w:jc w:val="{align}"/><w:tblLayout w:type="autofit"/></w:tblPr><w:tblGrid>"#
    );
    for _ in 0..cols {
        let _ = write!(xml, r#"<w:gridCol w:w="{col_width}"/>"#);
    }
    xml.push_str("</w:tblGrid>");
    (xml, col_width)
}

// ── Generator ────────────────────────────────────────────────────────────

/// Builds the translated `.docx` for one source file.
#[derive(Debug, Clone)]
pub struct DocxGenerator {
    title: String,
    date: NaiveDate,
}

impl DocxGenerator {
    /// Title from the source file stem, dated today.
    pub fn new(source: &Path) -> Self {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        Self {
            title: display_title(stem),
            date: chrono::Local::now().date_naive(),
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Render `pages` and write the package to `output`.
    pub fn write(&self, pages: &[PageStructure], output: &Path) -> Result<(), TranslateError> {
        let package = self.build(pages);
        package.write_to(output)?;
        info!(
            "Generated {} ({} pages) → {}",
            self.title,
            pages.len(),
            output.display()
        );
        Ok(())
    }

    /// Render `pages` into an in-memory package.
    pub fn build(&self, pages: &[PageStructure]) -> Package {
        let mut pkg = Package::new();
        pkg.set("[Content_Types].xml", CONTENT_TYPES.as_bytes().to_vec());
        pkg.set("_rels/.rels", ROOT_RELS.as_bytes().to_vec());
        pkg.set("docProps/core.xml", self.core_properties().into_bytes());
        pkg.set("word/document.xml", self.document(pages).into_bytes());
        pkg.set("word/_rels/document.xml.rels", DOCUMENT_RELS.as_bytes().to_vec());
        pkg.set("word/footer1.xml", FOOTER.as_bytes().to_vec());
        pkg
    }

    fn core_properties(&self) -> String {
        let created = self.date.format("%Y-%m-%dT00:00:00Z");
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" "#,
                r#"xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" "#,
                r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
                r#"<dc:title>{title}</dc:title><dc:subject>Translated Document</dc:subject>"#,
                r#"<cp:category>Translation</cp:category>"#,
                r#"<dc:description>Professional English translation with preserved formatting</dc:description>"#,
                r#"<dcterms:created xsi:type="dcterms:W3CDTF">{created}</dcterms:created>"#,
                r#"</cp:coreProperties>"#
            ),
            title = partial_escape(&self.title),
            created = created,
        )
    }

    fn document(&self, pages: &[PageStructure]) -> String {
        let mut body = String::new();
        self.title_page(&mut body);
        for (idx, page) in pages.iter().enumerate() {
            if idx > 0 {
                body.push_str(&page_break());
            }
            page_content(&mut body, page, idx + 1);
        }
        debug!("document body: {} bytes for {} pages", body.len(), pages.len());

        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
                r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
                "<w:body>{body}{sect}</w:body></w:document>"
            ),
            body = body,
            sect = section_properties(true),
        )
    }

    /// Title page; its last paragraph closes the footer-less first section.
    fn title_page(&self, body: &mut String) {
        for _ in 0..8 {
            body.push_str(&empty_paragraph());
        }
        let centered = ParaFmt::aligned("center");
        body.push_str(&paragraph(
            &centered,
            &[run(&self.title, &RunFmt::new(32, palette::ACCENT).bold())],
        ));
        body.push_str(&empty_paragraph());
        body.push_str(&paragraph(
            &centered,
            &[run(&"─".repeat(50), &RunFmt::new(10, palette::BORDER).font("Arial"))],
        ));
        body.push_str(&empty_paragraph());
        body.push_str(&empty_paragraph());
        body.push_str(&paragraph(
            &centered,
            &[run(
                "Professional English Translation",
                &RunFmt::new(16, palette::TEXT_LIGHT),
            )],
        ));
        for _ in 0..15 {
            body.push_str(&empty_paragraph());
        }
        let date = format!("Document Date: {}", self.date.format("%B %d, %Y"));
        let _ = write!(
            body,
            "<w:p><w:pPr>{}{}</w:pPr>{}</w:p>",
            centered.properties(),
            section_properties(false),
            run(&date, &RunFmt::new(10, palette::TEXT_LIGHT))
        );
    }
}

fn page_content(body: &mut String, page: &PageStructure, page_num: usize) {
    body.push_str(&paragraph(
        &ParaFmt::aligned("right").spacing(0, 12),
        &[run(&format!("Page {page_num}"), &RunFmt::new(9, palette::TEXT_LIGHT))],
    ));

    if !page.title.trim().is_empty() {
        body.push_str(&paragraph(
            &ParaFmt::aligned("left").spacing(6, 12),
            &[run(&page.title, &RunFmt::new(18, palette::ACCENT).bold())],
        ));
        body.push_str(&paragraph(
            &ParaFmt::default().spacing(0, 8),
            &[run(&"─".repeat(80), &RunFmt::new(8, palette::BORDER).font("Arial"))],
        ));
        body.push_str(&empty_paragraph());
    }

    for block in &page.text_blocks {
        if !block.text.trim().is_empty() {
            body.push_str(&text_block(block));
        }
    }

    if !page.forms.is_empty() {
        body.push_str(&empty_paragraph());
        form_table(body, &page.forms);
    }

    if !page.tables.is_empty() {
        if !page.text_blocks.is_empty() || !page.forms.is_empty() {
            body.push_str(&paragraph(&ParaFmt::default().spacing(12, 12), &[]));
        }
        for table in &page.tables {
            data_table(body, table);
        }
    }
}

fn text_block(block: &TextBlock) -> String {
    let text = block.text.as_str();
    match block.kind {
        BlockKind::Heading => {
            let size = 18u32.saturating_sub((block.style.level.clamp(1, 6) as u32 - 1) * 2);
            paragraph(
                &ParaFmt::default().spacing(12, 8),
                &[run(text, &RunFmt::new(size, palette::ACCENT).bold())],
            )
        }
        BlockKind::Subheading => paragraph(
            &ParaFmt::default().spacing(8, 6),
            &[run(text, &RunFmt::new(12, palette::ACCENT).bold())],
        ),
        BlockKind::ListItem => paragraph(
            &ParaFmt::default().spacing(0, 3).indent(432, 288),
            &[run(&format!("• {text}"), &RunFmt::new(11, palette::TEXT))],
        ),
        BlockKind::Caption => paragraph(
            &ParaFmt::aligned("center").spacing(3, 8),
            &[run(text, &RunFmt::new(9, palette::TEXT_LIGHT).italic())],
        ),
        BlockKind::Note => paragraph(
            &ParaFmt::default().spacing(4, 4).indent(360, 0),
            &[run(text, &RunFmt::new(9, palette::TEXT_LIGHT).italic())],
        ),
        BlockKind::Paragraph => {
            let mut fmt = RunFmt::new(11, palette::TEXT);
            fmt.bold = block.style.bold;
            let para = ParaFmt {
                line: Some(276),
                ..ParaFmt::aligned("both").spacing(0, 6)
            };
            paragraph(&para, &[run(text, &fmt)])
        }
    }
}

/// "Form Data" heading plus a label/value table.
fn form_table(body: &mut String, forms: &[FormField]) {
    body.push_str(&paragraph(
        &ParaFmt::default().spacing(12, 6),
        &[run("Form Data", &RunFmt::new(12, palette::ACCENT).bold())],
    ));

    let (mut xml, col_width) = table_open(2, "left");
    let cell_para = ParaFmt::default().spacing(4, 4).indent(144, 0);
    for field in forms {
        xml.push_str("<w:tr>");
        xml.push_str(&cell(
            col_width,
            &CellFmt::plain(palette::ROW_EVEN, palette::BORDER, 4),
            paragraph(&cell_para, &[run(&field.label, &RunFmt::new(10, palette::TEXT).bold())]),
        ));
        xml.push_str(&cell(
            col_width,
            &CellFmt::plain("FFFFFF", palette::BORDER, 4),
            paragraph(&cell_para, &[run(&field.value, &RunFmt::new(10, palette::TEXT))]),
        ));
        xml.push_str("</w:tr>");
    }
    xml.push_str("</w:tbl>");
    body.push_str(&xml);
    body.push_str(&empty_paragraph());
    body.push_str(&empty_paragraph());
}

/// Titled table with a shaded header row and alternating row colours.
/// Tables with neither columns nor rows are skipped.
fn data_table(body: &mut String, table: &Table) {
    let num_cols = if table.columns.is_empty() {
        table.rows.first().map_or(0, Vec::len)
    } else {
        table.columns.len()
    };
    if num_cols == 0 {
        return;
    }

    body.push_str(&empty_paragraph());
    if !table.title.trim().is_empty() {
        let fmt = ParaFmt {
            keep_next: true,
            ..ParaFmt::aligned("left").spacing(16, 8)
        };
        body.push_str(&paragraph(
            &fmt,
            &[
                run("▌ ", &RunFmt::new(12, palette::ACCENT_LIGHT).bold()),
                run(&table.title, &RunFmt::new(12, palette::ACCENT).bold()),
            ],
        ));
    }

    let (mut xml, col_width) = table_open(num_cols, "center");
    let mut row_idx = 0usize;
    if !table.columns.is_empty() {
        let header = CellFmt {
            top: 8,
            bottom: 10,
            ..CellFmt::plain(palette::HEADER_BG, palette::HEADER_BORDER, 6)
        };
        xml.push_str(r#"<w:tr><w:trPr><w:trHeight w:val="432"/><w:tblHeader/></w:trPr>"#);
        for text in &table.columns {
            xml.push_str(&cell(
                col_width,
                &header,
                paragraph(
                    &ParaFmt::aligned("center").spacing(6, 6),
                    &[run(text, &RunFmt::new(11, palette::HEADER_TEXT).bold())],
                ),
            ));
        }
        xml.push_str("</w:tr>");
        row_idx = 1;
    }

    for row in &table.rows {
        let shading = if row_idx % 2 == 0 {
            palette::ROW_EVEN
        } else {
            palette::ROW_ODD
        };
        xml.push_str(r#"<w:tr><w:trPr><w:trHeight w:val="432"/></w:trPr>"#);
        for col in 0..num_cols {
            let text = row.get(col).map(String::as_str).unwrap_or_default();
            xml.push_str(&cell(
                col_width,
                &CellFmt::plain(shading, palette::BORDER, 3),
                paragraph(
                    &ParaFmt::aligned("center").spacing(4, 4),
                    &[run(text, &RunFmt::new(10, palette::TEXT))],
                ),
            ));
        }
        xml.push_str("</w:tr>");
        row_idx += 1;
    }
    xml.push_str("</w:tbl>");
    body.push_str(&xml);

    if !table.notes.trim().is_empty() {
        body.push_str(&paragraph(
            &ParaFmt::default().spacing(4, 0).indent(360, 0),
            &[run(
                &format!("Note: {}", table.notes),
                &RunFmt::new(9, palette::TEXT_LIGHT).italic(),
            )],
        ));
    }
    body.push_str(&empty_paragraph());
    body.push_str(&empty_paragraph());
}

/// `quote_form-2024` → `Quote Form 2024`.
pub fn display_title(stem: &str) -> String {
    let words: Vec<String> = stem
        .split(['_', '-', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect();
    if words.is_empty() {
        "Document".to_string()
    } else {
        words.join(" ")
    }
}

// ── Static parts ─────────────────────────────────────────────────────────

const CONTENT_TYPES: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
    r#"<Override PartName="/word/footer1.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.footer+xml"/>"#,
    r#"<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>"#,
    r#"</Types>"#
);

const ROOT_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
    r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>"#,
    r#"</Relationships>"#
);

const DOCUMENT_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rIdFooter1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer" Target="footer1.xml"/>"#,
    r#"</Relationships>"#
);

const FOOTER: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<w:ftr xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
    r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:rPr>"#,
    r#"<w:rFonts w:ascii="Calibri" w:hAnsi="Calibri"/><w:color w:val="6B7280"/><w:sz w:val="18"/></w:rPr>"#,
    r#"<w:fldChar w:fldCharType="begin"/><w:instrText xml:space="preserve">PAGE</w:instrText>"#,
    r#"<w:fldChar w:fldCharType="end"/></w:r></w:p></w:ftr>"#
);
