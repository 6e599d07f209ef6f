//! Zip container access shared by the spreadsheet and word-processor
//! adapters, the archive reconciler and the validator.
//!
//! A [`Package`] is read fully into memory, member order and per-member zip
//! metadata included, so that writing it back reproduces every member the
//! caller did not touch byte-for-byte. Writes are atomic: the container is
//! written to a temporary file in the destination directory and renamed over
//! the target.

use crate::error::TranslateError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::ops::Range;
use std::path::Path;
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// One archive member with the metadata needed to write it back unchanged.
#[derive(Debug, Clone)]
pub struct Member {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl Member {
    fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
            compression: CompressionMethod::Deflated,
            last_modified: zip::DateTime::default(),
            unix_mode: None,
            is_dir: false,
        }
    }
}

/// An in-memory zip container.
#[derive(Debug, Clone, Default)]
pub struct Package {
    members: Vec<Member>,
}

impl Package {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every member of the container at `path`.
    pub fn open(path: &Path) -> Result<Self, TranslateError> {
        let file = File::open(path).map_err(|e| TranslateError::archive(path, e))?;
        Self::read_from(file, path)
    }

    pub fn from_bytes(bytes: &[u8], label: &Path) -> Result<Self, TranslateError> {
        Self::read_from(Cursor::new(bytes), label)
    }

    fn read_from<R: Read + Seek>(reader: R, label: &Path) -> Result<Self, TranslateError> {
        let mut zip = ZipArchive::new(reader).map_err(|e| TranslateError::archive(label, e))?;
        let mut members = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).map_err(|e| TranslateError::archive(label, e))?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)
                .map_err(|e| TranslateError::archive(label, format!("{}: {e}", file.name())))?;
            members.push(Member {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { members })
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.iter().any(|m| m.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.members
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.data.as_slice())
    }

    /// Member content as UTF-8 text. `Ok(None)` when the member is absent.
    pub fn text(&self, name: &str) -> Result<Option<String>, TranslateError> {
        self.get(name)
            .map(|bytes| {
                String::from_utf8(bytes.to_vec()).map_err(|e| TranslateError::xml(name, e))
            })
            .transpose()
    }

    /// Replace a member's content, or append a new member.
    pub fn set(&mut self, name: &str, data: Vec<u8>) {
        match self.members.iter_mut().find(|m| m.name == name) {
            Some(member) => member.data = data,
            None => self.members.push(Member::new(name, data)),
        }
    }

    /// Append a member carrying its original zip metadata.
    pub fn push(&mut self, member: Member) {
        self.members.retain(|m| m.name != member.name);
        self.members.push(member);
    }

    pub fn remove(&mut self, name: &str) -> Option<Member> {
        let idx = self.members.iter().position(|m| m.name == name)?;
        Some(self.members.remove(idx))
    }

    fn write_into<W: Write + Seek>(&self, writer: W) -> zip::result::ZipResult<W> {
        let mut zout = ZipWriter::new(writer);
        for m in &self.members {
            let mut opts = SimpleFileOptions::default()
                .compression_method(m.compression)
                .last_modified_time(m.last_modified);
            if let Some(mode) = m.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if m.is_dir || m.name.ends_with('/') {
                zout.add_directory(m.name.as_str(), opts)?;
            } else {
                zout.start_file(m.name.as_str(), opts)?;
                zout.write_all(&m.data)?;
            }
        }
        zout.finish()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TranslateError> {
        self.write_into(Cursor::new(Vec::new()))
            .map(Cursor::into_inner)
            .map_err(|e| TranslateError::archive("<memory>", e))
    }

    /// Write the container to `path`, atomically replacing any existing file.
    pub fn write_to(&self, path: &Path) -> Result<(), TranslateError> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(|e| TranslateError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        let tmp = NamedTempFile::new_in(parent).map_err(|e| TranslateError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.write_into(tmp.as_file())
            .map_err(|e| TranslateError::archive(path, e))?;
        tmp.persist(path)
            .map_err(|e| TranslateError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e.error,
            })?;
        Ok(())
    }
}

// ── Relationships ────────────────────────────────────────────────────────

/// One `<Relationship>` of a `.rels` part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

/// `xl/worksheets/sheet1.xml` → `xl/worksheets/_rels/sheet1.xml.rels`.
pub fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target against the part that owns the `.rels`.
///
/// Absolute targets (`/xl/...`) are taken from the package root; relative
/// ones are joined to the source part's directory with `..` collapsed.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        return abs.to_string();
    }
    let mut parts: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

pub fn parse_relationships(part: &str, xml: &str) -> Result<Vec<Relationship>, TranslateError> {
    let mut rels = Vec::new();
    scan(part, xml, |event, _| {
        if let Event::Start(e) | Event::Empty(e) = event {
            if e.local_name().as_ref() == b"Relationship" {
                rels.push(Relationship {
                    id: attr(e, b"Id").unwrap_or_default(),
                    rel_type: attr(e, b"Type").unwrap_or_default(),
                    target: attr(e, b"Target").unwrap_or_default(),
                    external: attr(e, b"TargetMode").as_deref() == Some("External"),
                });
            }
        }
        Ok(())
    })?;
    Ok(rels)
}

// ── XML scanning and span edits ──────────────────────────────────────────

/// Walk `xml` event by event, handing each event and its byte span to `f`.
pub fn scan<'a, F>(part: &str, xml: &'a str, mut f: F) -> Result<(), TranslateError>
where
    F: FnMut(&Event<'a>, Range<usize>) -> Result<(), TranslateError>,
{
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    loop {
        let start = reader.buffer_position() as usize;
        let event = reader
            .read_event()
            .map_err(|e| TranslateError::xml(part, e))?;
        let end = reader.buffer_position() as usize;
        if let Event::Eof = event {
            return Ok(());
        }
        f(&event, start..end)?;
    }
}

/// Attribute value by local name, unescaped.
pub fn attr(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Replace `range` of a part with `replacement`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub range: Range<usize>,
    pub replacement: String,
}

impl TextEdit {
    pub fn new(range: Range<usize>, replacement: impl Into<String>) -> Self {
        Self {
            range,
            replacement: replacement.into(),
        }
    }
}

/// Apply non-overlapping edits to `xml`. Edits may come in any order.
pub fn apply_edits(xml: &str, mut edits: Vec<TextEdit>) -> String {
    edits.sort_by_key(|e| e.range.start);
    let mut out = String::with_capacity(xml.len());
    let mut cursor = 0;
    for edit in edits {
        if edit.range.start < cursor {
            continue;
        }
        out.push_str(&xml[cursor..edit.range.start]);
        out.push_str(&edit.replacement);
        cursor = edit.range.end;
    }
    out.push_str(&xml[cursor..]);
    out
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rels_paths() {
        assert_eq!(
            rels_path_for("xl/worksheets/sheet1.xml"),
            "xl/worksheets/_rels/sheet1.xml.rels"
        );
        assert_eq!(rels_path_for("workbook.xml"), "_rels/workbook.xml.rels");
    }

    #[test]
    fn targets_resolve_relative_and_absolute() {
        assert_eq!(
            resolve_target("xl/worksheets/sheet1.xml", "../comments1.xml"),
            "xl/comments1.xml"
        );
        assert_eq!(
            resolve_target("xl/workbook.xml", "worksheets/sheet2.xml"),
            "xl/worksheets/sheet2.xml"
        );
        assert_eq!(
            resolve_target("xl/workbook.xml", "/xl/sharedStrings.xml"),
            "xl/sharedStrings.xml"
        );
    }

    #[test]
    fn relationships_parse() {
        let xml = r#"<?xml version="1.0"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://x/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId2" Type="http://x/hyperlink" Target="https://a.b/?x=1&amp;y=2" TargetMode="External"/>
</Relationships>"#;
        let rels = parse_relationships("rels", xml).unwrap();
        assert_eq!(rels.len(), 2);
        assert_eq!(rels[0].target, "worksheets/sheet1.xml");
        assert!(rels[1].external);
        assert_eq!(rels[1].target, "https://a.b/?x=1&y=2");
    }

    #[test]
    fn scan_spans_cover_text() {
        let xml = "<a><t>hi</t></a>";
        let mut spans = Vec::new();
        scan("p", xml, |e, r| {
            if let Event::Text(_) = e {
                spans.push(r);
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(spans, vec![6..8]);
        assert_eq!(&xml[6..8], "hi");
    }

    #[test]
    fn edits_apply_in_any_order() {
        let xml = "<a>one</a><b>two</b>";
        let out = apply_edits(
            xml,
            vec![TextEdit::new(13..16, "2"), TextEdit::new(3..6, "1")],
        );
        assert_eq!(out, "<a>1</a><b>2</b>");
    }

    #[test]
    fn package_roundtrip_preserves_order_and_content() {
        let mut p = fixtures::package(&[("b.xml", "<b/>"), ("a.xml", "<a/>")]);
        p.set("b.xml", b"<b>new</b>".to_vec());
        p.set("c.xml", b"<c/>".to_vec());
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.zip");
        p.write_to(&path).unwrap();

        let back = Package::open(&path).unwrap();
        assert_eq!(back.names().collect::<Vec<_>>(), vec!["b.xml", "a.xml", "c.xml"]);
        assert_eq!(back.get("b.xml").unwrap(), b"<b>new</b>");
        assert_eq!(back.text("missing.xml").unwrap(), None);
    }

    #[test]
    fn open_rejects_non_zip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fake.xlsx");
        std::fs::write(&path, b"not a zip").unwrap();
        assert!(matches!(
            Package::open(&path),
            Err(TranslateError::Archive { .. })
        ));
    }
}
