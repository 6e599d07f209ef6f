//! Integration tests: the spreadsheet and word-processor pipelines end to
//! end against a fake model. No network, no pdfium.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use edgequake_doctrans::archive::{self, RegexRunScanner, TextRunScanner};
use edgequake_doctrans::extract::{Package, SpreadsheetDocument, WordDocument};
use edgequake_doctrans::{
    contains_non_english, translate_file_with_client, EngineSettings, FileFamily, ModelClient,
    ModelError, ModelRequest, RetryPolicy, TranslateError, TranslationEngine, TranslatorConfig,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

// ── Fake model ───────────────────────────────────────────────────────────────

const DICT: &[(&str, &str)] = &[
    ("产品名称", "Product Name"),
    ("价格", "Price"),
    ("合并单元格", "Merged Cell"),
    ("机密", "Confidential"),
    ("图表标题", "Chart Title"),
    ("备注", "Remarks"),
    ("合同", "Contract"),
    ("付款条款", "Payment Terms"),
    ("数量", "Quantity"),
];

/// Answers batch and single prompts from [`DICT`], echoing unknown text.
#[derive(Default)]
struct FakeModel {
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl FakeModel {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn saw(&self, text: &str) -> bool {
        self.prompts.lock().unwrap().iter().any(|p| p.contains(text))
    }

    fn lookup(text: &str) -> String {
        DICT.iter()
            .find(|(src, _)| *src == text)
            .map_or_else(|| text.to_string(), |(_, en)| en.to_string())
    }
}

#[async_trait]
impl ModelClient for FakeModel {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.user.clone());
        if let Some((_, list)) = request.user.split_once("Items to translate:\n") {
            let items: Vec<serde_json::Value> = list
                .lines()
                .filter_map(|l| l.split_once("] "))
                .enumerate()
                .map(|(i, (_, t))| serde_json::json!({"id": i + 1, "text": Self::lookup(t)}))
                .collect();
            return Ok(serde_json::Value::Array(items).to_string());
        }
        let text = request
            .user
            .rsplit("Translate to English:\n\n")
            .next()
            .unwrap_or_default();
        Ok(Self::lookup(text))
    }
}

/// Fails every call.
struct DownModel;

#[async_trait]
impl ModelClient for DownModel {
    async fn complete(&self, _request: &ModelRequest) -> Result<String, ModelError> {
        Err(ModelError::Provider("503 Service Unavailable".into()))
    }
}

fn config() -> TranslatorConfig {
    TranslatorConfig::builder()
        .text_retry(RetryPolicy::immediate(1))
        .vision_retry(RetryPolicy::immediate(1))
        .build()
        .unwrap()
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Quote" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/></Relationships>"#;

const SHARED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="4" uniqueCount="3"><si><t>产品名称</t></si><si><t>价格</t></si><si><t>Total</t></si></sst>"#;

const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row><row r="2"><c r="A2" t="s"><v>1</v></c><c r="B2" t="inlineStr"><is><t>合并单元格</t></is></c><c r="C2" t="inlineStr"><is><t>隐藏</t></is></c><c r="D2"><v>42</v></c><c r="E2" t="s"><v>2</v></c></row></sheetData><mergeCells count="1"><mergeCell ref="B2:C2"/></mergeCells><headerFooter><oddHeader>&amp;C机密</oddHeader></headerFooter></worksheet>"#;

const SHEET_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing" Target="../drawings/drawing1.xml"/></Relationships>"#;

const DRAWING: &str = r#"<xdr:wsDr xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"><xdr:sp><xdr:txBody><a:p><a:r><a:t>图表标题</a:t></a:r></a:p></xdr:txBody></xdr:sp></xdr:wsDr>"#;

const VML: &str = r#"<xml xmlns:v="urn:schemas-microsoft-com:vml"><v:shape><v:textbox><div>备注</div></v:textbox></v:shape></xml>"#;

fn write_zip(path: &Path, members: &[(&str, &str)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    for (name, body) in members {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

fn workbook_members() -> Vec<(&'static str, &'static str)> {
    vec![
        ("[Content_Types].xml", "<Types/>"),
        ("_rels/.rels", ROOT_RELS),
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
        ("xl/sharedStrings.xml", SHARED),
        ("xl/worksheets/sheet1.xml", SHEET),
        ("xl/worksheets/_rels/sheet1.xml.rels", SHEET_RELS),
        ("xl/drawings/drawing1.xml", DRAWING),
    ]
}

fn write_workbook(dir: &Path) -> PathBuf {
    let path = dir.join("报价单.xlsx");
    write_zip(&path, &workbook_members());
    path
}

/// Non-English text runs left anywhere in the container's XML members.
fn residue(path: &Path) -> Vec<String> {
    let pkg = Package::open(path).unwrap();
    let scanner = RegexRunScanner::validation();
    pkg.members()
        .iter()
        .filter(|m| m.name.ends_with(".xml"))
        .flat_map(|m| scanner.find_runs(std::str::from_utf8(&m.data).unwrap()))
        .map(|run| run.text)
        .filter(|t| contains_non_english(t))
        .collect()
}

// ── Spreadsheets ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn spreadsheet_is_translated_in_place() {
    let dir = tempfile::TempDir::new().unwrap();
    let input = write_workbook(dir.path());
    let model = Arc::new(FakeModel::default());

    let out = translate_file_with_client(input.to_str().unwrap(), None, model.clone(), &config())
        .await
        .unwrap();

    assert_eq!(out.family, FileFamily::Spreadsheet);
    assert_eq!(out.output_path, dir.path().join("报价单_en_translated.xlsx"));
    assert_eq!(out.pages, 1);
    assert!(!out.document.needs_review);
    assert_eq!(out.document.drawing_runs, 1);
    assert_eq!(out.document.restored_members, 0);
    let counters = out.document.spreadsheet.unwrap();
    // A1, B1, A2, B2; C2 sits under the B2 merge.
    assert_eq!(counters.cells, 4);
    assert_eq!(counters.header_footer_segments, 1);
    assert!(model.calls() >= 1);
    // The merge anchor is translated once; the covered cell never reaches
    // the model, and nothing is left for validation to fix.
    assert!(model.saw("合并单元格"));
    assert!(!model.saw("隐藏"));
    assert_eq!(out.document.validation_fixes, 0);

    let doc = SpreadsheetDocument::open(&out.output_path).unwrap();
    assert_eq!(doc.cell_text("Quote", 1, 1), Some("Product Name"));
    assert_eq!(doc.cell_text("Quote", 1, 2), Some("Price"));
    assert_eq!(doc.cell_text("Quote", 2, 1), Some("Price"));
    assert_eq!(doc.cell_text("Quote", 2, 2), Some("Merged Cell"));
    assert_eq!(doc.cell_text("Quote", 2, 3), None);
    assert_eq!(doc.cell_text("Quote", 2, 5), Some("Total"));

    let pkg = Package::open(&out.output_path).unwrap();
    let shared = pkg.text("xl/sharedStrings.xml").unwrap().unwrap();
    assert!(!shared.contains("产品名称"));
    assert!(shared.contains(r#"uniqueCount="3""#));
    let sheet = pkg.text("xl/worksheets/sheet1.xml").unwrap().unwrap();
    assert!(sheet.contains(r#"<c r="C2"/>"#));
    assert!(sheet.contains("&amp;CConfidential"));
    assert!(sheet.contains(r#"<mergeCell ref="B2:C2"/>"#));
    let drawing = pkg.text("xl/drawings/drawing1.xml").unwrap().unwrap();
    assert!(drawing.contains("<a:t>Chart Title</a:t>"));

    // The source file is untouched.
    let original = Package::open(&input).unwrap();
    assert_eq!(original.get("xl/sharedStrings.xml"), Some(SHARED.as_bytes()));
}

#[tokio::test]
async fn translated_spreadsheet_has_no_residue() {
    let dir = tempfile::TempDir::new().unwrap();
    let input = write_workbook(dir.path());
    let output = dir.path().join("out.xlsx");
    let model = Arc::new(FakeModel::default());

    let out = translate_file_with_client(
        input.to_str().unwrap(),
        Some(&output),
        model,
        &config(),
    )
    .await
    .unwrap();

    assert_eq!(out.output_path, output);
    assert!(out.document.validation_error.is_none());
    assert_eq!(residue(&output), Vec::<String>::new());
}

#[tokio::test]
async fn second_pass_over_output_is_a_no_op() {
    let dir = tempfile::TempDir::new().unwrap();
    let input = write_workbook(dir.path());
    let first = translate_file_with_client(
        input.to_str().unwrap(),
        None,
        Arc::new(FakeModel::default()),
        &config(),
    )
    .await
    .unwrap();

    let model = Arc::new(FakeModel::default());
    let again = translate_file_with_client(
        first.output_path.to_str().unwrap(),
        Some(&dir.path().join("again.xlsx")),
        model.clone(),
        &config(),
    )
    .await
    .unwrap();

    assert_eq!(again.document.positions_written, 0);
    assert_eq!(again.document.drawing_runs, 0);
    assert_eq!(again.document.validation_fixes, 0);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn dropped_members_are_restored_and_translated() {
    let dir = tempfile::TempDir::new().unwrap();
    let original = dir.path().join("original.xlsx");
    let mut members = workbook_members();
    members.push(("xl/drawings/vmlDrawing1.vml", VML));
    write_zip(&original, &members);

    // An editor that lost the VML part.
    let output = dir.path().join("edited.xlsx");
    write_zip(&output, &workbook_members());

    let model = Arc::new(FakeModel::default());
    let mut engine = TranslationEngine::new(
        model.clone(),
        EngineSettings {
            retry: RetryPolicy::immediate(1),
            ..EngineSettings::default()
        },
    );
    let report = archive::reconcile(&original, &output, &mut engine)
        .await
        .unwrap();

    assert_eq!(report.restored_members, 1);
    assert_eq!(report.translated_runs, 2);
    let pkg = Package::open(&output).unwrap();
    let vml = pkg.text("xl/drawings/vmlDrawing1.vml").unwrap().unwrap();
    assert!(vml.contains("Remarks"));
    assert!(!contains_non_english(&vml));
}

#[tokio::test]
async fn exhausted_retries_fail_the_job() {
    let dir = tempfile::TempDir::new().unwrap();
    let input = write_workbook(dir.path());
    let err = translate_file_with_client(
        input.to_str().unwrap(),
        None,
        Arc::new(DownModel),
        &config(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, TranslateError::RetriesExhausted { .. }), "{err}");
}

// ── Word documents ───────────────────────────────────────────────────────────

const WORD_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>合同</w:t></w:r></w:p><w:p><w:r><w:t>付款条款</w:t></w:r></w:p><w:tbl><w:tr><w:tc><w:p><w:r><w:t>数量</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>价格</w:t></w:r></w:p></w:tc></w:tr><w:tr><w:tc><w:p><w:r><w:t>10</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>$5</w:t></w:r></w:p></w:tc></w:tr></w:tbl></w:body></w:document>"#;

#[tokio::test]
async fn word_document_is_rebuilt_in_english() {
    let dir = tempfile::TempDir::new().unwrap();
    let input = dir.path().join("contract.docx");
    write_zip(&input, &[("word/document.xml", WORD_BODY)]);

    let out = translate_file_with_client(
        input.to_str().unwrap(),
        None,
        Arc::new(FakeModel::default()),
        &config(),
    )
    .await
    .unwrap();

    assert_eq!(out.family, FileFamily::WordProcessor);
    assert_eq!(out.output_path, dir.path().join("contract_en_translated.docx"));
    assert_eq!(out.document.fragments, 6);

    let generated = WordDocument::open(&out.output_path).unwrap();
    let texts: Vec<&str> = generated.paragraphs.iter().map(|p| p.text.as_str()).collect();
    assert!(texts.contains(&"Contract"));
    assert!(texts.contains(&"Payment Terms"));
    assert_eq!(generated.tables.len(), 1);
    assert_eq!(generated.tables[0][0], vec!["Quantity", "Price"]);
    assert_eq!(generated.tables[0][1], vec!["10", "$5"]);
}

// ── Input errors ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_input_fails_before_any_model_call() {
    let model = Arc::new(FakeModel::default());
    let err = translate_file_with_client("/no/such/file.xlsx", None, model.clone(), &config())
        .await
        .unwrap_err();
    assert!(matches!(err, TranslateError::FileNotFound { .. }));
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn unsupported_extension_fails_before_any_model_call() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "你好").unwrap();
    let model = Arc::new(FakeModel::default());
    let err = translate_file_with_client(path.to_str().unwrap(), None, model.clone(), &config())
        .await
        .unwrap_err();
    match err {
        TranslateError::UnsupportedFormat { extension, .. } => assert_eq!(extension, ".txt"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn legacy_xls_is_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("old.xls");
    std::fs::write(&path, b"\xD0\xCF\x11\xE0").unwrap();
    let model = Arc::new(FakeModel::default());
    let err = translate_file_with_client(path.to_str().unwrap(), None, model.clone(), &config())
        .await
        .unwrap_err();
    assert!(matches!(err, TranslateError::InvalidDocument { .. }));
    assert_eq!(model.calls(), 0);
}
