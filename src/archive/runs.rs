//! Text runs embedded in raw container XML.
//!
//! Drawing, chart, diagram and legacy-shape parts are not modelled by the
//! spreadsheet adapter. Their text is found with tag-anchored patterns: each
//! pattern captures the opening tag, the payload and the closing tag, and
//! only the payload is ever replaced.

use crate::extract::package::{apply_edits, TextEdit};
use once_cell::sync::Lazy;
use quick_xml::escape::{partial_escape, unescape};
use regex::Regex;
use std::collections::HashMap;
use std::ops::Range;

/// A payload found by a scanner: unescaped text plus the byte span of the
/// raw payload in the part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    pub text: String,
    pub range: Range<usize>,
}

/// Finds and rewrites text runs in one XML part.
pub trait TextRunScanner: Send + Sync {
    /// Runs in document order. Overlapping matches are resolved in favour
    /// of the earliest; whitespace-only payloads are omitted.
    fn find_runs(&self, xml: &str) -> Vec<TextRun>;

    /// Replace every run whose text has an entry in `translations`.
    /// Returns the new part and the number of runs replaced.
    fn rewrite(&self, xml: &str, translations: &HashMap<String, String>) -> (String, usize) {
        let edits: Vec<TextEdit> = self
            .find_runs(xml)
            .into_iter()
            .filter_map(|run| {
                let translated = translations.get(&run.text)?;
                (translated != &run.text)
                    .then(|| TextEdit::new(run.range, partial_escape(translated).into_owned()))
            })
            .collect();
        let count = edits.len();
        if count == 0 {
            return (xml.to_string(), 0);
        }
        (apply_edits(xml, edits), count)
    }
}

/// One tag shape. Group 2 of `regex` is the payload.
#[derive(Debug, Clone)]
pub struct RunPattern {
    pub name: &'static str,
    pub regex: Regex,
    /// The payload is markup; its text nodes are the runs.
    pub container: bool,
}

impl RunPattern {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            regex: Regex::new(pattern).unwrap(),
            container: false,
        }
    }

    fn container(name: &'static str, pattern: &str) -> Self {
        Self {
            container: true,
            ..Self::new(name, pattern)
        }
    }
}

static DRAWING_PATTERNS: Lazy<Vec<RunPattern>> = Lazy::new(|| {
    vec![
        RunPattern::new("drawing", r"(<a:t>)([^<]+)(</a:t>)"),
        RunPattern::new("drawing-ws", r#"(<a:t xml:space="preserve">)([^<]+)(</a:t>)"#),
        RunPattern::new("chart-value", r"(<c:v>)([^<]+)(</c:v>)"),
        RunPattern::container("vml-textbox", r"(?s)(<v:textbox[^>]*>)(.*?)(</v:textbox>)"),
        RunPattern::new("diagram", r"(<dgm:t>)([^<]+)(</dgm:t>)"),
        RunPattern::new("rich-text", r"(<t[^>]*>)([^<]+)(</t>)"),
        RunPattern::new("comment", r"(<text>)([^<]+)(</text>)"),
    ]
});

static VALIDATION_PATTERNS: Lazy<Vec<RunPattern>> = Lazy::new(|| {
    vec![
        RunPattern::new("cell-text", r"(<t[^>]*>)([^<]+)(</t>)"),
        RunPattern::new("drawing", r"(<a:t>)([^<]+)(</a:t>)"),
        RunPattern::new("drawing-ws", r#"(<a:t xml:space="preserve">)([^<]+)(</a:t>)"#),
        RunPattern::new("value", r"(<v>)([^<]+)(</v>)"),
        RunPattern::new("chart-value", r"(<c:v>)([^<]+)(</c:v>)"),
    ]
});

/// [`TextRunScanner`] over a fixed list of [`RunPattern`]s.
#[derive(Debug, Clone)]
pub struct RegexRunScanner {
    patterns: Vec<RunPattern>,
}

impl RegexRunScanner {
    pub fn new(patterns: Vec<RunPattern>) -> Self {
        Self { patterns }
    }

    /// Drawing, chart, legacy-shape, diagram, rich-text and comment runs.
    pub fn drawing() -> Self {
        Self::new((*DRAWING_PATTERNS).clone())
    }

    /// Generic cell, drawing, value and chart tags.
    pub fn validation() -> Self {
        Self::new((*VALIDATION_PATTERNS).clone())
    }

    pub fn pattern_names(&self) -> Vec<&'static str> {
        self.patterns.iter().map(|p| p.name).collect()
    }
}

impl TextRunScanner for RegexRunScanner {
    fn find_runs(&self, xml: &str) -> Vec<TextRun> {
        let mut ranges: Vec<Range<usize>> = Vec::new();
        for pattern in &self.patterns {
            for caps in pattern.regex.captures_iter(xml) {
                let Some(payload) = caps.get(2) else {
                    continue;
                };
                if pattern.container {
                    ranges.extend(
                        text_nodes(payload.as_str())
                            .into_iter()
                            .map(|r| payload.start() + r.start..payload.start() + r.end),
                    );
                } else {
                    ranges.push(payload.range());
                }
            }
        }

        ranges.sort_by_key(|r| (r.start, std::cmp::Reverse(r.end)));
        let mut runs = Vec::with_capacity(ranges.len());
        let mut cursor = 0;
        for range in ranges {
            if range.start < cursor {
                continue;
            }
            let raw = &xml[range.clone()];
            if raw.trim().is_empty() {
                continue;
            }
            cursor = range.end;
            let text = unescape(raw).map_or_else(|_| raw.to_string(), |t| t.into_owned());
            runs.push(TextRun { text, range });
        }
        runs
    }
}

/// Byte ranges of character data between tags in a markup fragment.
fn text_nodes(markup: &str) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut in_tag = false;
    let mut start = 0;
    for (i, c) in markup.char_indices() {
        match c {
            '<' if !in_tag => {
                if i > start {
                    out.push(start..i);
                }
                in_tag = true;
            }
            '>' if in_tag => {
                in_tag = false;
                start = i + 1;
            }
            _ => {}
        }
    }
    if !in_tag && markup.len() > start {
        out.push(start..markup.len());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRAWING: &str = r#"<xdr:wsDr><xdr:sp><xdr:txBody><a:p><a:r><a:t>销售额</a:t></a:r><a:r><a:t xml:space="preserve"> 合计 </a:t></a:r><a:r><a:t>Q1</a:t></a:r></a:p></xdr:txBody></xdr:sp></xdr:wsDr>"#;

    fn texts(runs: &[TextRun]) -> Vec<&str> {
        runs.iter().map(|r| r.text.as_str()).collect()
    }

    #[test]
    fn drawing_runs_in_document_order() {
        let runs = RegexRunScanner::drawing().find_runs(DRAWING);
        assert_eq!(texts(&runs), vec!["销售额", " 合计 ", "Q1"]);
    }

    #[test]
    fn vml_textbox_text_nodes() {
        let xml = r#"<v:shape><v:textbox style="x"><div dir="ltr"><font>备注 &amp; 说明</font></div></v:textbox></v:shape>"#;
        let runs = RegexRunScanner::drawing().find_runs(xml);
        assert_eq!(texts(&runs), vec!["备注 & 说明"]);
        assert_eq!(&xml[runs[0].range.clone()], "备注 &amp; 说明");
    }

    #[test]
    fn chart_and_diagram_values() {
        let xml = "<c:tx><c:v>收入</c:v></c:tx><dgm:t>流程</dgm:t><text>批注</text>";
        let runs = RegexRunScanner::drawing().find_runs(xml);
        assert_eq!(texts(&runs), vec!["收入", "流程", "批注"]);
    }

    #[test]
    fn rewrite_replaces_payload_only() {
        let mut t = HashMap::new();
        t.insert("销售额".to_string(), "Sales & revenue".to_string());
        t.insert(" 合计 ".to_string(), " Total ".to_string());
        let (out, n) = RegexRunScanner::drawing().rewrite(DRAWING, &t);
        assert_eq!(n, 2);
        assert!(out.contains("<a:t>Sales &amp; revenue</a:t>"));
        assert!(out.contains(r#"<a:t xml:space="preserve"> Total </a:t>"#));
        assert!(out.contains("<a:t>Q1</a:t>"));
    }

    #[test]
    fn rewrite_without_matches_is_identity() {
        let (out, n) = RegexRunScanner::drawing().rewrite(DRAWING, &HashMap::new());
        assert_eq!(n, 0);
        assert_eq!(out, DRAWING);
    }

    #[test]
    fn validation_patterns_cover_cells_and_values() {
        let xml = r#"<si><t xml:space="preserve">残留</t></si><c r="A1"><v>12</v></c><c:v>图表</c:v>"#;
        let runs = RegexRunScanner::validation().find_runs(xml);
        assert_eq!(texts(&runs), vec!["残留", "12", "图表"]);
    }

    #[test]
    fn text_nodes_between_tags() {
        let s = "a<b x=\"1\">c</b>d";
        let nodes: Vec<&str> = text_nodes(s).into_iter().map(|r| &s[r]).collect();
        assert_eq!(nodes, vec!["a", "c", "d"]);
    }
}
