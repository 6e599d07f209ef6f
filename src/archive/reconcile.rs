//! Archive reconciliation.
//!
//! Container rewrites can drop members they do not understand: drawings,
//! chart parts, relationship files, legacy vector markup. Reconciliation
//! compares the original container with the rewritten one, restores every
//! missing member, and translates the text runs of every drawing-like part
//! on the way.
//!
//! Running it twice is a no-op: nothing is missing the second time and every
//! run is already English-safe.

use super::runs::{RegexRunScanner, TextRunScanner};
use crate::engine::TranslationEngine;
use crate::error::TranslateError;
use crate::extract::package::Package;
use crate::extract::spreadsheet::CONTEXT;
use crate::language::contains_non_english;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

const PROCESSABLE_KEYWORDS: &[&str] = &["drawing", "chart", "diagram", "smartart", "comments"];

/// `true` for members whose raw XML may carry drawing-like text runs.
pub fn is_processable(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    (PROCESSABLE_KEYWORDS.iter().any(|k| lower.contains(k)) && lower.ends_with(".xml"))
        || lower.ends_with(".vml")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Members present in the original but missing from the output.
    pub restored_members: usize,
    /// Members whose content changed through translation.
    pub translated_members: usize,
    /// Individual runs rewritten.
    pub translated_runs: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.restored_members == 0 && self.translated_members == 0
    }
}

/// Reconcile `output` against `original` on disk. The output file is
/// replaced atomically, and only when something changed.
pub async fn reconcile(
    original: &Path,
    output: &Path,
    engine: &mut TranslationEngine,
) -> Result<ReconcileReport, TranslateError> {
    let source = Package::open(original)?;
    let rewritten = Package::open(output)?;
    let (rebuilt, report) =
        reconcile_packages(&source, &rewritten, engine, &RegexRunScanner::drawing()).await?;
    if let Some(package) = rebuilt {
        package.write_to(output)?;
        info!(
            "reconciled {}: {} members restored, {} runs translated in {} members",
            output.display(),
            report.restored_members,
            report.translated_runs,
            report.translated_members
        );
    } else {
        debug!("reconcile: {} already complete", output.display());
    }
    Ok(report)
}

/// In-memory reconciliation. Returns the rebuilt container, or `None` when
/// `output` needs no change.
pub async fn reconcile_packages(
    original: &Package,
    output: &Package,
    engine: &mut TranslationEngine,
    scanner: &dyn TextRunScanner,
) -> Result<(Option<Package>, ReconcileReport), TranslateError> {
    let missing: Vec<&str> = original
        .names()
        .filter(|name| !output.contains(name))
        .collect();
    if !missing.is_empty() {
        info!("reconcile: {} members missing from output", missing.len());
        debug!("missing members: {:?}", missing);
    }

    // Processable parts as they will be written: the output's copy, or the
    // original's for a restored member.
    let mut bases: Vec<(String, String)> = Vec::new();
    for name in output.names().chain(missing.iter().copied()) {
        if !is_processable(name) {
            continue;
        }
        let content = match output.get(name).or_else(|| original.get(name)) {
            Some(bytes) => bytes,
            None => continue,
        };
        match std::str::from_utf8(content) {
            Ok(xml) => bases.push((name.to_string(), xml.to_string())),
            Err(_) => debug!("reconcile: '{}' is not UTF-8; copied as is", name),
        }
    }

    let mut seen = HashSet::new();
    let mut texts: Vec<String> = Vec::new();
    for (_, xml) in &bases {
        for run in scanner.find_runs(xml) {
            if contains_non_english(&run.text) && seen.insert(run.text.clone()) {
                texts.push(run.text);
            }
        }
    }

    let mut overrides: HashMap<String, String> = HashMap::new();
    let mut report = ReconcileReport {
        restored_members: missing.len(),
        ..ReconcileReport::default()
    };
    if !texts.is_empty() {
        debug!("reconcile: {} distinct runs to translate", texts.len());
        let translated = engine.translate_batch(&texts, Some(CONTEXT)).await?;
        let map: HashMap<String, String> = texts.into_iter().zip(translated).collect();
        for (name, xml) in bases {
            let (updated, count) = scanner.rewrite(&xml, &map);
            if count > 0 {
                report.translated_runs += count;
                report.translated_members += 1;
                overrides.insert(name, updated);
            }
        }
    }

    if report.is_noop() {
        return Ok((None, report));
    }

    let mut rebuilt = Package::new();
    for member in output.members() {
        let mut member = member.clone();
        if let Some(xml) = overrides.remove(&member.name) {
            member.data = xml.into_bytes();
        }
        rebuilt.push(member);
    }
    for member in original.members() {
        if output.contains(&member.name) {
            continue;
        }
        let mut member = member.clone();
        if let Some(xml) = overrides.remove(&member.name) {
            member.data = xml.into_bytes();
        }
        rebuilt.push(member);
    }
    Ok((Some(rebuilt), report))
}
