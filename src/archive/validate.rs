//! Output validation: the last safety net for container outputs.
//!
//! Every `.xml` member of the produced container is scanned with generic
//! text-tag patterns. Anything still non-English is translated with the
//! "validation fix" context and substituted in place. Validation never fails
//! the job: errors are logged and reported.

use super::runs::{RegexRunScanner, TextRunScanner};
use crate::engine::TranslationEngine;
use crate::error::TranslateError;
use crate::extract::package::Package;
use crate::language::contains_non_english;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Context hint for validation-pass batches.
pub const CONTEXT: &str = "validation fix";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub scanned_members: usize,
    /// Non-English matches found, counting repeats.
    pub non_english_found: usize,
    pub fixed_members: usize,
    /// Runs rewritten.
    pub fixes: usize,
    /// Set when validation stopped early; the output is left as it was.
    pub error: Option<String>,
}

/// Validate and fix the container at `output` in place.
pub async fn validate(output: &Path, engine: &mut TranslationEngine) -> ValidationReport {
    match validate_file(output, engine).await {
        Ok(report) => report,
        Err(e) => {
            warn!("validation of {} stopped: {}", output.display(), e);
            ValidationReport {
                error: Some(e.to_string()),
                ..ValidationReport::default()
            }
        }
    }
}

async fn validate_file(
    output: &Path,
    engine: &mut TranslationEngine,
) -> Result<ValidationReport, TranslateError> {
    let package = Package::open(output)?;
    let (fixed, report) =
        validate_package(&package, engine, &RegexRunScanner::validation()).await;
    match fixed {
        Some(package) => {
            package.write_to(output)?;
            info!(
                "validation fixed {} runs in {} members of {}",
                report.fixes,
                report.fixed_members,
                output.display()
            );
        }
        None if report.non_english_found == 0 => {
            debug!("validation: all text in {} is English", output.display())
        }
        None => {}
    }
    Ok(report)
}

/// Validate an in-memory container. Returns the corrected container, or
/// `None` when nothing was fixed. A member whose fix fails is left as it was.
pub async fn validate_package(
    package: &Package,
    engine: &mut TranslationEngine,
    scanner: &dyn TextRunScanner,
) -> (Option<Package>, ValidationReport) {
    let mut report = ValidationReport::default();
    let mut fixed: HashMap<String, String> = HashMap::new();

    for member in package.members() {
        if member.is_dir || !member.name.ends_with(".xml") {
            continue;
        }
        let Ok(xml) = std::str::from_utf8(&member.data) else {
            debug!("validation: '{}' is not UTF-8; skipped", member.name);
            continue;
        };
        report.scanned_members += 1;

        let mut texts: Vec<String> = Vec::new();
        for run in scanner.find_runs(xml) {
            if contains_non_english(&run.text) {
                report.non_english_found += 1;
                if !texts.contains(&run.text) {
                    texts.push(run.text);
                }
            }
        }
        if texts.is_empty() {
            continue;
        }

        debug!("validation: fixing {} items in {}", texts.len(), member.name);
        let translated = match engine.translate_batch(&texts, Some(CONTEXT)).await {
            Ok(t) => t,
            Err(e) => {
                warn!("validation: could not fix '{}': {}", member.name, e);
                report.error = Some(e.to_string());
                continue;
            }
        };
        let map: HashMap<String, String> = texts.into_iter().zip(translated).collect();
        let (updated, count) = scanner.rewrite(xml, &map);
        if count > 0 {
            report.fixes += count;
            report.fixed_members += 1;
            fixed.insert(member.name.clone(), updated);
        }
    }

    if fixed.is_empty() {
        return (None, report);
    }
    let mut out = package.clone();
    for (name, xml) in fixed {
        out.set(&name, xml.into_bytes());
    }
    (Some(out), report)
}
