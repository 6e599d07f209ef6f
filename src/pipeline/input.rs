//! Input resolution and classification.
//!
//! A user-supplied path or URL becomes a local file plus a [`FileFamily`].
//! URLs are downloaded into a `TempDir` that lives as long as the
//! [`ResolvedInput`], keeping the URL's file name so the extension still
//! drives classification.

use crate::error::TranslateError;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// Document family, decided by file extension alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFamily {
    Spreadsheet,
    WordProcessor,
    Pdf,
    Image,
}

impl FileFamily {
    /// Classify by extension, case-insensitively. `None` for anything else.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "xlsx" | "xls" | "xlsm" => Some(FileFamily::Spreadsheet),
            "docx" | "doc" => Some(FileFamily::WordProcessor),
            "pdf" => Some(FileFamily::Pdf),
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "tiff" | "webp" => Some(FileFamily::Image),
            _ => None,
        }
    }

    /// Classify a path, failing with [`TranslateError::UnsupportedFormat`].
    pub fn classify(path: &Path) -> Result<Self, TranslateError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        Self::from_extension(ext).ok_or_else(|| TranslateError::UnsupportedFormat {
            path: path.to_path_buf(),
            extension: if ext.is_empty() {
                "(none)".to_string()
            } else {
                format!(".{ext}")
            },
        })
    }

    /// Extension of the translated output: spreadsheets stay spreadsheets,
    /// everything else becomes a generated word-processor document.
    pub fn output_extension(self) -> &'static str {
        match self {
            FileFamily::Spreadsheet => "xlsx",
            _ => "docx",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileFamily::Spreadsheet => "spreadsheet",
            FileFamily::WordProcessor => "word",
            FileFamily::Pdf => "pdf",
            FileFamily::Image => "image",
        }
    }
}

impl fmt::Display for FileFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default output path: `<dir>/<stem><suffix>.<xlsx|docx>`.
pub fn default_output_path(input: &Path, family: FileFamily, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    input.with_file_name(format!("{stem}{suffix}.{}", family.output_extension()))
}

/// The resolved input: a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    Local(PathBuf),
    /// The `TempDir` is kept alive until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }

    pub fn is_download(&self) -> bool {
        matches!(self, ResolvedInput::Downloaded { .. })
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a readable local file.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, TranslateError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, TranslateError> {
    let path = PathBuf::from(path_str);

    if !path.is_file() {
        return Err(TranslateError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(TranslateError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(TranslateError::FileNotFound { path });
        }
    }

    debug!("Resolved local input: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, TranslateError> {
    info!("Downloading input from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| TranslateError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            TranslateError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            TranslateError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(TranslateError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = filename_from_url(url).ok_or_else(|| TranslateError::UnsupportedFormat {
        path: PathBuf::from(url),
        extension: "(none)".to_string(),
    })?;
    // Fail before fetching the body when the extension is unknown.
    FileFamily::classify(Path::new(&filename))?;

    let temp_dir = TempDir::new()?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| TranslateError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    tokio::fs::write(&file_path, &bytes).await?;
    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of a URL when it carries an extension.
fn filename_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    (!last.is_empty() && last.contains('.')).then(|| last.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn families_by_extension() {
        assert_eq!(FileFamily::from_extension("XLSX"), Some(FileFamily::Spreadsheet));
        assert_eq!(FileFamily::from_extension("xlsm"), Some(FileFamily::Spreadsheet));
        assert_eq!(FileFamily::from_extension("Doc"), Some(FileFamily::WordProcessor));
        assert_eq!(FileFamily::from_extension("pdf"), Some(FileFamily::Pdf));
        assert_eq!(FileFamily::from_extension("webp"), Some(FileFamily::Image));
        assert_eq!(FileFamily::from_extension("txt"), None);
    }

    #[test]
    fn unsupported_extension_names_it() {
        let err = FileFamily::classify(Path::new("/tmp/notes.TXT")).unwrap_err();
        match err {
            TranslateError::UnsupportedFormat { extension, .. } => assert_eq!(extension, ".TXT"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(FileFamily::classify(Path::new("/tmp/README")).is_err());
    }

    #[test]
    fn output_paths() {
        assert_eq!(
            default_output_path(Path::new("/data/报价单.xlsx"), FileFamily::Spreadsheet, "_en_translated"),
            PathBuf::from("/data/报价单_en_translated.xlsx")
        );
        assert_eq!(
            default_output_path(Path::new("scan.JPG"), FileFamily::Image, "_en_translated"),
            PathBuf::from("scan_en_translated.docx")
        );
    }

    #[test]
    fn missing_local_file() {
        let err = resolve_local("/definitely/not/here.xlsx").unwrap_err();
        assert!(matches!(err, TranslateError::FileNotFound { .. }));
    }

    #[test]
    fn filenames_from_urls() {
        assert_eq!(
            filename_from_url("https://example.com/files/report.pdf?x=1").as_deref(),
            Some("report.pdf")
        );
        assert_eq!(filename_from_url("https://example.com/download"), None);
    }
}
