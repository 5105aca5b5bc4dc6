//! Input resolution: normalise a user-supplied path or URL to a local file.
//!
//! Reading sheets usually arrive as email attachments saved locally, but
//! some utilities publish scan batches on an internal server, so URLs are
//! accepted too. pdfium needs a file-system path either way; downloads go
//! to a `TempDir` that is cleaned up automatically when `ResolvedInput` is
//! dropped. The PDF magic bytes (`%PDF`) are validated before returning so
//! callers get a meaningful error rather than a pdfium crash.

use crate::error::MeterSheetError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// The resolved input — either a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; PDF downloaded to a temp directory.
    /// The `TempDir` is kept alive to prevent cleanup until the run ends.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// The path to the PDF file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Check whether the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local PDF file path.
pub async fn resolve_input(
    input: &str,
    timeout_secs: u64,
) -> Result<ResolvedInput, MeterSheetError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, MeterSheetError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(MeterSheetError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            use std::io::Read;
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(MeterSheetError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(MeterSheetError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(MeterSheetError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, MeterSheetError> {
    info!("Downloading scan batch from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| MeterSheetError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| MeterSheetError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    if !response.status().is_success() {
        return Err(MeterSheetError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| MeterSheetError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let temp_dir = TempDir::new().map_err(|e| MeterSheetError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join("sheets.pdf");

    if bytes.len() >= 4 && &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(MeterSheetError::NotAPdf {
            path: file_path,
            magic,
        });
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| MeterSheetError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded to: {}", file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn url_detection() {
        assert!(is_url("https://scans.example.net/batch.pdf"));
        assert!(is_url("http://scans.example.net/batch.pdf"));
        assert!(!is_url("/var/scans/batch.pdf"));
        assert!(!is_url("batch.pdf"));
        assert!(!is_url(""));
    }

    #[tokio::test]
    async fn missing_file_is_fatal() {
        let err = resolve_input("/definitely/not/here.pdf", 5)
            .await
            .unwrap_err();
        assert!(matches!(err, MeterSheetError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn non_pdf_magic_is_rejected() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"PNG\x89 definitely not a pdf").unwrap();
        let err = resolve_input(tmp.path().to_str().unwrap(), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, MeterSheetError::NotAPdf { .. }));
    }

    #[tokio::test]
    async fn pdf_magic_is_accepted() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"%PDF-1.7\n...").unwrap();
        let resolved = resolve_input(tmp.path().to_str().unwrap(), 5)
            .await
            .expect("valid magic should resolve");
        assert_eq!(resolved.path(), tmp.path());
    }
}
