//! Text extraction for ingestable files.
//!
//! Ingestion works on plain UTF-8; this module turns a source file into
//! that text. Plain-text formats are read directly, PDFs go through
//! `pdf-extract`. Unsupported or unreadable files fail with
//! [`Error::Extraction`] so the pipeline can mark the document as failed
//! without touching its siblings.

use std::path::Path;

use crate::error::{Error, Result};

/// Extensions read verbatim as UTF-8.
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "text", "csv", "log"];

/// Extract plain text from a file on disk, dispatching on extension.
pub fn extract_text(path: &Path) -> Result<String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if ext == "pdf" {
        return extract_pdf(path);
    }
    if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        return std::fs::read_to_string(path).map_err(|e| {
            Error::Extraction(format!("failed to read {}: {}", path.display(), e))
        });
    }

    Err(Error::Extraction(format!(
        "unsupported file type: {}",
        path.display()
    )))
}

fn extract_pdf(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::Extraction(format!("failed to read {}: {}", path.display(), e)))?;
    pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| Error::Extraction(format!("PDF extraction failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_plain_text_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "hello world").unwrap();

        let text = extract_text(&path).unwrap();
        assert_eq!(text, "hello world\n");
    }

    #[test]
    fn markdown_is_treated_as_text() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("readme.md");
        std::fs::write(&path, "# Title\n\nBody.").unwrap();

        let text = extract_text(&path).unwrap();
        assert!(text.contains("# Title"));
    }

    #[test]
    fn unsupported_extension_returns_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("image.png");
        std::fs::write(&path, b"\x89PNG").unwrap();

        let err = extract_text(&path).unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[test]
    fn missing_file_returns_error() {
        let err = extract_text(Path::new("/nonexistent/file.txt")).unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();

        let err = extract_text(&path).unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }
}
