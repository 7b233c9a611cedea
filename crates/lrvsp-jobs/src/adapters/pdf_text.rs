//! PDF extractor backed by `pdfinfo` and `pdftotext` (poppler-utils).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use lrvsp_core::defaults::EXTRACTION_CMD_TIMEOUT_SECS;
use lrvsp_core::{Error, ExtractionOutcome, Extractor, RawDocument, Result};

use super::run_cmd_with_timeout;

/// Text layers shorter than this on a PDF with pages are flagged `needs_ocr`.
const MIN_TEXT_LAYER_CHARS: usize = 50;

/// Extracts the text layer of a PDF for the link-recognition pass.
///
/// `pdfinfo` supplies the document properties (title, author, page count
/// and so on). The embedded title becomes the document title when present.
/// A failing `pdfinfo` is logged and the text is still extracted. Each
/// command is guarded by a per-command timeout.
pub struct PdfTextAdapter {
    program: String,
    info_program: String,
    timeout: Duration,
}

impl Default for PdfTextAdapter {
    fn default() -> Self {
        Self {
            program: "pdftotext".to_string(),
            info_program: "pdfinfo".to_string(),
            timeout: Duration::from_secs(EXTRACTION_CMD_TIMEOUT_SECS),
        }
    }
}

impl PdfTextAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different `pdftotext` binary.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Use a different `pdfinfo` binary.
    pub fn with_info_program(mut self, program: impl Into<String>) -> Self {
        self.info_program = program.into();
        self
    }

    /// Override the per-command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn document_info(&self, path: &Path) -> JsonMap<String, JsonValue> {
        match run_cmd_with_timeout(Command::new(&self.info_program).arg(path), self.timeout).await
        {
            Ok(output) => parse_pdfinfo(&output),
            Err(e) => {
                warn!(
                    subsystem = "jobs",
                    component = "pdf_text",
                    path = %path.display(),
                    error = %e,
                    "pdfinfo failed, continuing without document properties"
                );
                JsonMap::new()
            }
        }
    }
}

/// Parse `pdfinfo` output into document properties.
///
/// Keys are lowercased with spaces replaced by `_`. `pages` is numeric.
fn parse_pdfinfo(output: &str) -> JsonMap<String, JsonValue> {
    let mut metadata = JsonMap::new();

    for line in output.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_lowercase().replace(' ', "_");
            let value = value.trim();
            if key.is_empty() || value.is_empty() {
                continue;
            }
            if key == "pages" {
                if let Ok(pages) = value.parse::<u64>() {
                    metadata.insert(key, JsonValue::from(pages));
                    continue;
                }
            }
            metadata.insert(key, JsonValue::String(value.to_string()));
        }
    }

    metadata
}

/// Reject files that do not start with the `%PDF` magic bytes.
async fn check_pdf_header(path: &Path) -> Result<()> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| Error::Extraction(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut header = [0u8; 4];
    let read = file.read(&mut header).await?;
    if read < 4 || &header != b"%PDF" {
        return Err(Error::Extraction(format!(
            "File '{}' is not a valid PDF (missing %PDF header)",
            path.display()
        )));
    }
    Ok(())
}

#[async_trait]
impl Extractor for PdfTextAdapter {
    async fn extract(&self, path: &Path) -> Result<ExtractionOutcome> {
        check_pdf_header(path).await?;

        let mut metadata = self.document_info(path).await;
        let text = run_cmd_with_timeout(
            Command::new(&self.program).arg(path).arg("-"),
            self.timeout,
        )
        .await?;

        let pages = metadata.get("pages").and_then(JsonValue::as_u64).unwrap_or(0);
        if pages > 0 && text.trim().chars().count() < MIN_TEXT_LAYER_CHARS {
            metadata.insert("needs_ocr".to_string(), JsonValue::Bool(true));
        }
        let title = metadata
            .get("title")
            .and_then(JsonValue::as_str)
            .map(str::to_string);

        debug!(
            subsystem = "jobs",
            component = "pdf_text",
            path = %path.display(),
            pages,
            has_title = title.is_some(),
            byte_count = text.len(),
            "PDF text extracted"
        );

        let mut document = RawDocument::new(text).with_metadata(metadata);
        document.title = title;
        Ok(ExtractionOutcome::RawText(document))
    }

    async fn health_check(&self) -> Result<bool> {
        match Command::new(&self.program).arg("-v").output().await {
            // pdftotext -v exits with 0 or 99 depending on the version
            Ok(output) => Ok(output.status.success() || output.status.code() == Some(99)),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "pdf_text"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HELLO_PDF: &[u8] = b"%PDF-1.0
1 0 obj
<< /Type /Catalog /Pages 2 0 R >>
endobj

2 0 obj
<< /Type /Pages /Kids [3 0 R] /Count 1 >>
endobj

3 0 obj
<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792]
   /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>
endobj

4 0 obj
<< /Length 44 >>
stream
BT /F1 12 Tf 100 700 Td (Hello World) Tj ET
endstream
endobj

5 0 obj
<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>
endobj

xref
0 6
0000000000 65535 f
0000000009 00000 n
0000000058 00000 n
0000000115 00000 n
0000000266 00000 n
0000000360 00000 n

trailer
<< /Size 6 /Root 1 0 R >>
startxref
434
%%EOF";

    fn temp_file(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    #[test]
    fn test_pdf_text_name() {
        assert_eq!(PdfTextAdapter::new().name(), "pdf_text");
    }

    #[tokio::test]
    async fn test_pdf_text_health_check_missing_binary() {
        let adapter = PdfTextAdapter::new().with_program("/nonexistent/pdftotext");
        assert!(!adapter.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_pdf_text_empty_file() {
        let file = temp_file(b"");
        let err = PdfTextAdapter::new().extract(file.path()).await.unwrap_err();
        assert!(err.to_string().contains("not a valid PDF"), "{}", err);
    }

    #[tokio::test]
    async fn test_pdf_text_invalid_pdf() {
        let file = temp_file(b"not a pdf at all");
        let err = PdfTextAdapter::new().extract(file.path()).await.unwrap_err();
        assert!(matches!(err, Error::Extraction(ref msg) if msg.contains("not a valid PDF")));
    }

    #[tokio::test]
    async fn test_pdf_text_extraction() {
        let adapter = PdfTextAdapter::new();
        if !adapter.health_check().await.unwrap_or(false) {
            eprintln!("Skipping test_pdf_text_extraction: pdftotext not installed");
            return;
        }

        let file = temp_file(HELLO_PDF);
        match adapter.extract(file.path()).await.unwrap() {
            ExtractionOutcome::RawText(raw) => assert!(
                raw.text.contains("Hello World"),
                "Extracted text should contain 'Hello World', got: {}",
                raw.text
            ),
            other => panic!("expected raw text, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_pdfinfo() {
        let output = "Title:          Annual Report 2023\n\
                      Author:         Finance Office\n\
                      Creator:        \n\
                      Pages:          12\n\
                      Page size:      612 x 792 pts (letter)\n";
        let metadata = parse_pdfinfo(output);

        assert_eq!(metadata["title"], "Annual Report 2023");
        assert_eq!(metadata["author"], "Finance Office");
        assert_eq!(metadata["pages"], 12);
        assert_eq!(metadata["page_size"], "612 x 792 pts (letter)");
        assert!(!metadata.contains_key("creator"));
    }

    #[test]
    fn test_parse_pdfinfo_non_numeric_pages() {
        let metadata = parse_pdfinfo("Pages: unknown\nno separator here\n");
        assert_eq!(metadata["pages"], "unknown");
        assert_eq!(metadata.len(), 1);
    }

    #[cfg(unix)]
    fn script(dir: &tempfile::TempDir, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pdf_text_carries_document_properties() {
        let dir = tempfile::tempdir().unwrap();
        let info = script(
            &dir,
            "pdfinfo",
            "printf 'Title:  Annual Report 2023\\nPages:  2\\n'",
        );
        let text = script(&dir, "pdftotext", "echo 'Short text layer'");
        let file = temp_file(HELLO_PDF);

        let outcome = PdfTextAdapter::new()
            .with_program(text)
            .with_info_program(info)
            .extract(file.path())
            .await
            .unwrap();

        match outcome {
            ExtractionOutcome::RawText(raw) => {
                assert_eq!(raw.text.trim(), "Short text layer");
                assert_eq!(raw.title.as_deref(), Some("Annual Report 2023"));
                assert_eq!(raw.metadata["pages"], 2);
                assert_eq!(raw.metadata["needs_ocr"], true);
            }
            other => panic!("expected raw text, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pdf_text_survives_pdfinfo_failure() {
        let dir = tempfile::tempdir().unwrap();
        let text = script(&dir, "pdftotext", "echo 'Body text'");
        let file = temp_file(HELLO_PDF);

        let outcome = PdfTextAdapter::new()
            .with_program(text)
            .with_info_program("/nonexistent/pdfinfo")
            .extract(file.path())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ExtractionOutcome::RawText(RawDocument::new("Body text\n"))
        );
    }
}
