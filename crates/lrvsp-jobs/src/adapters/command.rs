//! Extractor that delegates to an external helper program.
//!
//! The helper receives the file path as its only argument and prints one JSON
//! value on stdout:
//!
//! - an object `{"name": ..., "metadata": ..., "links": [...]}` for a
//!   structured result, or
//! - a string holding raw text for the link-recognition pass.
//!
//! A non-zero exit is an extraction failure. Anything else on stdout is a
//! malformed result.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::process::Command;

use lrvsp_core::defaults::EXTRACTION_CMD_TIMEOUT_SECS;
use lrvsp_core::{Error, ExtractionOutcome, Extractor, Result, StructuredExtraction};

use super::run_cmd_with_timeout;

pub struct CommandExtractor {
    name: String,
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandExtractor {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(EXTRACTION_CMD_TIMEOUT_SECS),
        }
    }

    /// Arguments placed before the file path.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

/// Interpret the helper's stdout.
pub fn parse_helper_output(stdout: &str) -> Result<ExtractionOutcome> {
    let value: JsonValue = serde_json::from_str(stdout.trim()).map_err(|e| {
        Error::MalformedExtraction(format!("helper output is not JSON: {}", e))
    })?;
    match value {
        JsonValue::String(text) => Ok(ExtractionOutcome::raw_text(text)),
        record @ JsonValue::Object(_) => {
            StructuredExtraction::from_record(record).map(ExtractionOutcome::Structured)
        }
        other => Err(Error::MalformedExtraction(format!(
            "expected an object or a string, got {}",
            other
        ))),
    }
}

#[async_trait]
impl Extractor for CommandExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractionOutcome> {
        let stdout = run_cmd_with_timeout(
            Command::new(&self.program).args(&self.args).arg(path),
            self.timeout,
        )
        .await?;
        parse_helper_output(&stdout)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(tokio::fs::metadata(&self.program)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_structured_output() {
        let outcome = parse_helper_output(
            r#"{"name": "Doc1", "metadata": {"pages": 3}, "links": ["Doc2", "Doc3"]}"#,
        )
        .unwrap();
        match outcome {
            ExtractionOutcome::Structured(extraction) => {
                assert_eq!(extraction.name, "Doc1");
                assert_eq!(extraction.metadata, json!({"pages": 3}));
                assert_eq!(extraction.links.len(), 2);
            }
            other => panic!("expected structured, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_raw_text_output() {
        let outcome = parse_helper_output("\"See the Annual Report\"\n").unwrap();
        assert_eq!(
            outcome,
            ExtractionOutcome::raw_text("See the Annual Report")
        );
    }

    #[test]
    fn test_parse_missing_links_is_malformed() {
        let err = parse_helper_output(r#"{"name": "Doc1", "metadata": {}}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedExtraction(_)), "{}", err);
    }

    #[test]
    fn test_parse_non_json_is_malformed() {
        let err = parse_helper_output("Traceback (most recent call last)").unwrap_err();
        assert!(matches!(err, Error::MalformedExtraction(_)), "{}", err);
    }

    #[test]
    fn test_parse_array_is_malformed() {
        let err = parse_helper_output(r#"["Doc1"]"#).unwrap_err();
        assert!(matches!(err, Error::MalformedExtraction(_)), "{}", err);
    }

    #[tokio::test]
    async fn test_health_check_missing_program() {
        let extractor = CommandExtractor::new("xml", "/nonexistent/process-xml");
        assert!(!extractor.health_check().await.unwrap());
        assert_eq!(extractor.name(), "xml");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extract_runs_helper_with_path() {
        let extractor = CommandExtractor::new("xml", "sh").with_args([
            "-c",
            r#"printf '{"name":"%s","metadata":{},"links":[]}' "$(basename "$0")""#,
        ]);

        let outcome = extractor
            .extract(Path::new("/files/Doc1.xml"))
            .await
            .unwrap();
        match outcome {
            ExtractionOutcome::Structured(extraction) => assert_eq!(extraction.name, "Doc1.xml"),
            other => panic!("expected structured, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extract_failing_helper() {
        let extractor = CommandExtractor::new("xml", "sh").with_args(["-c", "exit 1"]);
        let err = extractor.extract(Path::new("a.xml")).await.unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }
}
