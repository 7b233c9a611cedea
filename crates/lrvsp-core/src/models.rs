//! Core data models for the extraction daemon.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::encoding::{encode_links, encode_metadata, encode_title};
use crate::error::{Error, Result};

// =============================================================================
// QUEUE ROWS
// =============================================================================

/// A queued reference to a file awaiting extraction (`FilePaths` row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: i64,
    pub path: String,
    pub entity_id: i64,
    pub failed: bool,
}

impl WorkItem {
    /// Lowercased text after the last `.` of the path's final component.
    ///
    /// Unlike [`Path::extension`], a dot-file such as `.pdf` has the file
    /// type `pdf`.
    pub fn file_type(&self) -> Option<String> {
        let name = Path::new(&self.path).file_name()?.to_str()?;
        let (_, suffix) = name.rsplit_once('.')?;
        (!suffix.is_empty()).then(|| suffix.to_lowercase())
    }

    /// File name without its suffix. Used as the title of raw-text documents.
    pub fn file_stem(&self) -> String {
        Path::new(&self.path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.clone())
    }
}

/// A persisted document record (`DocObjs` row), with encoded title and metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentObject {
    pub title: String,
    pub metadata: String,
    pub entity_id: i64,
    pub num_links: i32,
}

/// A directed reference edge between two encoded titles (`LinkObjs` row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkObject {
    pub from_title: String,
    pub to_title: String,
}

/// A document and its links, encoded and ready for the atomic write unit.
///
/// Construction is the only way to obtain one, which keeps
/// `document.num_links == links.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedDocument {
    document: DocumentObject,
    links: Vec<LinkObject>,
}

impl EncodedDocument {
    /// Encode a title, metadata, and link targets for persistence.
    ///
    /// Links whose encoding exceeds the storage width are dropped.
    pub fn encode<'a, I>(title: &str, metadata: &JsonValue, entity_id: i64, links: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let title = encode_title(title);
        let metadata = encode_metadata(metadata)?;
        let links: Vec<LinkObject> = encode_links(links)
            .into_iter()
            .map(|to_title| LinkObject {
                from_title: title.clone(),
                to_title,
            })
            .collect();
        let num_links = i32::try_from(links.len())
            .map_err(|_| Error::InvalidInput(format!("Too many links: {}", links.len())))?;

        Ok(Self {
            document: DocumentObject {
                title,
                metadata,
                entity_id,
                num_links,
            },
            links,
        })
    }

    pub fn document(&self) -> &DocumentObject {
        &self.document
    }

    pub fn links(&self) -> &[LinkObject] {
        &self.links
    }
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// Structured extractor output: a title, free-form metadata, and link targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredExtraction {
    pub name: String,
    pub metadata: JsonValue,
    pub links: BTreeSet<String>,
}

impl StructuredExtraction {
    /// Validate a JSON record of shape `{name, metadata, links}`.
    ///
    /// `name` must be a non-empty string, `metadata` any JSON value, and
    /// `links` an array of strings. Anything else is a malformed result.
    pub fn from_record(record: JsonValue) -> Result<Self> {
        let mut map = match record {
            JsonValue::Object(map) => map,
            other => {
                return Err(Error::MalformedExtraction(format!(
                    "expected an object, got {}",
                    json_type_name(&other)
                )))
            }
        };

        let name = match map.remove("name") {
            Some(JsonValue::String(name)) => name,
            Some(other) => {
                return Err(Error::MalformedExtraction(format!(
                    "`name` must be a string, got {}",
                    json_type_name(&other)
                )))
            }
            None => return Err(Error::MalformedExtraction("missing `name`".into())),
        };

        let metadata = map
            .remove("metadata")
            .ok_or_else(|| Error::MalformedExtraction("missing `metadata`".into()))?;

        let links = match map.remove("links") {
            Some(JsonValue::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    JsonValue::String(link) => Ok(link),
                    other => Err(Error::MalformedExtraction(format!(
                        "`links` entries must be strings, got {}",
                        json_type_name(&other)
                    ))),
                })
                .collect::<Result<BTreeSet<String>>>()?,
            Some(other) => {
                return Err(Error::MalformedExtraction(format!(
                    "`links` must be an array, got {}",
                    json_type_name(&other)
                )))
            }
            None => return Err(Error::MalformedExtraction("missing `links`".into())),
        };

        let extraction = Self {
            name,
            metadata,
            links,
        };
        extraction.validate()?;
        Ok(extraction)
    }

    /// Check the invariants a typed value can still violate.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::MalformedExtraction("`name` is empty".into()));
        }
        Ok(())
    }
}

/// Plain text plus whatever document properties the extractor could read.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawDocument {
    pub text: String,
    /// Title embedded in the file, if any. The file stem is used otherwise.
    pub title: Option<String>,
    /// Properties recorded alongside the text statistics.
    pub metadata: JsonMap<String, JsonValue>,
}

impl RawDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_metadata(mut self, metadata: JsonMap<String, JsonValue>) -> Self {
        self.metadata = metadata;
        self
    }

    /// The embedded title if it is not blank, otherwise `fallback`.
    pub fn title_or(&self, fallback: &str) -> String {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(fallback)
            .to_string()
    }
}

/// What an extractor produced for one file.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// Title, metadata, and links are already known.
    Structured(StructuredExtraction),
    /// Plain text that still needs a link-recognition pass.
    RawText(RawDocument),
}

impl ExtractionOutcome {
    /// Raw text with no embedded properties.
    pub fn raw_text(text: impl Into<String>) -> Self {
        Self::RawText(RawDocument::new(text))
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Structured(_) => "structured",
            Self::RawText(_) => "raw_text",
        }
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

// =============================================================================
// SCHEDULING
// =============================================================================

/// Which tables count toward remaining work after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemainingScope {
    /// Only unfailed `FilePaths` rows.
    Queue,
    /// Unfailed rows in `FilePaths`, `DocObjs`, and `LinkObjs`.
    #[default]
    All,
}

impl std::fmt::Display for RemainingScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queue => write!(f, "queue"),
            Self::All => write!(f, "all"),
        }
    }
}

impl std::str::FromStr for RemainingScope {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queue" | "file_paths" | "filepaths" => Ok(Self::Queue),
            "all" | "strict" => Ok(Self::All),
            _ => Err(format!("Invalid remaining scope: {}", s)),
        }
    }
}

/// Result of one downstream trigger invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// The trigger exited with status 0.
    Succeeded,
    /// The trigger could not be started, timed out, or exited non-zero.
    Failed {
        exit_code: Option<i32>,
        message: String,
    },
    /// Notification is disabled for this run.
    Skipped,
}

impl NotifyOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(path: &str) -> WorkItem {
        WorkItem {
            id: 1,
            path: path.to_string(),
            entity_id: 42,
            failed: false,
        }
    }

    #[test]
    fn test_file_type_is_lowercased_suffix() {
        assert_eq!(item("/uploads/Report.PDF").file_type().as_deref(), Some("pdf"));
        assert_eq!(item("data/report.csv").file_type().as_deref(), Some("csv"));
        assert_eq!(item("a/b.tar.gz").file_type().as_deref(), Some("gz"));
    }

    #[test]
    fn test_file_type_absent() {
        assert_eq!(item("/uploads/README").file_type(), None);
        assert_eq!(item("/uploads.d/README").file_type(), None);
        assert_eq!(item("trailing.").file_type(), None);
        assert_eq!(item("/").file_type(), None);
    }

    #[test]
    fn test_file_type_of_dot_file() {
        assert_eq!(item("/uploads/.pdf").file_type().as_deref(), Some("pdf"));
        assert_eq!(item("/uploads/.Notes.TXT").file_type().as_deref(), Some("txt"));
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(item("/uploads/Annual Report.txt").file_stem(), "Annual Report");
        assert_eq!(item("plain").file_stem(), "plain");
    }

    #[test]
    fn test_raw_document_title_fallback() {
        let untitled = RawDocument::new("body");
        assert_eq!(untitled.title_or("Report"), "Report");
        assert_eq!(untitled.clone().with_title("   ").title_or("Report"), "Report");
        assert_eq!(
            untitled.with_title(" Annual Report ").title_or("Report"),
            "Annual Report"
        );
        assert_eq!(
            ExtractionOutcome::raw_text("body"),
            ExtractionOutcome::RawText(RawDocument::new("body"))
        );
    }

    #[test]
    fn test_from_record_valid() {
        let extraction = StructuredExtraction::from_record(json!({
            "name": "Doc1",
            "metadata": {},
            "links": ["Doc2", "Doc3"],
        }))
        .unwrap();

        assert_eq!(extraction.name, "Doc1");
        assert_eq!(extraction.metadata, json!({}));
        assert_eq!(extraction.links.len(), 2);
        assert!(extraction.links.contains("Doc3"));
    }

    #[test]
    fn test_from_record_missing_links() {
        let err = StructuredExtraction::from_record(json!({"name": "Doc1", "metadata": {}}))
            .unwrap_err();
        assert!(matches!(err, Error::MalformedExtraction(_)), "{}", err);
        assert!(err.to_string().contains("missing `links`"));
    }

    #[test]
    fn test_from_record_missing_metadata() {
        let err =
            StructuredExtraction::from_record(json!({"name": "Doc1", "links": []})).unwrap_err();
        assert!(err.to_string().contains("missing `metadata`"));
    }

    #[test]
    fn test_from_record_rejects_non_object() {
        let err = StructuredExtraction::from_record(json!(["Doc1"])).unwrap_err();
        assert!(err.to_string().contains("expected an object, got array"));
    }

    #[test]
    fn test_from_record_rejects_non_string_link() {
        let err = StructuredExtraction::from_record(json!({
            "name": "Doc1",
            "metadata": null,
            "links": ["Doc2", 3],
        }))
        .unwrap_err();
        assert!(err.to_string().contains("entries must be strings"));
    }

    #[test]
    fn test_from_record_rejects_empty_name() {
        let err = StructuredExtraction::from_record(json!({
            "name": "  ",
            "metadata": {},
            "links": [],
        }))
        .unwrap_err();
        assert!(matches!(err, Error::MalformedExtraction(_)), "{}", err);
    }

    #[test]
    fn test_encoded_document_link_count_matches_links() {
        let links: BTreeSet<String> = ["Doc2", "Doc3"].iter().map(|s| s.to_string()).collect();
        let doc = EncodedDocument::encode("Doc1", &json!({}), 7, &links).unwrap();

        assert_eq!(doc.document().num_links, 2);
        assert_eq!(doc.links().len(), 2);
        assert_eq!(doc.document().entity_id, 7);
        assert!(doc
            .links()
            .iter()
            .all(|link| link.from_title == doc.document().title));
    }

    #[test]
    fn test_encoded_document_excludes_wide_links() {
        let links = vec!["Doc2".to_string(), "x".repeat(195)];
        let doc = EncodedDocument::encode("Doc1", &json!({}), 7, &links).unwrap();

        assert_eq!(doc.document().num_links, 1);
        assert_eq!(doc.links().len(), 1);
    }

    #[test]
    fn test_remaining_scope_parse() {
        assert_eq!("queue".parse::<RemainingScope>().unwrap(), RemainingScope::Queue);
        assert_eq!("ALL".parse::<RemainingScope>().unwrap(), RemainingScope::All);
        assert!("nope".parse::<RemainingScope>().is_err());
        assert_eq!(RemainingScope::default(), RemainingScope::All);
    }
}
