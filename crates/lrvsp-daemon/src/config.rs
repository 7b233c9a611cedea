//! Daemon configuration assembled from the environment.

use std::sync::Arc;
use std::time::Duration;

use lrvsp_core::defaults::{ENV_GLINER_BASE_URL, GLINER_TIMEOUT_SECS};
use lrvsp_core::{Error, Result};
use lrvsp_db::ConnectionConfig;
use lrvsp_inference::{GlinerBackend, NerBackend};
use lrvsp_jobs::{
    CommandExtractor, CommandNotifier, ExtractionRegistry, PdfTextAdapter, ProcessorConfig,
    SchedulerConfig, TextNativeAdapter,
};

/// File types served by built-in adapters that return raw text, so need NER.
const RAW_TEXT_BUILTINS: [&str; 2] = ["pdf", "txt"];

/// An external helper bound to a file type by `EXTRACTOR_COMMANDS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorCommand {
    pub file_type: String,
    pub program: String,
    pub args: Vec<String>,
}

/// Parse `type=program [args...]` entries separated by commas.
///
/// `xml=/opt/lrvsp/process-xml,pdf=python3 /opt/lrvsp/process_pdf.py`
pub fn parse_extractor_commands(raw: &str) -> Result<Vec<ExtractorCommand>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (file_type, command) = entry.split_once('=').ok_or_else(|| {
                Error::Config(format!(
                    "EXTRACTOR_COMMANDS entry '{}' is not type=program",
                    entry
                ))
            })?;
            let file_type = file_type.trim().trim_start_matches('.').to_lowercase();
            let mut words = command.split_whitespace();
            let program = words.next().ok_or_else(|| {
                Error::Config(format!("EXTRACTOR_COMMANDS entry '{}' has no program", entry))
            })?;
            if file_type.is_empty() {
                return Err(Error::Config(format!(
                    "EXTRACTOR_COMMANDS entry '{}' has no file type",
                    entry
                )));
            }
            Ok(ExtractorCommand {
                file_type,
                program: program.to_string(),
                args: words.map(str::to_string).collect(),
            })
        })
        .collect()
}

/// Everything the daemon reads at startup. Immutable for the run.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub database: ConnectionConfig,
    pub scheduler: SchedulerConfig,
    pub processor: ProcessorConfig,
    pub notifier: CommandNotifier,
    pub extractor_commands: Vec<ExtractorCommand>,
    pub gliner_base_url: Option<String>,
    pub gliner_timeout: Duration,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let extractor_commands = match var("EXTRACTOR_COMMANDS") {
            Some(raw) => parse_extractor_commands(&raw)?,
            None => Vec::new(),
        };
        let gliner_base_url = var(ENV_GLINER_BASE_URL)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let gliner_timeout = var("GLINER_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(GLINER_TIMEOUT_SECS));

        Ok(Self {
            database: ConnectionConfig::from_vars(&var),
            scheduler: SchedulerConfig::from_vars(&var),
            processor: ProcessorConfig::from_vars(&var),
            notifier: CommandNotifier::from_vars(&var),
            extractor_commands,
            gliner_base_url,
            gliner_timeout,
        })
    }

    /// Built-in raw-text types that no helper replaces.
    pub fn raw_text_types(&self) -> Vec<&'static str> {
        RAW_TEXT_BUILTINS
            .into_iter()
            .filter(|builtin| {
                !self
                    .extractor_commands
                    .iter()
                    .any(|command| command.file_type == *builtin)
            })
            .collect()
    }

    /// Reject setups where every raw-text item would be failed permanently.
    pub fn validate(&self) -> Result<()> {
        let raw_text_types = self.raw_text_types();
        if self.gliner_base_url.is_none() && !raw_text_types.is_empty() {
            return Err(Error::Config(format!(
                "{} is unset but the built-in {} extractors need it; set it or replace them in EXTRACTOR_COMMANDS",
                ENV_GLINER_BASE_URL,
                raw_text_types.join("/")
            )));
        }
        Ok(())
    }

    /// Built-in extractors, then configured helpers (which may replace them).
    pub fn build_registry(&self) -> ExtractionRegistry {
        let mut registry = ExtractionRegistry::new()
            .with("pdf", Arc::new(PdfTextAdapter::new()))
            .with("txt", Arc::new(TextNativeAdapter));

        for command in &self.extractor_commands {
            registry.register(
                &command.file_type,
                Arc::new(
                    CommandExtractor::new(command.file_type.clone(), &command.program)
                        .with_args(command.args.clone()),
                ),
            );
        }
        registry
    }

    /// NER backend for raw-text results, if one is configured.
    pub fn ner_backend(&self) -> Option<Arc<dyn NerBackend>> {
        self.gliner_base_url
            .as_ref()
            .map(|url| {
                Arc::new(GlinerBackend::new(url.clone()).with_timeout(self.gliner_timeout))
                    as Arc<dyn NerBackend>
            })
    }
}
