use std::time::Duration;

use thiserror::Error;

/// Longest error message persisted on a document.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// Everything that can go wrong while extracting one document.
///
/// Only [`ExtractionError::PersistenceFailed`] escapes the per-document
/// boundary; the rest are recorded on the document as `failed`.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("conversion failed: {0}")]
    ConversionFailed(String),

    #[error("conversion timeout after {:.1} minutes", .0.as_secs_f64() / 60.0)]
    ConversionTimeout(Duration),

    #[error("output too short: {chars} chars (min: {min})")]
    OutputTooShort { chars: usize, min: usize },

    #[error("persistence failed: {0:#}")]
    PersistenceFailed(anyhow::Error),

    #[error("quality rejected: score {score}/100 ({} issues)", .issues.len())]
    QualityRejected { score: u32, issues: Vec<String> },
}

impl ExtractionError {
    /// Short machine-friendly tag, used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable(_) => "source_unavailable",
            Self::ConversionFailed(_) => "conversion_failed",
            Self::ConversionTimeout(_) => "conversion_timeout",
            Self::OutputTooShort { .. } => "output_too_short",
            Self::PersistenceFailed(_) => "persistence_failed",
            Self::QualityRejected { .. } => "quality_rejected",
        }
    }

    /// Whether the failure stays inside the single-document boundary.
    pub fn is_contained(&self) -> bool {
        !matches!(self, Self::PersistenceFailed(_))
    }

    /// The message stored in a document's `error_message`.
    pub fn to_document_message(&self) -> String {
        truncate_chars(&self.to_string(), MAX_ERROR_MESSAGE_CHARS)
    }
}

pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_owned(),
        None => s.to_owned(),
    }
}
