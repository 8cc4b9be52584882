use std::fmt;
use std::sync::Arc;

use crate::app::lifecycle::JobLifecycle;
use crate::app::model::{Document, ExtractedContent};
use crate::converter::Converter;
use crate::error::ExtractionError;
use crate::quality::QualityEvaluator;
use crate::sections::parse_sections;
use crate::source::SourceFetcher;

/// What happened to one claimed document.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Extracted {
        document_id: String,
        name: String,
        char_count: usize,
        section_count: usize,
        quality_score: u32,
        quality_passed: bool,
    },
    Failed {
        document_id: String,
        name: String,
        kind: &'static str,
        message: String,
    },
}

impl ExtractionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Extracted { .. })
    }
}

impl fmt::Display for ExtractionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extracted {
                document_id,
                name,
                char_count,
                section_count,
                quality_score,
                quality_passed,
            } => {
                let verdict = if *quality_passed { "" } else { " (below quality bar)" };
                write!(
                    f,
                    "[OK]   {name} ({document_id}): {char_count} chars, {section_count} sections, quality {quality_score}/100{verdict}"
                )
            }
            Self::Failed {
                document_id,
                name,
                message,
                ..
            } => write!(f, "[FAIL] {name} ({document_id}): {message}"),
        }
    }
}

/// Runs the extraction pipeline for documents that are already claimed:
/// fetch, convert, length gate, sectioning, quality scoring, persistence.
pub struct ExtractionRunner {
    lifecycle: JobLifecycle,
    fetcher: SourceFetcher,
    converter: Arc<dyn Converter>,
    evaluator: QualityEvaluator,
    extraction_method: String,
    min_content_chars: usize,
}

impl ExtractionRunner {
    pub fn new(
        lifecycle: JobLifecycle,
        fetcher: SourceFetcher,
        converter: Arc<dyn Converter>,
        extraction_method: impl Into<String>,
        min_content_chars: usize,
    ) -> Self {
        Self {
            lifecycle,
            fetcher,
            converter,
            evaluator: QualityEvaluator::default(),
            extraction_method: extraction_method.into(),
            min_content_chars,
        }
    }

    pub fn with_evaluator(mut self, evaluator: QualityEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn lifecycle(&self) -> &JobLifecycle {
        &self.lifecycle
    }

    /// Contained failures are recorded on the document and reported as
    /// [`ExtractionOutcome::Failed`]; only persistence failures are errors.
    pub async fn run(&self, document: &Document) -> Result<ExtractionOutcome, ExtractionError> {
        let name = document.display_name();
        tracing::info!(document_id = %document.id, %name, "extraction started");

        match self.extract(document).await {
            Ok(outcome) => Ok(outcome),
            Err(err) if err.is_contained() => {
                tracing::warn!(
                    document_id = %document.id,
                    kind = err.kind(),
                    %err,
                    "extraction failed"
                );
                let message = err.to_document_message();
                self.lifecycle
                    .fail_extraction(&document.id, &message)
                    .await
                    .map_err(ExtractionError::PersistenceFailed)?;
                Ok(ExtractionOutcome::Failed {
                    document_id: document.id.clone(),
                    name,
                    kind: err.kind(),
                    message,
                })
            }
            Err(err) => {
                tracing::error!(document_id = %document.id, ?err, "persistence failed");
                Err(err)
            }
        }
    }

    async fn extract(&self, document: &Document) -> Result<ExtractionOutcome, ExtractionError> {
        let source = self.fetcher.fetch(&document.source).await?;
        let markdown = self.converter.convert(source.path()).await?;
        drop(source);

        let chars = markdown.chars().count();
        if chars < self.min_content_chars {
            return Err(ExtractionError::OutputTooShort {
                chars,
                min: self.min_content_chars,
            });
        }

        let sections = parse_sections(&markdown);
        let report = self.evaluator.evaluate(&markdown, &sections);
        if !report.passed {
            let verdict = ExtractionError::QualityRejected {
                score: report.score,
                issues: report.issues.clone(),
            };
            tracing::warn!(
                document_id = %document.id,
                %verdict,
                issues = ?report.issues,
                "keeping extraction that failed the quality gate"
            );
        }

        let content = ExtractedContent::new(
            &document.id,
            markdown,
            &self.extraction_method,
            &sections,
        )
        .with_quality_score(report.score);
        self.lifecycle
            .complete_extraction(&document.id, content, &sections)
            .await
            .map_err(ExtractionError::PersistenceFailed)?;

        Ok(ExtractionOutcome::Extracted {
            document_id: document.id.clone(),
            name: document.display_name(),
            char_count: chars,
            section_count: sections.len(),
            quality_score: report.score,
            quality_passed: report.passed,
        })
    }
}
