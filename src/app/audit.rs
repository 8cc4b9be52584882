use std::collections::BTreeMap;

use anyhow::Context as _;

use crate::app::document_store::DocumentFilter;
use crate::app::lifecycle::JobLifecycle;
use crate::app::model::ContentStatus;
use crate::quality::{QualityEvaluator, QualityReport};

#[derive(Debug, Clone, Default)]
pub struct AuditOptions {
    pub limit: Option<usize>,
    /// Only audit content produced by this extraction method.
    pub method: Option<String>,
    /// Re-queue documents that fail the quality gate.
    pub fix: bool,
    /// With `fix`, delete their content and sections first.
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub document_id: String,
    pub name: String,
    pub method: String,
    pub report: QualityReport,
    pub requeued: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MethodTally {
    pub passed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct AuditSummary {
    pub entries: Vec<AuditEntry>,
    pub by_method: BTreeMap<String, MethodTally>,
    /// Extracted documents with no stored content.
    pub missing_content: Vec<String>,
}

impl AuditSummary {
    pub fn passed(&self) -> usize {
        self.entries.iter().filter(|e| e.report.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.passed()
    }

    pub fn requeued(&self) -> usize {
        self.entries.iter().filter(|e| e.requeued).count()
    }

    pub fn pass_rate(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.passed() as f64 * 100.0 / self.entries.len() as f64
    }
}

/// Re-scores stored extractions with the current evaluator.
pub async fn run_audit(
    lifecycle: &JobLifecycle,
    evaluator: &QualityEvaluator,
    options: &AuditOptions,
) -> anyhow::Result<AuditSummary> {
    let store = lifecycle.store();
    let mut filter = DocumentFilter::with_status(ContentStatus::Extracted);
    if let Some(limit) = options.limit {
        filter = filter.limit(limit);
    }
    let documents = store
        .list(&filter)
        .await
        .context("list extracted documents")?;

    let mut summary = AuditSummary::default();
    for document in documents {
        let Some(content) = store
            .get_content(&document.id)
            .await
            .context("load extracted content")?
        else {
            tracing::warn!(document_id = %document.id, "extracted document has no content");
            summary.missing_content.push(document.id);
            continue;
        };
        if let Some(method) = options.method.as_deref()
            && content.extraction_method != method
        {
            continue;
        }

        let sections = store
            .get_sections(&document.id)
            .await
            .context("load sections")?;
        let report = evaluator.evaluate(&content.content_markdown, &sections);

        let tally = summary
            .by_method
            .entry(content.extraction_method.clone())
            .or_default();
        if report.passed {
            tally.passed += 1;
        } else {
            tally.failed += 1;
        }

        let requeued = if !report.passed && options.fix {
            let requeued = lifecycle
                .requeue(&document.id, options.force)
                .await
                .with_context(|| format!("requeue {}", document.id))?;
            if requeued {
                tracing::info!(
                    document_id = %document.id,
                    score = report.score,
                    force = options.force,
                    "requeued low-quality extraction"
                );
            }
            requeued
        } else {
            false
        };

        summary.entries.push(AuditEntry {
            name: document.display_name(),
            document_id: document.id,
            method: content.extraction_method,
            report,
            requeued,
        });
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::app::document_store::{DocumentStore, InMemoryDocumentStore};
    use crate::app::model::{Document, ExtractedContent};
    use crate::app::state::RetryPolicy;
    use crate::sections::parse_sections;

    fn good_markdown() -> String {
        let body = "Rotate the tires every five thousand miles to keep wear even. ".repeat(20);
        (1..=6)
            .map(|i| format!("# Chapter {i}\n{body}\n"))
            .collect()
    }

    async fn seed(
        store: &Arc<dyn DocumentStore>,
        id: &str,
        markdown: &str,
        method: &str,
    ) -> anyhow::Result<()> {
        let mut doc = Document::new(id, 2022, "Nissan", "Leaf", format!("{id}.pdf"))?;
        doc.content_status = ContentStatus::Extracted;
        store.put(&doc).await?;
        let sections = parse_sections(markdown);
        store
            .put_content(&ExtractedContent::new(id, markdown, method, &sections))
            .await?;
        store.replace_sections(id, &sections).await?;
        Ok(())
    }

    async fn seeded() -> anyhow::Result<JobLifecycle> {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        seed(&store, "good", &good_markdown(), "marker-pdf").await?;
        seed(&store, "bad", "garbage", "marker-pdf").await?;
        seed(&store, "other", "garbage", "docling").await?;
        Ok(JobLifecycle::new(store, RetryPolicy::default()))
    }

    #[tokio::test]
    async fn reports_without_touching_documents() -> anyhow::Result<()> {
        let jobs = seeded().await?;
        let summary = run_audit(&jobs, &QualityEvaluator::default(), &AuditOptions::default())
            .await?;
        assert_eq!(summary.entries.len(), 3);
        assert_eq!(summary.passed(), 1);
        assert_eq!(summary.failed(), 2);
        assert_eq!(summary.requeued(), 0);
        assert_eq!(
            summary.by_method.get("marker-pdf"),
            Some(&MethodTally {
                passed: 1,
                failed: 1
            })
        );
        let bad = jobs.store().get("bad").await?.unwrap();
        assert_eq!(bad.content_status, ContentStatus::Extracted);
        Ok(())
    }

    #[tokio::test]
    async fn method_filter_skips_other_methods() -> anyhow::Result<()> {
        let jobs = seeded().await?;
        let options = AuditOptions {
            method: Some("docling".to_owned()),
            ..AuditOptions::default()
        };
        let summary = run_audit(&jobs, &QualityEvaluator::default(), &options).await?;
        let ids = summary
            .entries
            .iter()
            .map(|e| e.document_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["other"]);
        Ok(())
    }

    #[tokio::test]
    async fn fix_requeues_failures_and_force_drops_content() -> anyhow::Result<()> {
        let jobs = seeded().await?;
        let options = AuditOptions {
            method: Some("marker-pdf".to_owned()),
            fix: true,
            force: true,
            ..AuditOptions::default()
        };
        let summary = run_audit(&jobs, &QualityEvaluator::default(), &options).await?;
        assert_eq!(summary.requeued(), 1);

        let store = jobs.store();
        let bad = store.get("bad").await?.unwrap();
        assert_eq!(bad.content_status, ContentStatus::Pending);
        assert!(store.get_content("bad").await?.is_none());
        assert!(store.get_sections("bad").await?.is_empty());

        let good = store.get("good").await?.unwrap();
        assert_eq!(good.content_status, ContentStatus::Extracted);
        Ok(())
    }

    #[tokio::test]
    async fn missing_content_is_reported() -> anyhow::Result<()> {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let mut doc = Document::new("orphan", 2022, "Nissan", "Leaf", "o.pdf")?;
        doc.content_status = ContentStatus::Extracted;
        store.put(&doc).await?;
        let jobs = JobLifecycle::new(store, RetryPolicy::default());

        let summary = run_audit(&jobs, &QualityEvaluator::default(), &AuditOptions::default())
            .await?;
        assert!(summary.entries.is_empty());
        assert_eq!(summary.missing_content, vec!["orphan".to_owned()]);
        Ok(())
    }
}
