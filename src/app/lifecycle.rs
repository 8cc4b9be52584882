use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use chrono::Utc;

use crate::app::document_store::{DocumentFilter, DocumentStore};
use crate::app::model::{ContentStatus, Document, ExtractedContent};
use crate::app::state::{Event, RetryPolicy, apply};
use crate::error::{MAX_ERROR_MESSAGE_CHARS, truncate_chars};
use crate::formats::Section;

/// Drives documents through the extraction lifecycle against a store.
#[derive(Clone)]
pub struct JobLifecycle {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) retry: RetryPolicy,
}

impl JobLifecycle {
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    async fn load(&self, document_id: &str) -> anyhow::Result<Document> {
        self.store
            .get(document_id)
            .await
            .context("load document")?
            .ok_or_else(|| anyhow::anyhow!("document not found: {document_id}"))
    }

    /// Replaces the document's content and sections, then marks it
    /// `extracted`. Running it again with the same input leaves the same
    /// content, sections and status behind.
    pub async fn complete_extraction(
        &self,
        document_id: &str,
        content: ExtractedContent,
        sections: &[Section],
    ) -> anyhow::Result<Document> {
        if content.document_id != document_id {
            anyhow::bail!(
                "content belongs to {}, not {document_id}",
                content.document_id
            );
        }
        let mut document = self.load(document_id).await?;

        self.store
            .put_content(&content)
            .await
            .context("replace extracted content")?;
        self.store
            .replace_sections(document_id, sections)
            .await
            .context("replace sections")?;

        apply(&mut document, Event::Complete, Utc::now())?;
        self.store.put(&document).await.context("save document")?;
        tracing::debug!(
            document_id,
            chars = content.char_count,
            sections = sections.len(),
            "extraction completed"
        );
        Ok(document)
    }

    /// Marks an `extracting` document as `failed`. A report for a document
    /// that is no longer `extracting` is ignored and returns `false`.
    pub async fn fail_extraction(&self, document_id: &str, reason: &str) -> anyhow::Result<bool> {
        let mut document = self.load(document_id).await?;
        if let Err(err) = apply(&mut document, Event::Fail, Utc::now()) {
            tracing::warn!(document_id, %err, "ignoring failure report");
            return Ok(false);
        }
        document.error_message = Some(truncate_chars(reason, MAX_ERROR_MESSAGE_CHARS));
        let written = self
            .store
            .put_if_status(&document, &[ContentStatus::Extracting])
            .await
            .context("save document")?;
        if !written {
            tracing::warn!(document_id, "document changed before failure was recorded");
        }
        Ok(written)
    }

    /// Sends an `extracted` or `failed` document back to `pending`. With
    /// `force`, its content and sections are deleted once the status has
    /// flipped, so nothing stale is served while it waits.
    ///
    /// Returns `false` when the document changed underneath; nothing is
    /// deleted in that case.
    pub async fn requeue(&self, document_id: &str, force: bool) -> anyhow::Result<bool> {
        let mut document = self.load(document_id).await?;
        let from = document.content_status;
        apply(&mut document, Event::Requeue, Utc::now())?;

        if !self
            .store
            .put_if_status(&document, &[from])
            .await
            .context("save document")?
        {
            tracing::warn!(document_id, %from, "document changed before requeue was recorded");
            return Ok(false);
        }

        if force {
            self.store
                .delete_content(document_id)
                .await
                .context("delete extracted content")?;
            self.store
                .delete_sections(document_id)
                .await
                .context("delete sections")?;
        }
        Ok(true)
    }

    /// Resets `extracting` documents whose claim is older than `threshold`
    /// back to `pending`. A document that has used up its attempts is marked
    /// `failed` instead, so a claim that keeps crashing its worker stops
    /// being handed out. Returns every document that was moved.
    pub async fn reset_stale_claims(&self, threshold: Duration) -> anyhow::Result<Vec<Document>> {
        let now = Utc::now();
        let extracting = self
            .store
            .list(&DocumentFilter::with_status(ContentStatus::Extracting))
            .await
            .context("list extracting documents")?;

        let mut reset = Vec::new();
        for mut document in extracting {
            let elapsed = (now - document.claim_started_at())
                .to_std()
                .unwrap_or(Duration::ZERO);
            if elapsed <= threshold {
                continue;
            }
            let exhausted = document.attempts >= self.retry.max_attempts;
            if exhausted {
                apply(&mut document, Event::Fail, now)?;
                document.error_message = Some(format!(
                    "stuck in extracting for {} minutes, attempts exhausted ({}/{})",
                    elapsed.as_secs() / 60,
                    document.attempts,
                    self.retry.max_attempts
                ));
            } else {
                apply(&mut document, Event::ResetStale, now)?;
            }
            if !self
                .store
                .put_if_status(&document, &[ContentStatus::Extracting])
                .await
                .context("save document")?
            {
                continue;
            }
            tracing::warn!(
                document_id = %document.id,
                name = %document.display_name(),
                stuck_minutes = elapsed.as_secs() / 60,
                attempts = document.attempts,
                status = %document.content_status,
                "stuck extraction reset"
            );
            reset.push(document);
        }
        Ok(reset)
    }
}
