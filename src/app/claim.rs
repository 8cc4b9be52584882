use anyhow::Context as _;
use chrono::Utc;
use rand::Rng as _;

use crate::app::document_store::{DocumentFilter, DocumentOrder};
use crate::app::lifecycle::JobLifecycle;
use crate::app::model::{ContentStatus, Document};
use crate::app::state::{Event, apply};

/// Attempts to pick a different candidate after losing a claim race.
const MAX_CLAIM_ROUNDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClaimStrategy {
    /// Pick a random pending document and write the claim blindly. Two
    /// workers can collide on the same document; the later write wins.
    RandomOffset,
    /// Pick a random pending document and only claim it if it is still
    /// pending at write time.
    #[default]
    CompareAndSwap,
}

impl ClaimStrategy {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "" | "compare-and-swap" | "compare_and_swap" | "cas" => Ok(Self::CompareAndSwap),
            "random-offset" | "random_offset" | "random" => Ok(Self::RandomOffset),
            other => anyhow::bail!(
                "invalid claim strategy: {other} (expected compare-and-swap|random-offset)"
            ),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RandomOffset => "random-offset",
            Self::CompareAndSwap => "compare-and-swap",
        }
    }
}

impl JobLifecycle {
    /// Claims one pending document chosen at a random offset, or `None`
    /// when nothing is pending.
    pub async fn claim_next_pending(
        &self,
        strategy: ClaimStrategy,
    ) -> anyhow::Result<Option<Document>> {
        for round in 0..MAX_CLAIM_ROUNDS {
            let total = self
                .store
                .count(ContentStatus::Pending)
                .await
                .context("count pending documents")?;
            if total == 0 {
                return Ok(None);
            }

            let offset = rand::thread_rng().gen_range(0..total);
            let Some(candidate) = self.pending_at(offset).await? else {
                return Ok(None);
            };

            let mut document = candidate;
            apply(&mut document, Event::Claim, Utc::now())?;
            match strategy {
                ClaimStrategy::RandomOffset => {
                    self.store.put(&document).await.context("save claim")?;
                    return Ok(Some(document));
                }
                ClaimStrategy::CompareAndSwap => {
                    if self
                        .store
                        .put_if_status(&document, &[ContentStatus::Pending])
                        .await
                        .context("save claim")?
                    {
                        return Ok(Some(document));
                    }
                    tracing::debug!(document_id = %document.id, round, "lost claim race");
                }
            }
        }
        tracing::debug!("gave up claiming after {MAX_CLAIM_ROUNDS} lost races");
        Ok(None)
    }

    async fn pending_at(&self, offset: usize) -> anyhow::Result<Option<Document>> {
        let filter = DocumentFilter::with_status(ContentStatus::Pending).limit(1);
        let mut page = self
            .store
            .list(&filter.clone().offset(offset))
            .await
            .context("list pending documents")?;
        if page.is_empty() {
            // The pool shrank between count and list.
            page = self
                .store
                .list(&filter)
                .await
                .context("list pending documents")?;
        }
        Ok(page.pop())
    }

    /// Claims a specific document if it is still claimable, using a
    /// compare-and-swap on its current status.
    pub async fn claim(&self, document: &Document) -> anyhow::Result<Option<Document>> {
        let now = Utc::now();
        if !self.retry.is_claimable(document, now) {
            return Ok(None);
        }
        let expected = document.content_status;
        let mut claimed = document.clone();
        apply(&mut claimed, Event::Claim, now)?;
        let written = self
            .store
            .put_if_status(&claimed, &[expected])
            .await
            .context("save claim")?;
        Ok(written.then_some(claimed))
    }

    /// Claims up to `limit` documents, newest model years first. Failed
    /// documents are included once the retry policy allows it.
    pub async fn claim_batch(&self, limit: usize) -> anyhow::Result<Vec<Document>> {
        let now = Utc::now();
        let candidates = self
            .store
            .list(
                &DocumentFilter::with_statuses(&[ContentStatus::Pending, ContentStatus::Failed])
                    .order(DocumentOrder::YearDesc),
            )
            .await
            .context("list claimable documents")?;

        let mut claimed = Vec::new();
        for document in candidates
            .iter()
            .filter(|d| self.retry.is_claimable(d, now))
        {
            if claimed.len() >= limit {
                break;
            }
            if let Some(document) = self.claim(document).await? {
                claimed.push(document);
            }
        }
        Ok(claimed)
    }
}
