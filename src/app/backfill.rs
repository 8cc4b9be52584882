use std::fmt;

use anyhow::Context as _;

use crate::app::document_store::{DocumentFilter, DocumentStore};
use crate::app::model::ContentStatus;
use crate::sections::parse_sections;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillEntry {
    Done { name: String, sections: usize },
    Skipped { name: String, reason: String },
}

impl BackfillEntry {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

impl fmt::Display for BackfillEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done { name, sections } => write!(f, "[DONE] {name}: {sections} sections"),
            Self::Skipped { name, reason } => write!(f, "[SKIP] {name}: {reason}"),
        }
    }
}

/// Regenerates sections for extracted documents that have content but no
/// sections, from their stored Markdown.
pub async fn backfill_sections(
    store: &dyn DocumentStore,
    limit: Option<usize>,
) -> anyhow::Result<Vec<BackfillEntry>> {
    let mut filter = DocumentFilter::with_status(ContentStatus::Extracted);
    if let Some(limit) = limit {
        filter = filter.limit(limit);
    }
    let documents = store
        .list(&filter)
        .await
        .context("list extracted documents")?;

    let mut entries = Vec::with_capacity(documents.len());
    for document in documents {
        let name = document.display_name();
        let existing = store
            .get_sections(&document.id)
            .await
            .context("load sections")?;
        if !existing.is_empty() {
            entries.push(BackfillEntry::Skipped {
                name,
                reason: format!("already has {} sections", existing.len()),
            });
            continue;
        }

        let Some(content) = store
            .get_content(&document.id)
            .await
            .context("load extracted content")?
        else {
            entries.push(BackfillEntry::Skipped {
                name,
                reason: "no content found".to_owned(),
            });
            continue;
        };

        let sections = parse_sections(&content.content_markdown);
        store
            .replace_sections(&document.id, &sections)
            .await
            .with_context(|| format!("write sections for {}", document.id))?;
        tracing::debug!(document_id = %document.id, sections = sections.len(), "sections backfilled");
        entries.push(BackfillEntry::Done {
            name,
            sections: sections.len(),
        });
    }
    Ok(entries)
}
