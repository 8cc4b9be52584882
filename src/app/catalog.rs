use std::path::Path;

use anyhow::Context as _;

use crate::app::document_store::DocumentStore;
use crate::app::model::Document;
use crate::formats::CatalogRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub already_present: usize,
}

/// Reads a JSON Lines catalog. Blank lines are ignored; any malformed line
/// fails the whole read.
pub fn read_catalog(path: &Path) -> anyhow::Result<Vec<CatalogRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read catalog: {}", path.display()))?;
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str::<CatalogRecord>(line)
                .with_context(|| format!("parse catalog line {}", idx + 1))
        })
        .collect()
}

/// Seeds `pending` documents. Documents that already exist are left alone
/// so a re-import never resets extraction progress.
pub async fn import_catalog(
    store: &dyn DocumentStore,
    records: Vec<CatalogRecord>,
) -> anyhow::Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    for record in records {
        let document = Document::from_catalog(record).context("build document")?;
        if store
            .get(&document.id)
            .await
            .context("load document")?
            .is_some()
        {
            summary.already_present += 1;
            continue;
        }
        store.put(&document).await.context("save document")?;
        tracing::debug!(document_id = %document.id, name = %document.display_name(), "imported");
        summary.imported += 1;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::document_store::InMemoryDocumentStore;
    use crate::app::model::ContentStatus;

    const CATALOG: &str = r#"{"year": 2024, "make": "Toyota", "model": "RAV4", "source": "https://example.com/rav4.pdf"}

{"id": "camry-2023", "year": 2023, "make": "Toyota", "model": "Camry", "variant": "Hybrid", "source": "manuals/camry.pdf"}
"#;

    #[tokio::test]
    async fn imports_once() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("catalog.jsonl");
        std::fs::write(&path, CATALOG)?;

        let records = read_catalog(&path)?;
        assert_eq!(records.len(), 2);

        let store = InMemoryDocumentStore::new();
        let first = import_catalog(&store, records.clone()).await?;
        assert_eq!(
            first,
            ImportSummary {
                imported: 2,
                already_present: 0
            }
        );
        let camry = store.get("camry-2023").await?.unwrap();
        assert_eq!(camry.content_status, ContentStatus::Pending);
        assert_eq!(camry.display_name(), "2023 Toyota Camry Hybrid");

        let second = import_catalog(&store, records).await?;
        assert_eq!(second.imported, 0);
        assert_eq!(second.already_present, 2);
        Ok(())
    }

    #[test]
    fn malformed_line_names_its_number() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("catalog.jsonl");
        std::fs::write(&path, "{\"year\": 2020, \"make\": \"A\", \"model\": \"B\", \"source\": \"x\"}\n{oops}\n")?;
        let err = read_catalog(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parse catalog line 2"));
        Ok(())
    }

    #[tokio::test]
    async fn empty_source_is_rejected() {
        let record = CatalogRecord {
            id: None,
            year: 2020,
            make: "A".to_owned(),
            model: "B".to_owned(),
            variant: None,
            source: " ".to_owned(),
        };
        let store = InMemoryDocumentStore::new();
        assert!(import_catalog(&store, vec![record]).await.is_err());
    }
}
