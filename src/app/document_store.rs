use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

use crate::app::model::{ContentStatus, Document, ExtractedContent};
use crate::formats::Section;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentOrder {
    /// Stable key used by the randomized claim.
    #[default]
    Id,
    /// Newest model year first, then id.
    YearDesc,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    /// Empty means every status.
    pub statuses: Vec<ContentStatus>,
    pub order: DocumentOrder,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl DocumentFilter {
    pub fn with_status(status: ContentStatus) -> Self {
        Self {
            statuses: vec![status],
            ..Self::default()
        }
    }

    pub fn with_statuses(statuses: &[ContentStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            ..Self::default()
        }
    }

    pub fn order(mut self, order: DocumentOrder) -> Self {
        self.order = order;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, document: &Document) -> bool {
        self.statuses.is_empty() || self.statuses.contains(&document.content_status)
    }

    /// Filters, orders and pages an unordered set of documents.
    fn select(&self, documents: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut selected = documents
            .into_iter()
            .filter(|d| self.matches(d))
            .collect::<Vec<_>>();
        match self.order {
            DocumentOrder::Id => selected.sort_by(|a, b| a.id.cmp(&b.id)),
            DocumentOrder::YearDesc => {
                selected.sort_by(|a, b| b.year.cmp(&a.year).then_with(|| a.id.cmp(&b.id)))
            }
        }
        selected
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// The external store holding documents, their content and their sections.
///
/// Content and sections are replace-on-write per document id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, id: &str) -> anyhow::Result<Option<Document>>;
    async fn list(&self, filter: &DocumentFilter) -> anyhow::Result<Vec<Document>>;
    async fn count(&self, status: ContentStatus) -> anyhow::Result<usize>;

    /// Unconditional write.
    async fn put(&self, document: &Document) -> anyhow::Result<()>;

    /// Writes only if the stored status is one of `expected`. Returns whether
    /// the write happened.
    async fn put_if_status(
        &self,
        document: &Document,
        expected: &[ContentStatus],
    ) -> anyhow::Result<bool>;

    async fn get_content(&self, document_id: &str) -> anyhow::Result<Option<ExtractedContent>>;
    async fn put_content(&self, content: &ExtractedContent) -> anyhow::Result<()>;
    async fn delete_content(&self, document_id: &str) -> anyhow::Result<()>;

    async fn get_sections(&self, document_id: &str) -> anyhow::Result<Vec<Section>>;
    async fn replace_sections(&self, document_id: &str, sections: &[Section])
    -> anyhow::Result<()>;
    async fn delete_sections(&self, document_id: &str) -> anyhow::Result<()>;
}

/// One directory per document under `<base>/documents/<id>/`.
///
/// `put_if_status` is serialized within this process only; workers in other
/// processes sharing the directory fall back to last-writer-wins.
#[derive(Debug)]
pub struct LocalFsDocumentStore {
    base_dir: PathBuf,
    status_lock: Mutex<()>,
}

impl LocalFsDocumentStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            status_lock: Mutex::new(()),
        }
    }

    fn documents_dir(&self) -> PathBuf {
        self.base_dir.join("documents")
    }

    fn document_dir(&self, id: &str) -> anyhow::Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            anyhow::bail!("invalid document id: {id:?}");
        }
        Ok(self.documents_dir().join(id))
    }

    fn document_json_path(&self, id: &str) -> anyhow::Result<PathBuf> {
        Ok(self.document_dir(id)?.join("document.json"))
    }

    fn content_json_path(&self, id: &str) -> anyhow::Result<PathBuf> {
        Ok(self.document_dir(id)?.join("content.json"))
    }

    fn sections_json_path(&self, id: &str) -> anyhow::Result<PathBuf> {
        Ok(self.document_dir(id)?.join("sections.json"))
    }

    async fn read_all(&self) -> anyhow::Result<Vec<Document>> {
        let dir = self.documents_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("read documents dir: {}", dir.display()));
            }
        };

        let mut documents = Vec::new();
        while let Some(entry) = entries.next_entry().await.context("read documents dir entry")? {
            if !entry.file_type().await.context("stat document dir")?.is_dir() {
                continue;
            }
            let path = entry.path().join("document.json");
            if let Some(document) = read_json::<Document>(&path)
                .await
                .with_context(|| format!("read: {}", path.display()))?
            {
                documents.push(document);
            }
        }
        Ok(documents)
    }
}

#[async_trait]
impl DocumentStore for LocalFsDocumentStore {
    async fn get(&self, id: &str) -> anyhow::Result<Option<Document>> {
        let path = self.document_json_path(id)?;
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }

    async fn list(&self, filter: &DocumentFilter) -> anyhow::Result<Vec<Document>> {
        Ok(filter.select(self.read_all().await?))
    }

    async fn count(&self, status: ContentStatus) -> anyhow::Result<usize> {
        Ok(self
            .read_all()
            .await?
            .iter()
            .filter(|d| d.content_status == status)
            .count())
    }

    async fn put(&self, document: &Document) -> anyhow::Result<()> {
        let _guard = self.status_lock.lock().await;
        write_json_atomic(&self.document_json_path(&document.id)?, document)
            .await
            .context("write document.json")
    }

    async fn put_if_status(
        &self,
        document: &Document,
        expected: &[ContentStatus],
    ) -> anyhow::Result<bool> {
        let _guard = self.status_lock.lock().await;
        let path = self.document_json_path(&document.id)?;
        let Some(current) = read_json::<Document>(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))?
        else {
            return Ok(false);
        };
        if !expected.contains(&current.content_status) {
            return Ok(false);
        }
        write_json_atomic(&path, document)
            .await
            .context("write document.json")?;
        Ok(true)
    }

    async fn get_content(&self, document_id: &str) -> anyhow::Result<Option<ExtractedContent>> {
        let path = self.content_json_path(document_id)?;
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }

    async fn put_content(&self, content: &ExtractedContent) -> anyhow::Result<()> {
        write_json_atomic(&self.content_json_path(&content.document_id)?, content)
            .await
            .context("write content.json")
    }

    async fn delete_content(&self, document_id: &str) -> anyhow::Result<()> {
        remove_if_exists(&self.content_json_path(document_id)?).await
    }

    async fn get_sections(&self, document_id: &str) -> anyhow::Result<Vec<Section>> {
        let path = self.sections_json_path(document_id)?;
        Ok(read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))?
            .unwrap_or_default())
    }

    async fn replace_sections(
        &self,
        document_id: &str,
        sections: &[Section],
    ) -> anyhow::Result<()> {
        let path = self.sections_json_path(document_id)?;
        remove_if_exists(&path).await?;
        let sections = sections
            .iter()
            .filter(|s| !s.content.trim().is_empty())
            .collect::<Vec<_>>();
        write_json_atomic(&path, &sections)
            .await
            .context("write sections.json")
    }

    async fn delete_sections(&self, document_id: &str) -> anyhow::Result<()> {
        remove_if_exists(&self.sections_json_path(document_id)?).await
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    documents: BTreeMap<String, Document>,
    contents: BTreeMap<String, ExtractedContent>,
    sections: BTreeMap<String, Vec<Section>>,
}

/// Process-local store; every operation is atomic.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    state: RwLock<MemoryState>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, id: &str) -> anyhow::Result<Option<Document>> {
        Ok(self.state.read().await.documents.get(id).cloned())
    }

    async fn list(&self, filter: &DocumentFilter) -> anyhow::Result<Vec<Document>> {
        let state = self.state.read().await;
        Ok(filter.select(state.documents.values().cloned()))
    }

    async fn count(&self, status: ContentStatus) -> anyhow::Result<usize> {
        let state = self.state.read().await;
        Ok(state
            .documents
            .values()
            .filter(|d| d.content_status == status)
            .count())
    }

    async fn put(&self, document: &Document) -> anyhow::Result<()> {
        self.state
            .write()
            .await
            .documents
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn put_if_status(
        &self,
        document: &Document,
        expected: &[ContentStatus],
    ) -> anyhow::Result<bool> {
        let mut state = self.state.write().await;
        let Some(current) = state.documents.get_mut(&document.id) else {
            return Ok(false);
        };
        if !expected.contains(&current.content_status) {
            return Ok(false);
        }
        *current = document.clone();
        Ok(true)
    }

    async fn get_content(&self, document_id: &str) -> anyhow::Result<Option<ExtractedContent>> {
        Ok(self.state.read().await.contents.get(document_id).cloned())
    }

    async fn put_content(&self, content: &ExtractedContent) -> anyhow::Result<()> {
        self.state
            .write()
            .await
            .contents
            .insert(content.document_id.clone(), content.clone());
        Ok(())
    }

    async fn delete_content(&self, document_id: &str) -> anyhow::Result<()> {
        self.state.write().await.contents.remove(document_id);
        Ok(())
    }

    async fn get_sections(&self, document_id: &str) -> anyhow::Result<Vec<Section>> {
        Ok(self
            .state
            .read()
            .await
            .sections
            .get(document_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_sections(
        &self,
        document_id: &str,
        sections: &[Section],
    ) -> anyhow::Result<()> {
        let sections = sections
            .iter()
            .filter(|s| !s.content.trim().is_empty())
            .cloned()
            .collect();
        self.state
            .write()
            .await
            .sections
            .insert(document_id.to_owned(), sections);
        Ok(())
    }

    async fn delete_sections(&self, document_id: &str) -> anyhow::Result<()> {
        self.state.write().await.sections.remove(document_id);
        Ok(())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&bytes).context("parse json")?;
    Ok(Some(value))
}

async fn write_json_atomic<T: serde::Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}

async fn remove_if_exists(path: &Path) -> anyhow::Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove: {}", path.display())),
    }
}
