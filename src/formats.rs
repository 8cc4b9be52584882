use serde::{Deserialize, Serialize};

/// Longest section title kept after sanitization.
pub const MAX_TITLE_CHARS: usize = 200;

/// One titled fragment of a document's Markdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub path: String,
    pub title: String,
    pub depth: u32,
    pub sort_order: u32,
    pub content: String,
    pub char_count: usize,
    pub word_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl Section {
    /// Builds a section and derives its counts. Fails on an empty path.
    pub fn new(
        path: impl Into<String>,
        title: impl Into<String>,
        depth: u32,
        sort_order: u32,
        content: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let path = path.into();
        if path.trim().is_empty() {
            anyhow::bail!("section path must not be empty");
        }
        Ok(Self::from_parts(path, title.into(), depth, sort_order, content.into()))
    }

    pub(crate) fn from_parts(
        path: String,
        title: String,
        depth: u32,
        sort_order: u32,
        content: String,
    ) -> Self {
        Self {
            char_count: content.chars().count(),
            word_count: content.split_whitespace().count(),
            keywords: crate::sections::extract_keywords(&content, &title),
            path,
            title,
            depth,
            sort_order,
            content,
        }
    }

    /// Rough token estimate (four characters per token).
    pub fn approximate_tokens(&self) -> usize {
        self.char_count / 4
    }

    pub fn toc_entry(&self) -> TocEntry {
        TocEntry {
            path: self.path.clone(),
            title: self.title.clone(),
            depth: self.depth,
            approximate_size: self.approximate_tokens(),
        }
    }
}

/// One line of a document's table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub path: String,
    pub title: String,
    pub depth: u32,
    pub approximate_size: usize,
}

pub fn table_of_contents(sections: &[Section]) -> Vec<TocEntry> {
    sections.iter().map(Section::toc_entry).collect()
}

/// One line of an import catalog (`catalog.jsonl`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub year: u16,
    pub make: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub source: String,
}
