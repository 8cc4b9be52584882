use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::formats::{CatalogRecord, Section, TocEntry, table_of_contents};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Pending,
    Extracting,
    Extracted,
    Failed,
}

impl ContentStatus {
    pub const ALL: [ContentStatus; 4] = [
        ContentStatus::Pending,
        ContentStatus::Extracting,
        ContentStatus::Extracted,
        ContentStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Extracting => "extracting",
            Self::Extracted => "extracted",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentStatus {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "extracting" => Ok(Self::Extracting),
            "extracted" => Ok(Self::Extracted),
            "failed" => Ok(Self::Failed),
            other => anyhow::bail!("unsupported content status: {other}"),
        }
    }
}

/// One catalogued source PDF.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub year: u16,
    pub make: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub source: String,

    pub content_status: ContentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub attempts: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// A fresh `pending` document. Fails on an empty id or source.
    pub fn new(
        id: impl Into<String>,
        year: u16,
        make: impl Into<String>,
        model: impl Into<String>,
        source: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let id = id.into();
        let source = source.into();
        if id.trim().is_empty() {
            anyhow::bail!("document id must not be empty");
        }
        if source.trim().is_empty() {
            anyhow::bail!("document source must not be empty: {id}");
        }
        Ok(Self {
            id,
            year,
            make: make.into(),
            model: model.into(),
            variant: None,
            source,
            content_status: ContentStatus::Pending,
            error_message: None,
            attempts: 0,
            claimed_at: None,
            extracted_at: None,
            updated_at: Utc::now(),
        })
    }

    pub fn from_catalog(record: CatalogRecord) -> anyhow::Result<Self> {
        let id = match record.id {
            Some(id) => id,
            None => document_id_from_source(&record.source),
        };
        let mut document = Self::new(id, record.year, record.make, record.model, record.source)?;
        document.variant = record.variant.filter(|v| !v.trim().is_empty());
        Ok(document)
    }

    /// `"<year> <make> <model>[ <variant>]"`.
    pub fn display_name(&self) -> String {
        match self.variant.as_deref() {
            Some(variant) => format!("{} {} {} {variant}", self.year, self.make, self.model),
            None => format!("{} {} {}", self.year, self.make, self.model),
        }
    }

    /// When the current claim started; falls back to the last update.
    pub fn claim_started_at(&self) -> DateTime<Utc> {
        self.claimed_at.unwrap_or(self.updated_at)
    }
}

fn document_id_from_source(source: &str) -> String {
    use sha2::Digest as _;
    let mut hasher = sha2::Sha256::new();
    hasher.update(source.trim().as_bytes());
    let digest = hasher.finalize();
    format!("m_{}", &hex::encode(digest)[..16])
}

/// The full Markdown of one document plus derived metrics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedContent {
    pub document_id: String,
    pub content_markdown: String,
    pub char_count: usize,
    pub word_count: usize,
    pub token_count: usize,
    pub extraction_method: String,
    pub table_of_contents: Vec<TocEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<u32>,
    pub extracted_at: DateTime<Utc>,
}

impl ExtractedContent {
    pub fn new(
        document_id: impl Into<String>,
        content_markdown: impl Into<String>,
        extraction_method: impl Into<String>,
        sections: &[Section],
    ) -> Self {
        let content_markdown = content_markdown.into();
        let char_count = content_markdown.chars().count();
        Self {
            document_id: document_id.into(),
            word_count: content_markdown.split_whitespace().count(),
            token_count: char_count / 4,
            char_count,
            content_markdown,
            extraction_method: extraction_method.into(),
            table_of_contents: table_of_contents(sections),
            quality_score: None,
            extracted_at: Utc::now(),
        }
    }

    pub fn with_quality_score(mut self, score: u32) -> Self {
        self.quality_score = Some(score);
        self
    }
}
