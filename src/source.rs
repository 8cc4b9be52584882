use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use url::Url;

use crate::error::ExtractionError;

/// Where a document's PDF lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Remote(Url),
    Local(PathBuf),
}

impl SourceLocation {
    /// `http(s)://` locators are remote, `file://` URLs and everything else
    /// are treated as local paths.
    pub fn classify(source: &str) -> Self {
        let source = source.trim();
        if let Ok(url) = Url::parse(source) {
            match url.scheme() {
                "http" | "https" => return Self::Remote(url),
                "file" => {
                    if let Ok(path) = url.to_file_path() {
                        return Self::Local(path);
                    }
                }
                _ => {}
            }
        }
        Self::Local(PathBuf::from(source))
    }
}

/// A PDF ready for conversion. Downloaded files live in a scratch directory
/// that is removed when this value is dropped.
#[derive(Debug)]
pub struct FetchedSource {
    path: PathBuf,
    _scratch: Option<TempDir>,
}

impl FetchedSource {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Clone)]
pub struct SourceFetcher {
    client: reqwest::Client,
}

impl SourceFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|err| anyhow::anyhow!("build download http client: {err}"))?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, source: &str) -> Result<FetchedSource, ExtractionError> {
        match SourceLocation::classify(source) {
            SourceLocation::Remote(url) => self.download(&url).await,
            SourceLocation::Local(path) => {
                let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
                if !exists {
                    return Err(ExtractionError::SourceUnavailable(format!(
                        "not found: {}",
                        path.display()
                    )));
                }
                Ok(FetchedSource {
                    path,
                    _scratch: None,
                })
            }
        }
    }

    async fn download(&self, url: &Url) -> Result<FetchedSource, ExtractionError> {
        let unavailable =
            |err: reqwest::Error| ExtractionError::SourceUnavailable(format!("GET {url}: {err}"));

        tracing::info!(%url, "download source");
        let bytes = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?
            .bytes()
            .await
            .map_err(unavailable)?;
        if bytes.is_empty() {
            return Err(ExtractionError::SourceUnavailable(format!(
                "GET {url}: empty body"
            )));
        }

        let scratch = tempfile::tempdir().map_err(|err| {
            ExtractionError::SourceUnavailable(format!("create download dir: {err}"))
        })?;
        let path = scratch.path().join("source.pdf");
        tokio::fs::write(&path, &bytes).await.map_err(|err| {
            ExtractionError::SourceUnavailable(format!("write {}: {err}", path.display()))
        })?;
        tracing::debug!(%url, bytes = bytes.len(), "source downloaded");

        Ok(FetchedSource {
            path,
            _scratch: Some(scratch),
        })
    }
}
