use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{ExtractionError, truncate_chars};

const MAX_STDERR_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterConfig {
    pub bin: String,
    pub extra_args: Vec<String>,
    pub timeout: Duration,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            bin: "marker_single".to_owned(),
            extra_args: Vec::new(),
            timeout: Duration::from_secs(20 * 60),
        }
    }
}

/// Turns a local PDF into Markdown.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, pdf: &Path) -> Result<String, ExtractionError>;
}

/// Runs an external PDF-to-Markdown tool:
/// `<bin> <pdf> --output_dir <tmp> --output_format markdown [extra args]`.
#[derive(Debug, Clone)]
pub struct SubprocessConverter {
    config: ConverterConfig,
}

impl SubprocessConverter {
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Converter for SubprocessConverter {
    async fn convert(&self, pdf: &Path) -> Result<String, ExtractionError> {
        let output_dir = tempfile::tempdir()
            .map_err(|err| ExtractionError::ConversionFailed(format!("create output dir: {err}")))?;

        let mut cmd = Command::new(&self.config.bin);
        cmd.arg(pdf)
            .arg("--output_dir")
            .arg(output_dir.path())
            .args(["--output_format", "markdown"])
            .args(&self.config.extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::info!(
            bin = %self.config.bin,
            pdf = %pdf.display(),
            timeout_secs = self.config.timeout.as_secs(),
            "converter exec"
        );

        let child = cmd.spawn().map_err(|err| {
            ExtractionError::ConversionFailed(format!("spawn {}: {err}", self.config.bin))
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await
        {
            Ok(result) => result.map_err(|err| {
                ExtractionError::ConversionFailed(format!("wait {}: {err}", self.config.bin))
            })?,
            Err(_) => return Err(ExtractionError::ConversionTimeout(self.config.timeout)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::ConversionFailed(format!(
                "{} exited with {}: {}",
                self.config.bin,
                output.status,
                truncate_chars(stderr.trim(), MAX_STDERR_CHARS)
            )));
        }

        let scan_dir = output_dir.path().to_path_buf();
        let markdown_path = tokio::task::spawn_blocking(move || find_first_markdown(&scan_dir))
            .await
            .map_err(|err| ExtractionError::ConversionFailed(format!("join output scan: {err}")))?
            .map_err(|err| ExtractionError::ConversionFailed(format!("scan output dir: {err}")))?
            .ok_or_else(|| {
                ExtractionError::ConversionFailed("no markdown output generated".to_owned())
            })?;

        tokio::fs::read_to_string(&markdown_path)
            .await
            .map_err(|err| {
                ExtractionError::ConversionFailed(format!(
                    "read {}: {err}",
                    markdown_path.display()
                ))
            })
    }
}

/// Depth-first, name-ordered search for the first `*.md` file.
fn find_first_markdown(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            if let Some(found) = find_first_markdown(&path)? {
                return Ok(Some(found));
            }
        } else if path.extension().is_some_and(|ext| ext == "md") {
            return Ok(Some(path));
        }
    }
    Ok(None)
}
