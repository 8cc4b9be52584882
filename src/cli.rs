use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::app::model::ContentStatus;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Store directory (overrides `MANUAL_EXTRACTOR_DATA_DIR`).
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the sections parsed from a Markdown file as JSON.
    Sections(SectionsArgs),
    /// Print the quality report for a Markdown file as JSON.
    Quality(QualityArgs),
    /// Seed documents from a JSON Lines catalog.
    Import(ImportArgs),
    /// Print document counts per extraction status.
    Status,
    /// Claim pending documents and extract them.
    Extract(ExtractArgs),
    /// Reset stuck extractions back to pending.
    Watchdog(WatchdogArgs),
    /// Re-score stored extractions.
    Audit(AuditArgs),
    /// Send failed or extracted documents back to pending.
    Requeue(RequeueArgs),
    /// Regenerate missing sections from stored content.
    Backfill(BackfillArgs),
}

#[derive(Debug, Args)]
pub struct SectionsArgs {
    /// Markdown file to split.
    #[arg(long)]
    pub input: String,
}

#[derive(Debug, Args)]
pub struct QualityArgs {
    /// Markdown file to score.
    #[arg(long)]
    pub input: String,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Path to `catalog.jsonl`.
    #[arg(long)]
    pub catalog: String,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Documents to extract per round.
    #[arg(long, default_value_t = 1)]
    pub limit: usize,

    /// Keep running rounds until nothing is left to claim.
    #[arg(long)]
    pub continuous: bool,

    /// Claim this many documents at once (newest model years first) and run
    /// them on the worker pool. Replaces `--limit` for the round size.
    #[arg(long)]
    pub batch: Option<usize>,

    /// Worker pool size for `--batch`.
    #[arg(long, default_value_t = 2)]
    pub workers: usize,
}

#[derive(Debug, Args)]
pub struct WatchdogArgs {
    /// Claims older than this are considered abandoned.
    #[arg(long, default_value_t = 30)]
    pub stale_minutes: u64,

    /// Seconds between sweeps.
    #[arg(long, default_value_t = 15 * 60)]
    pub interval_secs: u64,

    /// Sweep once and exit.
    #[arg(long)]
    pub once: bool,
}

#[derive(Debug, Args)]
pub struct AuditArgs {
    /// Maximum extracted documents to audit.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Only audit content from this extraction method.
    #[arg(long)]
    pub method: Option<String>,

    /// Re-queue documents that fail the quality gate.
    #[arg(long)]
    pub fix: bool,

    /// With `--fix`, delete stored content and sections before re-queueing.
    #[arg(long, requires = "fix")]
    pub force: bool,

    /// Print every document, not just failures.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RequeueStatus {
    Failed,
    Extracted,
}

impl From<RequeueStatus> for ContentStatus {
    fn from(status: RequeueStatus) -> Self {
        match status {
            RequeueStatus::Failed => ContentStatus::Failed,
            RequeueStatus::Extracted => ContentStatus::Extracted,
        }
    }
}

#[derive(Debug, Args)]
#[command(group = clap::ArgGroup::new("target").required(true).multiple(true))]
pub struct RequeueArgs {
    /// Document id to requeue (repeatable).
    #[arg(long = "id", value_name = "ID", group = "target")]
    pub ids: Vec<String>,

    /// Requeue every document currently in this status.
    #[arg(long, value_enum, group = "target")]
    pub status: Option<RequeueStatus>,

    /// Delete stored content and sections as well. Attempts are always reset.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct BackfillArgs {
    /// Maximum extracted documents to scan.
    #[arg(long)]
    pub limit: Option<usize>,
}
