use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;

use crate::app::audit::{AuditOptions, run_audit};
use crate::app::backfill::backfill_sections;
use crate::app::catalog::{import_catalog, read_catalog};
use crate::app::claim::ClaimStrategy;
use crate::app::document_store::{DocumentFilter, DocumentStore, LocalFsDocumentStore};
use crate::app::lifecycle::JobLifecycle;
use crate::app::model::ContentStatus;
use crate::app::queue::InProcessQueue;
use crate::app::runner::{ExtractionOutcome, ExtractionRunner};
use crate::app::status::StatusCounts;
use crate::app::watchdog::{SweepReport, Watchdog};
use crate::cli::{
    AuditArgs, BackfillArgs, ExtractArgs, ImportArgs, QualityArgs, RequeueArgs, SectionsArgs,
    WatchdogArgs,
};
use crate::config::ExtractorConfig;
use crate::converter::SubprocessConverter;
use crate::quality::{QualityEvaluator, evaluate_quality};
use crate::sections::parse_sections;
use crate::source::SourceFetcher;

fn open_store(config: &ExtractorConfig) -> Arc<dyn DocumentStore> {
    Arc::new(LocalFsDocumentStore::new(&config.data_dir))
}

fn open_lifecycle(config: &ExtractorConfig) -> JobLifecycle {
    JobLifecycle::new(open_store(config), config.retry)
}

fn read_markdown(path: &str) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("read markdown: {path}"))
}

pub fn sections(args: SectionsArgs) -> anyhow::Result<()> {
    let markdown = read_markdown(&args.input)?;
    let sections = parse_sections(&markdown);
    let json = serde_json::to_string_pretty(&sections).context("serialize sections")?;
    println!("{json}");
    Ok(())
}

pub fn quality(args: QualityArgs) -> anyhow::Result<()> {
    let markdown = read_markdown(&args.input)?;
    let report = evaluate_quality(&markdown, &parse_sections(&markdown));
    let json = serde_json::to_string_pretty(&report).context("serialize quality report")?;
    println!("{json}");
    Ok(())
}

pub async fn import(args: ImportArgs, config: &ExtractorConfig) -> anyhow::Result<()> {
    let records = read_catalog(Path::new(&args.catalog))?;
    let store = open_store(config);
    let summary = import_catalog(store.as_ref(), records).await?;
    println!(
        "imported {} documents ({} already present)",
        summary.imported, summary.already_present
    );
    Ok(())
}

pub async fn status(config: &ExtractorConfig) -> anyhow::Result<()> {
    let store = open_store(config);
    let counts = StatusCounts::collect(store.as_ref()).await?;
    println!("{counts}");
    Ok(())
}

#[derive(Debug, Default)]
struct Tally {
    succeeded: usize,
    failed: usize,
}

impl Tally {
    fn record(&mut self, outcome: &ExtractionOutcome) {
        println!("{outcome}");
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "extraction complete: {} succeeded, {} failed",
            self.succeeded, self.failed
        )
    }
}

pub async fn extract(args: ExtractArgs, config: &ExtractorConfig) -> anyhow::Result<()> {
    let lifecycle = open_lifecycle(config);
    let runner = Arc::new(ExtractionRunner::new(
        lifecycle.clone(),
        SourceFetcher::new(config.download_timeout)?,
        Arc::new(SubprocessConverter::new(config.converter.clone())),
        &config.extraction_method,
        config.min_content_chars,
    ));
    tracing::info!(
        strategy = config.claim_strategy.as_str(),
        batch = ?args.batch,
        workers = args.workers,
        continuous = args.continuous,
        "extract"
    );

    let mut tally = Tally::default();
    loop {
        let processed = match args.batch {
            Some(size) => run_batch(&lifecycle, &runner, size, args.workers, &mut tally).await?,
            None => {
                run_sequential(&lifecycle, &runner, args.limit, config.claim_strategy, &mut tally)
                    .await?
            }
        };
        if processed == 0 {
            println!("no pending documents");
            break;
        }
        if !args.continuous {
            break;
        }
    }
    println!("{tally}");
    Ok(())
}

async fn run_sequential(
    lifecycle: &JobLifecycle,
    runner: &ExtractionRunner,
    limit: usize,
    strategy: ClaimStrategy,
    tally: &mut Tally,
) -> anyhow::Result<usize> {
    let mut processed = 0;
    while processed < limit.max(1) {
        let Some(document) = lifecycle.claim_next_pending(strategy).await? else {
            break;
        };
        let outcome = runner.run(&document).await?;
        tally.record(&outcome);
        processed += 1;
    }
    Ok(processed)
}

async fn run_batch(
    lifecycle: &JobLifecycle,
    runner: &Arc<ExtractionRunner>,
    size: usize,
    workers: usize,
    tally: &mut Tally,
) -> anyhow::Result<usize> {
    let claimed = lifecycle.claim_batch(size.max(1)).await?;
    let queue = InProcessQueue::new(workers);
    let handles = claimed
        .into_iter()
        .map(|document| {
            let runner = Arc::clone(runner);
            queue.spawn(async move { runner.run(&document).await })
        })
        .collect::<Vec<_>>();

    let processed = handles.len();
    for handle in handles {
        let outcome = handle.await.context("join extraction task")???;
        tally.record(&outcome);
    }
    Ok(processed)
}

fn print_sweep(report: &SweepReport) {
    for document in &report.reset {
        let action = match document.content_status {
            ContentStatus::Failed => "gave up on",
            _ => "reset",
        };
        println!("{action} {} ({})", document.display_name(), document.id);
    }
    println!("{}", report.counts);
}

pub async fn watchdog(args: WatchdogArgs, config: &ExtractorConfig) -> anyhow::Result<()> {
    let watchdog = Watchdog::new(
        open_lifecycle(config),
        Duration::from_secs(args.stale_minutes.saturating_mul(60)),
        Duration::from_secs(args.interval_secs.max(1)),
    );
    if args.once {
        let report = watchdog.sweep().await?;
        print_sweep(&report);
        return Ok(());
    }

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(?err, "listen for ctrl-c");
        }
    };
    watchdog.run(shutdown, print_sweep).await
}

pub async fn audit(args: AuditArgs, config: &ExtractorConfig) -> anyhow::Result<()> {
    let lifecycle = open_lifecycle(config);
    let options = AuditOptions {
        limit: args.limit,
        method: args.method,
        fix: args.fix,
        force: args.force,
    };
    let summary = run_audit(&lifecycle, &QualityEvaluator::default(), &options).await?;

    let total = summary.entries.len();
    for (idx, entry) in summary.entries.iter().enumerate() {
        if !args.verbose && entry.report.passed {
            continue;
        }
        let verdict = if entry.report.passed { "PASS" } else { "FAIL" };
        println!(
            "[{}/{total}] {verdict} {} ({})",
            idx + 1,
            entry.name,
            entry.document_id
        );
        println!("    method: {}", entry.method);
        println!("    score: {}/100", entry.report.score);
        println!(
            "    content: {} chars, {} sections",
            entry.report.content_length, entry.report.section_count
        );
        for issue in &entry.report.issues {
            println!("    issue: {issue}");
        }
        if args.verbose && !entry.report.garbled_examples.is_empty() {
            let samples = entry.report.garbled_examples.iter().take(3).collect::<Vec<_>>();
            println!("    garbled samples: {samples:?}");
        }
        if entry.requeued {
            println!("    requeued");
        }
    }
    for id in &summary.missing_content {
        println!("[SKIP] {id}: no content found");
    }

    println!(
        "audited {total}: {} passed, {} failed ({:.1}% pass rate)",
        summary.passed(),
        summary.failed(),
        summary.pass_rate()
    );
    for (method, tally) in &summary.by_method {
        println!("  {method}: {} passed, {} failed", tally.passed, tally.failed);
    }
    if args.fix {
        println!("requeued {} documents", summary.requeued());
    }
    Ok(())
}

pub async fn requeue(args: RequeueArgs, config: &ExtractorConfig) -> anyhow::Result<()> {
    let lifecycle = open_lifecycle(config);
    let mut ids = args.ids;
    if let Some(status) = args.status {
        let documents = lifecycle
            .store()
            .list(&DocumentFilter::with_status(status.into()))
            .await
            .context("list documents to requeue")?;
        ids.extend(documents.into_iter().map(|d| d.id));
    }

    let mut requeued = 0;
    for id in &ids {
        if lifecycle
            .requeue(id, args.force)
            .await
            .with_context(|| format!("requeue {id}"))?
        {
            println!("requeued {id}");
            requeued += 1;
        } else {
            println!("[SKIP] {id}: changed while requeueing");
        }
    }
    println!("requeued {requeued} of {} documents", ids.len());
    Ok(())
}

pub async fn backfill(args: BackfillArgs, config: &ExtractorConfig) -> anyhow::Result<()> {
    let store = open_store(config);
    let entries = backfill_sections(store.as_ref(), args.limit).await?;
    for entry in &entries {
        println!("{entry}");
    }
    let done = entries.iter().filter(|e| e.is_done()).count();
    println!(
        "backfill complete: {done} processed, {} skipped",
        entries.len() - done
    );
    Ok(())
}
