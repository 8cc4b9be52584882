use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use manual_extractor::cli::{Cli, Command};
use manual_extractor::commands;
use manual_extractor::config::ExtractorConfig;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    manual_extractor::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    let mut config = ExtractorConfig::from_env().context("load config")?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir.into();
    }

    match cli.command {
        Command::Sections(args) => commands::sections(args).context("sections")?,
        Command::Quality(args) => commands::quality(args).context("quality")?,
        Command::Import(args) => commands::import(args, &config).await.context("import")?,
        Command::Status => commands::status(&config).await.context("status")?,
        Command::Extract(args) => commands::extract(args, &config).await.context("extract")?,
        Command::Watchdog(args) => commands::watchdog(args, &config)
            .await
            .context("watchdog")?,
        Command::Audit(args) => commands::audit(args, &config).await.context("audit")?,
        Command::Requeue(args) => commands::requeue(args, &config).await.context("requeue")?,
        Command::Backfill(args) => commands::backfill(args, &config)
            .await
            .context("backfill")?,
    }

    Ok(())
}
