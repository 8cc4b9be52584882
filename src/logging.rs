use anyhow::Context as _;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Logs go to stderr; stdout is reserved for command output.
pub fn init() -> anyhow::Result<()> {
    let filter = filter_from_env(DEFAULT_FILTER)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}

/// `RUST_LOG` when set and valid, otherwise `default`.
fn filter_from_env(default: &str) -> anyhow::Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .with_context(|| format!("build log filter from {default:?}"))
}
