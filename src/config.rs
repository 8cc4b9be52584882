use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context as _;

use crate::app::claim::ClaimStrategy;
use crate::app::state::RetryPolicy;
use crate::converter::ConverterConfig;

const ENV_PREFIX: &str = "MANUAL_EXTRACTOR_";

/// Deployment settings read from `MANUAL_EXTRACTOR_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorConfig {
    pub data_dir: PathBuf,
    pub converter: ConverterConfig,
    pub extraction_method: String,
    pub min_content_chars: usize,
    pub claim_strategy: ClaimStrategy,
    pub retry: RetryPolicy,
    pub download_timeout: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            converter: ConverterConfig::default(),
            extraction_method: "marker-pdf".to_owned(),
            min_content_chars: 1000,
            claim_strategy: ClaimStrategy::default(),
            retry: RetryPolicy::default(),
            download_timeout: Duration::from_secs(300),
        }
    }
}

impl ExtractorConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| {
            lookup(format!("{ENV_PREFIX}{name}").as_str())
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let data_dir = var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir);
        let converter = ConverterConfig {
            bin: var("CONVERTER_BIN").unwrap_or(defaults.converter.bin),
            extra_args: var("CONVERTER_ARGS")
                .map(|raw| raw.split_whitespace().map(str::to_owned).collect())
                .unwrap_or_default(),
            timeout: secs(var("CONVERTER_TIMEOUT_SECS"), "CONVERTER_TIMEOUT_SECS")?
                .unwrap_or(defaults.converter.timeout),
        };
        let extraction_method = var("EXTRACTION_METHOD").unwrap_or(defaults.extraction_method);
        let min_content_chars = parse::<usize>(var("MIN_CONTENT_CHARS"), "MIN_CONTENT_CHARS")?
            .unwrap_or(defaults.min_content_chars);

        let claim_strategy = match var("CLAIM_STRATEGY") {
            Some(raw) => ClaimStrategy::parse(&raw).with_context(|| {
                format!("invalid {ENV_PREFIX}CLAIM_STRATEGY={raw:?}")
            })?,
            None => defaults.claim_strategy,
        };

        let max_attempts = parse::<u32>(var("MAX_ATTEMPTS"), "MAX_ATTEMPTS")?
            .unwrap_or(defaults.retry.max_attempts);
        if max_attempts == 0 {
            anyhow::bail!("{ENV_PREFIX}MAX_ATTEMPTS must be at least 1");
        }
        let retry = RetryPolicy {
            max_attempts,
            backoff: secs(var("RETRY_BACKOFF_SECS"), "RETRY_BACKOFF_SECS")?
                .unwrap_or(defaults.retry.backoff),
        };
        let download_timeout = secs(var("DOWNLOAD_TIMEOUT_SECS"), "DOWNLOAD_TIMEOUT_SECS")?
            .unwrap_or(defaults.download_timeout);

        if converter.timeout.is_zero() {
            anyhow::bail!("{ENV_PREFIX}CONVERTER_TIMEOUT_SECS must be positive");
        }
        if download_timeout.is_zero() {
            anyhow::bail!("{ENV_PREFIX}DOWNLOAD_TIMEOUT_SECS must be positive");
        }

        Ok(Self {
            data_dir,
            converter,
            extraction_method,
            min_content_chars,
            claim_strategy,
            retry,
            download_timeout,
        })
    }
}

fn parse<T>(raw: Option<String>, name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.map(|raw| {
        raw.parse::<T>()
            .with_context(|| format!("invalid {ENV_PREFIX}{name}={raw:?}"))
    })
    .transpose()
}

fn secs(raw: Option<String>, name: &str) -> anyhow::Result<Option<Duration>> {
    Ok(parse::<u64>(raw, name)?.map(Duration::from_secs))
}
