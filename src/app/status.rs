use std::collections::BTreeMap;
use std::fmt;

use anyhow::Context as _;
use serde::Serialize;

use crate::app::document_store::DocumentStore;
use crate::app::model::ContentStatus;

/// Number of documents per extraction status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    counts: BTreeMap<ContentStatus, usize>,
}

impl StatusCounts {
    pub async fn collect(store: &dyn DocumentStore) -> anyhow::Result<Self> {
        let mut counts = BTreeMap::new();
        for status in ContentStatus::ALL {
            let n = store
                .count(status)
                .await
                .with_context(|| format!("count {status} documents"))?;
            counts.insert(status, n);
        }
        Ok(Self { counts })
    }

    pub fn get(&self, status: ContentStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

impl fmt::Display for StatusCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for status in ContentStatus::ALL {
            writeln!(f, "{:<11} {}", status.as_str(), self.get(status))?;
        }
        write!(f, "{:<11} {}", "total", self.total())
    }
}
