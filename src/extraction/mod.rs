//! Two-tier fee extraction.
//!
//! Tables with a recognizable header are read first. Only when no table yields a record is the
//! page's free text scanned. Both tiers deduplicate on `(fee_type, due_date, amount)`.

mod html;
mod table;
mod text;

use std::{
    collections::HashSet,
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use tracing::{debug, warn};

pub use html::HtmlSnapshot;
pub use table::records_from_tables;
pub use text::records_from_text;

use crate::{
    browser::{BrowserDriver, TableMatrix},
    domain::FeeRecord,
};

/// Marker the portal shows when a patent has nothing due.
pub const NO_DATA_MARKER: &str = "暂无数据";

/// Something the engine can read a result page from.
#[async_trait]
pub trait PageContent: Send + Sync {
    async fn tables(&self) -> Vec<TableMatrix>;
    async fn body_text(&self) -> String;
}

/// Live page behind a driver. Read failures look like an empty page.
pub struct DriverPage<'a>(pub &'a dyn BrowserDriver);

#[async_trait]
impl PageContent for DriverPage<'_> {
    async fn tables(&self) -> Vec<TableMatrix> {
        self.0.tables().await.unwrap_or_else(|err| {
            warn!(target: "extract", error = %err, "reading tables failed");
            Vec::new()
        })
    }

    async fn body_text(&self) -> String {
        self.0.text_content().await.unwrap_or_else(|err| {
            warn!(target: "extract", error = %err, "reading body text failed");
            String::new()
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Structured,
    Heuristic,
    Empty,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub records: Vec<FeeRecord>,
    pub tier: Tier,
}

#[derive(Debug, Default)]
pub struct ExtractionEngine {
    degraded: AtomicU64,
}

impl ExtractionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn extract(&self, page: &dyn PageContent) -> Extraction {
        let tables = page.tables().await;
        let structured = dedup(records_from_tables(&tables));
        if !structured.is_empty() {
            debug!(target: "extract", count = structured.len(), "structured tier matched");
            return Extraction {
                records: structured,
                tier: Tier::Structured,
            };
        }

        let body = page.body_text().await;
        let heuristic = dedup(records_from_text(&body));
        if !heuristic.is_empty() {
            debug!(target: "extract", count = heuristic.len(), "heuristic tier matched");
            return Extraction {
                records: heuristic,
                tier: Tier::Heuristic,
            };
        }

        let had_content = !tables.is_empty() || !body.trim().is_empty();
        if had_content && !body.contains(NO_DATA_MARKER) {
            let total = self.degraded.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                target: "extract",
                tables = tables.len(),
                body_chars = body.chars().count(),
                degraded_total = total,
                "page had content but neither tier matched; layout may have changed"
            );
        }
        Extraction {
            records: Vec::new(),
            tier: Tier::Empty,
        }
    }

    /// Extractions that came back empty from a page that was not an explicit "no data" page.
    pub fn degraded_count(&self) -> u64 {
        self.degraded.load(Ordering::Relaxed)
    }
}

/// Keeps the first record per extraction key.
pub fn dedup(records: Vec<FeeRecord>) -> Vec<FeeRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| {
            let (fee_type, due_date, amount) = record.extraction_key();
            seen.insert((fee_type.to_string(), due_date.to_string(), amount.to_string()))
        })
        .collect()
}
