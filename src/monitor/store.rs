use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::urgency::{classify, Urgency, UrgencyTier};
use crate::domain::FeeRecord;

const ADDED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("watch-list I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("watch-list at {path} is not a JSON array of fee records: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A watched fee record and when it was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorEntry {
    #[serde(flatten)]
    pub record: FeeRecord,
    #[serde(rename = "addedAt", alias = "添加时间", default)]
    pub added_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedFee {
    /// Storage position, as accepted by [`MonitorStore::remove`].
    pub position: usize,
    pub entry: MonitorEntry,
    pub urgency: Urgency,
}

/// Persisted, deduplicated watch-list.
///
/// Every mutation rewrites the whole file. A failed write leaves memory ahead of disk until
/// [`MonitorStore::flush`] (or any later mutation) succeeds. Retry with `flush`, never by
/// repeating a positional [`MonitorStore::remove`].
pub struct MonitorStore {
    path: PathBuf,
    entries: Vec<MonitorEntry>,
    timezone: Tz,
    dirty: bool,
}

impl MonitorStore {
    /// Loads the list at `path`; a missing file is an empty list.
    pub fn open(path: impl Into<PathBuf>, timezone: Tz) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => Vec::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| StoreError::Format {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        debug!(target: "monitor", path = %path.display(), count = entries.len(), "watch-list loaded");
        Ok(Self {
            path,
            entries,
            timezone,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[MonitorEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, record: &FeeRecord) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.record.monitor_key() == record.monitor_key())
    }

    /// Whether memory holds changes the last write failed to store.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Rewrites the file if an earlier write failed; `true` when a write happened.
    pub fn flush(&mut self) -> Result<bool, StoreError> {
        if !self.dirty {
            return Ok(false);
        }
        self.persist()?;
        info!(target: "monitor", count = self.entries.len(), "pending watch-list written");
        Ok(true)
    }

    /// Returns `false` when `(patent_number, fee_type)` is already watched. The list is left
    /// as is, but pending changes from a failed write are flushed.
    pub fn add(&mut self, record: FeeRecord) -> Result<bool, StoreError> {
        if self.contains(&record) {
            debug!(
                target: "monitor",
                patent = %record.patent_number,
                fee_type = %record.fee_type,
                "already watched"
            );
            self.flush()?;
            return Ok(false);
        }
        let added_at = Utc::now()
            .with_timezone(&self.timezone)
            .format(ADDED_AT_FORMAT)
            .to_string();
        info!(
            target: "monitor",
            patent = %record.patent_number,
            fee_type = %record.fee_type,
            due = %record.due_date,
            "added to watch-list"
        );
        self.entries.push(MonitorEntry { record, added_at });
        self.persist()?;
        Ok(true)
    }

    /// Removes by storage position; `false` when out of bounds. Not safe to repeat after a
    /// failed write: positions shift, so use [`MonitorStore::flush`] instead.
    pub fn remove(&mut self, position: usize) -> Result<bool, StoreError> {
        if position >= self.entries.len() {
            return Ok(false);
        }
        let removed = self.entries.remove(position);
        info!(
            target: "monitor",
            patent = %removed.record.patent_number,
            fee_type = %removed.record.fee_type,
            "removed from watch-list"
        );
        self.persist()?;
        Ok(true)
    }

    /// Empties the list and returns how many entries were dropped.
    pub fn clear(&mut self) -> Result<usize, StoreError> {
        let count = self.entries.len();
        self.entries.clear();
        self.persist()?;
        info!(target: "monitor", count, "watch-list cleared");
        Ok(count)
    }

    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    pub fn list_with_urgency(&self) -> Vec<ClassifiedFee> {
        self.list_with_urgency_on(self.today())
    }

    /// Classified view ordered by tier rank, then due date with undated entries last.
    pub fn list_with_urgency_on(&self, today: NaiveDate) -> Vec<ClassifiedFee> {
        let mut view: Vec<ClassifiedFee> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| ClassifiedFee {
                position,
                urgency: classify(
                    entry.record.due(),
                    entry.record.legal_status.as_deref(),
                    today,
                ),
                entry: entry.clone(),
            })
            .collect();
        view.sort_by_key(|item| {
            (
                item.urgency.tier,
                item.entry.record.due().unwrap_or(NaiveDate::MAX),
            )
        });
        view
    }

    pub fn tier_counts_on(&self, today: NaiveDate) -> BTreeMap<UrgencyTier, usize> {
        let mut counts = BTreeMap::new();
        for item in self.list_with_urgency_on(today) {
            *counts.entry(item.urgency.tier).or_insert(0) += 1;
        }
        counts
    }

    pub fn tier_counts(&self) -> BTreeMap<UrgencyTier, usize> {
        self.tier_counts_on(self.today())
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        self.dirty = true;
        self.write_file()?;
        self.dirty = false;
        Ok(())
    }

    fn write_file(&self) -> Result<(), StoreError> {
        let body = serde_json::to_string_pretty(&self.entries).map_err(|source| {
            StoreError::Format {
                path: self.path.clone(),
                source,
            }
        })?;
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, body).map_err(io_err)?;
        fs::rename(&staging, &self.path).map_err(io_err)?;
        Ok(())
    }
}
