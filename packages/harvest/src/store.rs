//! Durable, append-friendly record collection with identity-based
//! deduplication.
//!
//! The store is a pure dedup/persistence primitive: keyword filtering
//! happens in the driver before `add`, never here. Writes go through
//! a temp file plus rename so a crash mid-write can never corrupt the
//! previous valid snapshot.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::RwLock;
use tracing::{debug, info};

use crate::error::{PersistError, PersistResult};
use crate::types::record::{DedupKey, JobRecord, Source};
use crate::types::state::RunState;

/// Outcome of submitting a record to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted,
    Duplicate,
}

struct StoreInner {
    records: Vec<JobRecord>,
    seen: HashSet<DedupKey>,
    sources_completed: std::collections::BTreeSet<Source>,
    duplicates_rejected: usize,
    started_at: chrono::DateTime<chrono::Utc>,
}

/// Shared collection of deduplicated job records.
///
/// Interior mutability so drivers can share one store; `add` is
/// atomic per call, which keeps dedup correct under any interleaving.
pub struct RecordStore {
    inner: RwLock<StoreInner>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    /// Create an empty store for a run starting now.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                records: Vec::new(),
                seen: HashSet::new(),
                sources_completed: std::collections::BTreeSet::new(),
                duplicates_rejected: 0,
                started_at: chrono::Utc::now(),
            }),
        }
    }

    /// Submit a record; O(1) seen-key check plus insert.
    pub fn add(&self, record: JobRecord) -> AddOutcome {
        let key = record.dedup_key();
        let mut inner = self.inner.write().unwrap();

        if !inner.seen.insert(key) {
            inner.duplicates_rejected += 1;
            debug!(
                title = %record.title,
                source = record.source.id(),
                "rejected duplicate record"
            );
            return AddOutcome::Duplicate;
        }

        debug!(title = %record.title, source = record.source.id(), "stored record");
        inner.records.push(record);
        AddOutcome::Inserted
    }

    /// All stored records, in insertion order.
    pub fn records(&self) -> Vec<JobRecord> {
        self.inner.read().unwrap().records.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many submissions were rejected as duplicates.
    pub fn duplicates_rejected(&self) -> usize {
        self.inner.read().unwrap().duplicates_rejected
    }

    /// Mark a source as having finished its full page budget.
    pub fn mark_source_completed(&self, source: Source) {
        self.inner.write().unwrap().sources_completed.insert(source);
    }

    pub fn is_source_completed(&self, source: Source) -> bool {
        self.inner
            .read()
            .unwrap()
            .sources_completed
            .contains(&source)
    }

    /// Snapshot the current state for persistence.
    pub fn snapshot(&self) -> RunState {
        let inner = self.inner.read().unwrap();
        RunState {
            records: inner.records.clone(),
            sources_completed: inner.sources_completed.clone(),
            started_at: inner.started_at,
            last_checkpoint_at: chrono::Utc::now(),
        }
    }

    /// Seed the store from a recovered state. Seen keys are rebuilt
    /// from the records, so recovered duplicates (there should be
    /// none) are dropped rather than resurrected.
    pub fn seed(&self, state: RunState) {
        let mut inner = self.inner.write().unwrap();
        inner.started_at = state.started_at;
        inner.sources_completed = state.sources_completed;
        for record in state.records {
            if inner.seen.insert(record.dedup_key()) {
                inner.records.push(record);
            }
        }
    }

    /// Write the current state to `path` atomically: serialize to a
    /// sibling temp file, then rename over the target.
    pub fn save(&self, path: &Path) -> PersistResult<()> {
        let state = self.snapshot();
        write_state(path, &state)?;
        info!(
            path = %path.display(),
            records = state.records.len(),
            "saved snapshot"
        );
        Ok(())
    }

    /// Load a previously saved state. Absence of the file is not an
    /// error; it simply means there is nothing to recover.
    pub fn load(path: &Path) -> PersistResult<Option<RunState>> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PersistError::Io {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };

        let state: RunState =
            serde_json::from_str(&json).map_err(|e| PersistError::Serde {
                path: path.display().to_string(),
                source: e,
            })?;
        Ok(Some(state))
    }
}

fn write_state(path: &Path, state: &RunState) -> PersistResult<()> {
    let json = serde_json::to_string_pretty(state).map_err(|e| PersistError::Serde {
        path: path.display().to_string(),
        source: e,
    })?;

    let io_err = |e: std::io::Error| PersistError::Io {
        path: path.display().to_string(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    // Temp file lands in the same directory so the rename stays on
    // one filesystem and is atomic.
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp_path).map_err(io_err)?;
        file.write_all(json.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
    }
    fs::rename(&tmp_path, path).map_err(io_err)?;

    Ok(())
}
