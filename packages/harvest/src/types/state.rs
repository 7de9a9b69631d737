//! Crash-recovery snapshot of an in-progress run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::record::{JobRecord, Source};

/// Serialized run state written at every checkpoint and exit path.
///
/// A `RunState` loaded from disk is a consistent prefix of a completed
/// run: reloading it never drops already-collected records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Collected records, in insertion order
    pub records: Vec<JobRecord>,

    /// Sources that finished their full page budget
    #[serde(default)]
    pub sources_completed: BTreeSet<Source>,

    pub started_at: DateTime<Utc>,

    pub last_checkpoint_at: DateTime<Utc>,
}

impl RunState {
    /// Create an empty state for a run starting now.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            records: Vec::new(),
            sources_completed: BTreeSet::new(),
            started_at: now,
            last_checkpoint_at: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.sources_completed.is_empty()
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
