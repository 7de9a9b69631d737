//! Run summaries and the human-readable report.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::driver::SourceOutcome;
use crate::types::record::{JobRecord, Source};

/// Per-source slice of a [`RunReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSummary {
    pub source: Source,
    pub pages_fetched: u32,
    pub records_added: usize,
    pub duplicates_rejected: usize,
    /// True when the source ran its full budget (or was abandoned),
    /// i.e. it will be skipped on a recovered run.
    pub completed: bool,
    /// True when the source was skipped because a recovered state
    /// already marked it completed.
    pub recovered: bool,
}

impl SourceSummary {
    pub(crate) fn from_outcome(source: Source, outcome: &SourceOutcome) -> Self {
        Self {
            source,
            pages_fetched: outcome.pages_fetched,
            records_added: outcome.records_added,
            duplicates_rejected: outcome.duplicates_rejected,
            completed: outcome.completed(),
            recovered: false,
        }
    }

    pub(crate) fn skipped(source: Source) -> Self {
        Self {
            source,
            pages_fetched: 0,
            records_added: 0,
            duplicates_rejected: 0,
            completed: true,
            recovered: true,
        }
    }
}

/// What a run produced, returned by the controller and rendered by
/// the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub total_records: usize,
    pub duplicates_rejected: usize,
    pub sources: Vec<SourceSummary>,
    pub elapsed: Duration,
    /// True when the run stopped early (signal or deadline) rather
    /// than finishing every source.
    pub aborted: bool,
}

impl RunReport {
    /// Records contributed during this run (excludes recovered ones).
    pub fn records_added(&self) -> usize {
        self.sources.iter().map(|s| s.records_added).sum()
    }
}

/// Render a text report over the final record set, in the style of a
/// run log: totals, per-source counts, and the most frequent title
/// words.
pub fn render_report(report: &RunReport, records: &[JobRecord]) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "=== Harvest report ===");
    let _ = writeln!(out, "Total records:       {}", report.total_records);
    let _ = writeln!(out, "Added this run:      {}", report.records_added());
    let _ = writeln!(out, "Duplicates rejected: {}", report.duplicates_rejected);
    let _ = writeln!(out, "Elapsed:             {:.1}s", report.elapsed.as_secs_f64());
    if report.aborted {
        let _ = writeln!(out, "Run aborted early; results are partial.");
    }

    let _ = writeln!(out, "\nBy source:");
    for summary in &report.sources {
        let status = if summary.recovered {
            "recovered".to_string()
        } else if summary.completed {
            "completed".to_string()
        } else {
            "partial".to_string()
        };
        let _ = writeln!(
            out,
            "  {:<24} {:>4} added, {:>3} pages ({})",
            summary.source.display_name(),
            summary.records_added,
            summary.pages_fetched,
            status
        );
    }

    let top = top_title_words(records, 10);
    if !top.is_empty() {
        let _ = writeln!(out, "\nTop title keywords:");
        for (word, count) in top {
            let _ = writeln!(out, "  {:<20} {}", word, count);
        }
    }

    out
}

/// Most frequent words across record titles, short stopwords removed.
fn top_title_words(records: &[JobRecord], limit: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for record in records {
        for word in record.title.to_lowercase().split_whitespace() {
            let word: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
            if word.chars().count() < 4 {
                continue;
            }
            *counts.entry(word).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}
