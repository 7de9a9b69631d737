//! Configuration types for a harvest run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::types::record::Source;

/// Keyword filter applied to candidates before storage.
///
/// Case-insensitive substring match against the candidate's title and
/// description snippet. Exclusions are checked first; an empty include
/// list matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordFilter {
    /// Candidate must match at least one of these (empty = match all)
    #[serde(default)]
    pub include: Vec<String>,

    /// Candidate must match none of these
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl KeywordFilter {
    /// Create a filter that matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require at least one of the given keywords.
    pub fn including(keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            include: keywords.into_iter().map(|k| k.into()).collect(),
            ..Default::default()
        }
    }

    /// Add exclusion keywords.
    pub fn excluding(mut self, keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.exclude
            .extend(keywords.into_iter().map(|k| k.into()));
        self
    }

    /// Check whether the given text passes the filter.
    pub fn matches(&self, text: &str) -> bool {
        let text = text.to_lowercase();

        if self
            .exclude
            .iter()
            .any(|k| text.contains(&k.to_lowercase()))
        {
            return false;
        }

        if self.include.is_empty() {
            return true;
        }

        self.include
            .iter()
            .any(|k| text.contains(&k.to_lowercase()))
    }
}

/// Per-source settings: which site, what to ask it, how many pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source: Source,

    /// Search query text passed to the adapter
    pub query: String,

    /// Override for the global max pages budget
    pub max_pages: Option<u32>,
}

impl SourceConfig {
    pub fn new(source: Source, query: impl Into<String>) -> Self {
        Self {
            source,
            query: query.into(),
            max_pages: None,
        }
    }

    /// Cap this source at a page budget different from the global one.
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = Some(max_pages);
        self
    }
}

/// Effective configuration for one harvest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Sources to run, in order
    pub sources: Vec<SourceConfig>,

    /// Search location appended to queries and used as the default
    /// record location
    pub location: String,

    /// Max pages per source unless overridden
    pub max_pages: u32,

    /// Minimum inter-request delay
    pub min_delay: Duration,

    /// Maximum inter-request delay (must be >= min_delay)
    pub max_delay: Duration,

    /// Wall-clock budget for the whole run
    pub global_timeout: Duration,

    /// Per-request HTTP timeout
    pub request_timeout: Duration,

    /// Retries per page after the first attempt
    pub retry_budget: u32,

    /// Base delay for exponential backoff between retries
    pub retry_base_delay: Duration,

    /// Keyword include/exclude filter
    pub filter: KeywordFilter,

    /// Final output path
    pub output_path: PathBuf,

    /// Crash-recovery backup path
    pub backup_path: PathBuf,

    /// Interval between periodic checkpoints
    pub backup_interval: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            location: "Paris".to_string(),
            max_pages: 5,
            min_delay: Duration::from_millis(1500),
            max_delay: Duration::from_millis(4000),
            global_timeout: Duration::from_secs(300),
            request_timeout: Duration::from_secs(30),
            retry_budget: 3,
            retry_base_delay: Duration::from_secs(1),
            filter: KeywordFilter::default(),
            output_path: PathBuf::from("real_estate_jobs.json"),
            backup_path: PathBuf::from("real_estate_jobs.backup.json"),
            backup_interval: Duration::from_secs(60),
        }
    }
}

impl HarvestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source to run.
    pub fn with_source(mut self, source: SourceConfig) -> Self {
        self.sources.push(source);
        self
    }

    /// Set the search location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Set the per-source page budget.
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Set the inter-request delay range.
    pub fn with_delay_range(mut self, min: Duration, max: Duration) -> Self {
        self.min_delay = min;
        self.max_delay = max.max(min);
        self
    }

    /// Set the wall-clock budget.
    pub fn with_global_timeout(mut self, timeout: Duration) -> Self {
        self.global_timeout = timeout;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the retry budget and backoff base delay.
    pub fn with_retries(mut self, budget: u32, base_delay: Duration) -> Self {
        self.retry_budget = budget;
        self.retry_base_delay = base_delay;
        self
    }

    /// Set the keyword filter.
    pub fn with_filter(mut self, filter: KeywordFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Set the output path. The backup path follows it unless set
    /// explicitly afterwards.
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.backup_path = backup_path_for(&path);
        self.output_path = path;
        self
    }

    /// Set the backup path.
    pub fn with_backup_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.backup_path = path.into();
        self
    }

    /// Set the checkpoint interval.
    pub fn with_backup_interval(mut self, interval: Duration) -> Self {
        self.backup_interval = interval;
        self
    }

    /// Page budget for a given source config.
    pub fn page_budget(&self, source: &SourceConfig) -> u32 {
        source.max_pages.unwrap_or(self.max_pages).max(1)
    }
}

/// Derive a sibling backup path from the output path.
fn backup_path_for(output: &std::path::Path) -> PathBuf {
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("harvest");
    output.with_file_name(format!("{}.backup.json", stem))
}
