//! Job record types and the deduplication key.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// The job sites this harvester knows how to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Source {
    Indeed,
    Apec,
    LinkedIn,
    WelcomeToTheJungle,
    /// Scripted source used by mock adapters in tests
    Mock,
}

impl Source {
    /// Stable lowercase identifier used in logs and snapshots.
    pub fn id(&self) -> &'static str {
        match self {
            Source::Indeed => "indeed",
            Source::Apec => "apec",
            Source::LinkedIn => "linkedin",
            Source::WelcomeToTheJungle => "wttj",
            Source::Mock => "mock",
        }
    }

    /// Human-readable site name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Source::Indeed => "Indeed",
            Source::Apec => "APEC",
            Source::LinkedIn => "LinkedIn",
            Source::WelcomeToTheJungle => "Welcome to the Jungle",
            Source::Mock => "Mock",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A raw, not-yet-deduplicated listing extracted from a page.
///
/// Adapters produce these on a best-effort basis; every field except
/// the title may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCandidate {
    pub title: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub posted_date: Option<NaiveDate>,
    pub snippet: Option<String>,
}

impl RawCandidate {
    /// Create a candidate with just a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the company name.
    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    /// Set the listing location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the canonical listing URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the posting date.
    pub fn with_posted_date(mut self, date: NaiveDate) -> Self {
        self.posted_date = Some(date);
        self
    }

    /// Set the description snippet.
    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    /// Title + snippet text used for keyword filtering.
    pub fn filter_text(&self) -> String {
        match &self.snippet {
            Some(snippet) => format!("{} {}", self.title, snippet),
            None => self.title.clone(),
        }
    }
}

/// One discovered listing, normalized and ready for storage.
///
/// Append-only: never mutated after insertion into the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub source: Source,
    pub title: String,
    pub company: Option<String>,
    pub location: String,
    pub url: Option<String>,
    pub posted_date: Option<NaiveDate>,
    pub description_snippet: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl JobRecord {
    /// Normalize a raw candidate into a record.
    ///
    /// Returns `None` when the candidate has no usable title, matching
    /// the skip behavior for nameless listings. `default_location` is
    /// the configured search location, used when the page carried none.
    pub fn from_candidate(
        source: Source,
        candidate: RawCandidate,
        default_location: &str,
    ) -> Option<Self> {
        let title = collapse_whitespace(&candidate.title);
        if title.is_empty() || title.eq_ignore_ascii_case("unknown") {
            return None;
        }

        let company = candidate
            .company
            .map(|c| collapse_whitespace(&c))
            .filter(|c| !c.is_empty());
        let location = candidate
            .location
            .map(|l| collapse_whitespace(&l))
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| default_location.to_string());
        let url = candidate.url.as_deref().and_then(canonicalize_url);

        Some(Self {
            source,
            title,
            company,
            location,
            url,
            posted_date: candidate.posted_date,
            description_snippet: candidate
                .snippet
                .map(|s| collapse_whitespace(&s))
                .filter(|s| !s.is_empty()),
            fetched_at: Utc::now(),
        })
    }

    /// The identity used to decide whether two records are the same
    /// listing: the canonical URL when present, else the normalized
    /// (title, company) pair.
    pub fn dedup_key(&self) -> DedupKey {
        match &self.url {
            Some(url) => DedupKey::Url(url.clone()),
            None => DedupKey::TitleCompany {
                title: normalize_for_key(&self.title),
                company: normalize_for_key(self.company.as_deref().unwrap_or("")),
            },
        }
    }
}

/// Deduplication identity for a [`JobRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DedupKey {
    Url(String),
    TitleCompany { title: String, company: String },
}

/// Collapse runs of whitespace and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize text for the fallback dedup key: lowercase, punctuation
/// stripped, whitespace collapsed. No truncation.
pub fn normalize_for_key(s: &str) -> String {
    let lowered: String = s
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    collapse_whitespace(&lowered)
}

/// Canonicalize a listing URL: drop the fragment, drop `utm_*`
/// tracking params, trim the trailing slash on non-root paths.
///
/// Returns `None` when the input is not an absolute http(s) URL, so a
/// junk href never becomes a dedup key.
pub fn canonicalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !k.starts_with("utm_"))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    let mut out = url.to_string();
    if url.path() != "/" && url.query().is_none() && out.ends_with('/') {
        out.pop();
    }
    Some(out)
}
