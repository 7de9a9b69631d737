//! Indeed France adapter.
//!
//! Uses the RSS feed rather than the HTML search results; the feed is
//! far less aggressively protected and carries the same listings.
//! Feed items title their entries `Job Title - Company`.

use chrono::DateTime;
use regex::Regex;

use crate::adapters::{ensure_markup, search_url, strip_tags, SiteAdapter};
use crate::error::ParseError;
use crate::types::record::{RawCandidate, Source};

const FEED_URL: &str = "https://fr.indeed.com/rss";
const RESULTS_PER_PAGE: u32 = 10;

#[derive(Debug, Default)]
pub struct IndeedAdapter;

impl IndeedAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl SiteAdapter for IndeedAdapter {
    fn source(&self) -> Source {
        Source::Indeed
    }

    fn page_url(&self, query: &str, location: &str, page: u32) -> String {
        let start = page.saturating_sub(1) * RESULTS_PER_PAGE;
        search_url(
            FEED_URL,
            &[
                ("q", query.to_string()),
                ("l", location.to_string()),
                ("start", start.to_string()),
            ],
        )
    }

    fn parse(&self, body: &str) -> Result<Vec<RawCandidate>, ParseError> {
        ensure_markup(&self.source(), body)?;

        let item_pattern = Regex::new(r"(?s)<item>(.*?)</item>").expect("invalid item pattern");
        let title_pattern = Regex::new(r"(?s)<title>(.*?)</title>").expect("invalid title pattern");
        let link_pattern = Regex::new(r"(?s)<link>(.*?)</link>").expect("invalid link pattern");
        let desc_pattern =
            Regex::new(r"(?s)<description>(.*?)</description>").expect("invalid desc pattern");
        let date_pattern =
            Regex::new(r"(?s)<pubDate>(.*?)</pubDate>").expect("invalid date pattern");

        let mut candidates = Vec::new();

        for item in item_pattern.captures_iter(body) {
            let item = &item[1];

            let raw_title = match title_pattern.captures(item).and_then(|c| c.get(1)) {
                Some(m) => strip_cdata(m.as_str()),
                None => continue,
            };

            // Feed convention: "Job Title - Company"
            let (title, company) = match raw_title.split_once(" - ") {
                Some((t, c)) => (strip_tags(t), Some(strip_tags(c))),
                None => (strip_tags(&raw_title), None),
            };

            let mut candidate = RawCandidate::new(title);
            if let Some(company) = company.filter(|c| !c.is_empty()) {
                candidate = candidate.with_company(company);
            }

            if let Some(link) = link_pattern.captures(item).and_then(|c| c.get(1)) {
                let link = strip_cdata(link.as_str());
                let link = link.trim();
                if !link.is_empty() {
                    candidate = candidate.with_url(link);
                }
            }

            if let Some(desc) = desc_pattern.captures(item).and_then(|c| c.get(1)) {
                let desc = strip_tags(&strip_cdata(desc.as_str()));
                if !desc.is_empty() {
                    candidate = candidate.with_snippet(desc);
                }
            }

            if let Some(date) = date_pattern.captures(item).and_then(|c| c.get(1)) {
                if let Ok(parsed) = DateTime::parse_from_rfc2822(date.as_str().trim()) {
                    candidate = candidate.with_posted_date(parsed.date_naive());
                }
            }

            candidates.push(candidate);
        }

        Ok(candidates)
    }
}

/// Unwrap a `<![CDATA[..]]>` section if present.
fn strip_cdata(text: &str) -> String {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|t| t.strip_suffix("]]>"))
        .unwrap_or(trimmed)
        .to_string()
}
