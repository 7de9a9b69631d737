//! LinkedIn adapter.
//!
//! Uses the guest jobs endpoint, which serves card markup without
//! authentication. 25 results per page via the `start` offset.
//! LinkedIn blocks aggressively; the retry layer does the heavy
//! lifting here.

use regex::Regex;

use crate::adapters::{ensure_markup, search_url, select_first, SiteAdapter};
use crate::error::ParseError;
use crate::types::record::{RawCandidate, Source};

const SEARCH_URL: &str =
    "https://www.linkedin.com/jobs-guest/jobs/api/seeMoreJobPostings/search";
const RESULTS_PER_PAGE: u32 = 25;

#[derive(Debug, Default)]
pub struct LinkedInAdapter;

impl LinkedInAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl SiteAdapter for LinkedInAdapter {
    fn source(&self) -> Source {
        Source::LinkedIn
    }

    fn page_url(&self, query: &str, location: &str, page: u32) -> String {
        let start = page.saturating_sub(1) * RESULTS_PER_PAGE;
        search_url(
            SEARCH_URL,
            &[
                ("keywords", query.to_string()),
                ("location", location.to_string()),
                ("start", start.to_string()),
            ],
        )
    }

    fn parse(&self, body: &str) -> Result<Vec<RawCandidate>, ParseError> {
        ensure_markup(&self.source(), body)?;

        let card_pattern = Regex::new(r#"(?s)<div class="[^"]*job-search-card[^"]*".*?</div>\s*</div>"#)
            .expect("invalid card pattern");

        let mut candidates = Vec::new();

        for card in card_pattern.find_iter(body) {
            let card = card.as_str();

            let title = match select_first(
                card,
                &[
                    r#"(?s)<h3 class="[^"]*base-search-card__title[^"]*"[^>]*>(.*?)</h3>"#,
                    r#"(?s)<span class="[^"]*sr-only[^"]*"[^>]*>(.*?)</span>"#,
                ],
            ) {
                Some(title) => title,
                None => continue,
            };

            let mut candidate = RawCandidate::new(title);

            if let Some(company) = select_first(
                card,
                &[r#"(?s)<h4 class="[^"]*base-search-card__subtitle[^"]*"[^>]*>(.*?)</h4>"#],
            ) {
                candidate = candidate.with_company(company);
            }

            if let Some(location) = select_first(
                card,
                &[r#"(?s)<span class="[^"]*job-search-card__location[^"]*"[^>]*>(.*?)</span>"#],
            ) {
                candidate = candidate.with_location(location);
            }

            if let Some(href) = select_first(
                card,
                &[
                    r#"<a[^>]*class="[^"]*base-card__full-link[^"]*"[^>]*href="([^"]+)""#,
                    r#"<a[^>]*href="([^"]+)"[^>]*class="[^"]*base-card__full-link[^"]*""#,
                ],
            ) {
                candidate = candidate.with_url(href);
            }

            candidates.push(candidate);
        }

        Ok(candidates)
    }
}
