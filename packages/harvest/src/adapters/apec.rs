//! APEC adapter (apec.fr, French executive job board).
//!
//! APEC serves conventional server-rendered cards, which makes it the
//! most reliable of the targeted sites.

use regex::Regex;

use crate::adapters::{absolute_url, ensure_markup, search_url, select_first, SiteAdapter};
use crate::error::ParseError;
use crate::types::record::{RawCandidate, Source};

const BASE_URL: &str = "https://www.apec.fr";
const SEARCH_URL: &str = "https://www.apec.fr/candidat/recherche-emploi.html/emploi";

#[derive(Debug, Default)]
pub struct ApecAdapter;

impl ApecAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl SiteAdapter for ApecAdapter {
    fn source(&self) -> Source {
        Source::Apec
    }

    fn page_url(&self, query: &str, location: &str, page: u32) -> String {
        search_url(
            SEARCH_URL,
            &[
                ("motsCles", query.to_string()),
                ("localisation", location.to_string()),
                ("page", page.saturating_sub(1).to_string()),
            ],
        )
    }

    fn parse(&self, body: &str) -> Result<Vec<RawCandidate>, ParseError> {
        ensure_markup(&self.source(), body)?;

        // Each result is an anchor wrapping a card body.
        let card_pattern =
            Regex::new(r#"(?s)<a[^>]*href="([^"]+)"[^>]*>\s*<div class="card-body.*?</a>"#)
                .expect("invalid card pattern");

        let mut candidates = Vec::new();

        for cap in card_pattern.captures_iter(body) {
            let href = &cap[1];
            let card = &cap[0];

            let title = match select_first(
                card,
                &[
                    r#"(?s)<h2 class="card-title[^"]*"[^>]*>(.*?)</h2>"#,
                    r#"(?s)<h2 class="job-name[^"]*"[^>]*>(.*?)</h2>"#,
                ],
            ) {
                Some(title) => title,
                None => continue,
            };

            let mut candidate = RawCandidate::new(title);

            if let Some(company) = select_first(
                card,
                &[
                    r#"(?s)<div class="card-offer__company[^"]*"[^>]*>(.*?)</div>"#,
                    r#"(?s)<div class="company-name[^"]*"[^>]*>(.*?)</div>"#,
                ],
            ) {
                candidate = candidate.with_company(company);
            }

            if let Some(location) = select_first(
                card,
                &[
                    r#"(?s)<div class="card-offer__location[^"]*"[^>]*>(.*?)</div>"#,
                    r#"(?s)<div class="location[^"]*"[^>]*>(.*?)</div>"#,
                ],
            ) {
                candidate = candidate.with_location(location);
            }

            if let Some(description) = select_first(
                card,
                &[
                    r#"(?s)<div class="card-offer__description[^"]*"[^>]*>(.*?)</div>"#,
                    r#"(?s)<div class="description[^"]*"[^>]*>(.*?)</div>"#,
                ],
            ) {
                candidate = candidate.with_snippet(description);
            }

            if let Some(url) = absolute_url(BASE_URL, href) {
                candidate = candidate.with_url(url);
            }

            candidates.push(candidate);
        }

        Ok(candidates)
    }
}
