//! Welcome to the Jungle adapter.
//!
//! WTTJ renders most of its UI client-side, but the search page still
//! ships article cards with stable data-testid hooks that cover the
//! fields we need. Anything beyond that would need JS rendering,
//! which is out of scope.

use regex::Regex;

use crate::adapters::{absolute_url, ensure_markup, search_url, select_first, SiteAdapter};
use crate::error::ParseError;
use crate::types::record::{RawCandidate, Source};

const BASE_URL: &str = "https://www.welcometothejungle.com";
const SEARCH_URL: &str = "https://www.welcometothejungle.com/fr/jobs";

#[derive(Debug, Default)]
pub struct WttjAdapter;

impl WttjAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl SiteAdapter for WttjAdapter {
    fn source(&self) -> Source {
        Source::WelcomeToTheJungle
    }

    fn page_url(&self, query: &str, location: &str, page: u32) -> String {
        search_url(
            SEARCH_URL,
            &[
                ("query", query.to_string()),
                ("page", page.max(1).to_string()),
                ("aroundQuery", location.to_string()),
            ],
        )
    }

    fn parse(&self, body: &str) -> Result<Vec<RawCandidate>, ParseError> {
        ensure_markup(&self.source(), body)?;

        let card_pattern =
            Regex::new(r"(?s)<article[^>]*>.*?</article>").expect("invalid card pattern");

        let mut candidates = Vec::new();

        for card in card_pattern.find_iter(body) {
            let card = card.as_str();

            let title = match select_first(
                card,
                &[
                    r#"(?s)<[^>]*data-testid="job-card-title"[^>]*>(.*?)<"#,
                    r"(?s)<h3[^>]*>(.*?)</h3>",
                ],
            ) {
                Some(title) => title,
                None => continue,
            };

            let mut candidate = RawCandidate::new(title);

            if let Some(company) = select_first(
                card,
                &[
                    r#"(?s)<[^>]*data-testid="job-card-company"[^>]*>(.*?)<"#,
                    r#"(?s)<span class="[^"]*company[^"]*"[^>]*>(.*?)</span>"#,
                ],
            ) {
                candidate = candidate.with_company(company);
            }

            if let Some(location) = select_first(
                card,
                &[
                    r#"(?s)<[^>]*data-testid="job-card-location"[^>]*>(.*?)<"#,
                    r#"(?s)<span class="[^"]*location[^"]*"[^>]*>(.*?)</span>"#,
                ],
            ) {
                candidate = candidate.with_location(location);
            }

            if let Some(href) = first_href(card) {
                if let Some(url) = absolute_url(BASE_URL, &href) {
                    candidate = candidate.with_url(url);
                }
            }

            candidates.push(candidate);
        }

        Ok(candidates)
    }
}

fn first_href(card: &str) -> Option<String> {
    let href_pattern = Regex::new(r#"<a[^>]*href="([^"]+)""#).expect("invalid href pattern");
    href_pattern
        .captures(card)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<div>
<article data-testid="search-results-list-item-wrapper">
  <a href="/fr/companies/acme/jobs/conseiller-immobilier_paris">
    <h3 data-testid="job-card-title">Conseiller immobilier</h3>
  </a>
  <span data-testid="job-card-company">Acme</span>
  <span data-testid="job-card-location">Paris</span>
</article>
<article>
  <a href="https://www.welcometothejungle.com/fr/jobs/xyz"><h3>Property Manager</h3></a>
</article>
</div>"#;

    #[test]
    fn test_page_url() {
        let adapter = WttjAdapter::new();
        let url = adapter.page_url("immobilier", "Paris", 2);
        assert!(url.contains("query=immobilier"));
        assert!(url.contains("page=2"));
        assert!(url.contains("aroundQuery=Paris"));
    }

    #[test]
    fn test_parse_cards() {
        let adapter = WttjAdapter::new();
        let candidates = adapter.parse(PAGE).unwrap();
        assert_eq!(candidates.len(), 2);

        assert_eq!(candidates[0].title, "Conseiller immobilier");
        assert_eq!(candidates[0].company.as_deref(), Some("Acme"));
        assert_eq!(candidates[0].location.as_deref(), Some("Paris"));
        assert_eq!(
            candidates[0].url.as_deref(),
            Some("https://www.welcometothejungle.com/fr/companies/acme/jobs/conseiller-immobilier_paris")
        );

        // h3 fallback, absolute href untouched
        assert_eq!(candidates[1].title, "Property Manager");
        assert_eq!(
            candidates[1].url.as_deref(),
            Some("https://www.welcometothejungle.com/fr/jobs/xyz")
        );
    }
}
