//! Per-site adapters.
//!
//! An adapter is a pure URL-builder plus payload parser: it knows how
//! to ask one site for a page of results and how to pull candidates
//! out of the response. All network traffic goes through
//! [`RetryingFetcher`](crate::fetch::RetryingFetcher); adapters never
//! touch the wire themselves, which keeps them testable on canned
//! payloads.

mod apec;
mod indeed;
mod linkedin;
mod wttj;

pub use apec::ApecAdapter;
pub use indeed::IndeedAdapter;
pub use linkedin::LinkedInAdapter;
pub use wttj::WttjAdapter;

use regex::Regex;
use url::Url;

use crate::error::ParseError;
use crate::types::record::{RawCandidate, Source};

/// Source-specific query construction and payload parsing.
pub trait SiteAdapter: Send + Sync {
    /// Which site this adapter targets.
    fn source(&self) -> Source;

    /// Build the URL for one page of search results. Pages are
    /// 1-based.
    fn page_url(&self, query: &str, location: &str, page: u32) -> String;

    /// Extract candidates from a fetched payload. An empty vector is
    /// a valid result (no more listings); a [`ParseError`] means the
    /// payload shape was not recognized at all.
    fn parse(&self, body: &str) -> Result<Vec<RawCandidate>, ParseError>;
}

/// Build a search URL with encoded query parameters.
pub(crate) fn search_url(base: &str, params: &[(&str, String)]) -> String {
    match Url::parse_with_params(base, params.iter().map(|(k, v)| (*k, v.as_str()))) {
        Ok(url) => url.to_string(),
        Err(_) => base.to_string(),
    }
}

/// Try patterns in order, returning the first captured group with its
/// tags stripped. The layered-selector approach: sites shuffle class
/// names, so each field has several known shapes.
pub(crate) fn select_first(block: &str, patterns: &[&str]) -> Option<String> {
    for pattern in patterns {
        let re = Regex::new(pattern).expect("invalid selector pattern");
        if let Some(cap) = re.captures(block).and_then(|c| c.get(1)) {
            let text = strip_tags(cap.as_str());
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Remove markup and decode the common HTML entities.
pub(crate) fn strip_tags(html: &str) -> String {
    let tag_pattern = Regex::new(r"<[^>]+>").expect("invalid tag pattern");
    let text = tag_pattern.replace_all(html, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolve a possibly-relative href against a site base.
pub(crate) fn absolute_url(base: &str, href: &str) -> Option<String> {
    if href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
    {
        return None;
    }
    let base = Url::parse(base).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}

/// Shared check that a payload looks like HTML/XML at all.
pub(crate) fn ensure_markup(source: &Source, body: &str) -> Result<(), ParseError> {
    if body.trim().is_empty() || !body.contains('<') {
        return Err(ParseError::new(
            source.id(),
            "payload does not look like markup",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url_encodes_params() {
        let url = search_url(
            "https://example.com/search",
            &[("q", "agent immobilier".to_string()), ("page", "2".to_string())],
        );
        assert_eq!(url, "https://example.com/search?q=agent+immobilier&page=2");
    }

    #[test]
    fn test_select_first_layers_patterns() {
        let block = r#"<span class="companyName">Acme</span>"#;
        let found = select_first(
            block,
            &[
                r#"<div class="company">(.*?)</div>"#,
                r#"<span class="companyName">(.*?)</span>"#,
            ],
        );
        assert_eq!(found.as_deref(), Some("Acme"));
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<b>Agent</b> &amp; broker"), "Agent & broker");
    }

    #[test]
    fn test_absolute_url() {
        assert_eq!(
            absolute_url("https://example.com", "/jobs/1").as_deref(),
            Some("https://example.com/jobs/1")
        );
        assert!(absolute_url("https://example.com", "javascript:void(0)").is_none());
    }
}
