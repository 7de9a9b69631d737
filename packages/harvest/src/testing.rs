//! Testing utilities including mock implementations.
//!
//! These let the driver and controller be exercised without a network:
//! [`MockTransport`] scripts per-URL fetch outcomes, [`MockAdapter`]
//! parses JSON-encoded candidate payloads.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use crate::adapters::SiteAdapter;
use crate::error::{FetchError, FetchResult, ParseError};
use crate::fetch::Transport;
use crate::identity::IdentityProfile;
use crate::types::record::{RawCandidate, Source};

/// Record of one call made to a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct TransportCall {
    pub url: String,
    pub user_agent: String,
}

/// A scripted transport for testing.
///
/// Outcomes are looked up per URL: a FIFO script takes precedence,
/// then a fixed body. Unknown URLs fail with a transient error so
/// retry paths are exercised by default. Clones share state, so a
/// test can keep a handle for inspecting calls after handing the
/// transport off.
#[derive(Default, Clone)]
pub struct MockTransport {
    bodies: Arc<RwLock<HashMap<String, String>>>,
    scripts: Arc<RwLock<HashMap<String, VecDeque<FetchResult<String>>>>>,
    calls: Arc<RwLock<Vec<TransportCall>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always return this body for the given URL.
    pub fn with_body(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.bodies.write().unwrap().insert(url.into(), body.into());
        self
    }

    /// Script a sequence of outcomes for the given URL; once the
    /// script is drained, lookup falls back to `with_body`.
    pub fn with_script(self, url: impl Into<String>, outcomes: Vec<FetchResult<String>>) -> Self {
        self.scripts
            .write()
            .unwrap()
            .insert(url.into(), outcomes.into());
        self
    }

    /// All calls made to this transport.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.read().unwrap().clone()
    }

    /// Number of calls whose URL contains the given fragment.
    pub fn calls_matching(&self, fragment: &str) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.url.contains(fragment))
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str, profile: &IdentityProfile) -> FetchResult<String> {
        self.calls.write().unwrap().push(TransportCall {
            url: url.to_string(),
            user_agent: profile.user_agent.clone(),
        });

        if let Some(script) = self.scripts.write().unwrap().get_mut(url) {
            if let Some(outcome) = script.pop_front() {
                return outcome;
            }
        }

        if let Some(body) = self.bodies.read().unwrap().get(url) {
            return Ok(body.clone());
        }

        Err(FetchError::Transient {
            reason: format!("no scripted response for {}", url),
        })
    }
}

/// A mock site adapter whose payloads are JSON arrays of
/// [`RawCandidate`]s.
///
/// Pair it with a [`MockTransport`] that serves
/// [`candidates_payload`] bodies at the URLs [`MockAdapter::page_url`]
/// produces.
pub struct MockAdapter {
    source: Source,
    name: String,
}

impl MockAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            source: Source::Mock,
            name: name.into(),
        }
    }

    /// Report a different source (for multi-source tests).
    pub fn with_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }
}

impl SiteAdapter for MockAdapter {
    fn source(&self) -> Source {
        self.source
    }

    fn page_url(&self, query: &str, _location: &str, page: u32) -> String {
        format!("mock://{}/{}/page/{}", self.name, query, page)
    }

    fn parse(&self, body: &str) -> Result<Vec<RawCandidate>, ParseError> {
        serde_json::from_str(body).map_err(|e| ParseError::new(self.name.clone(), e.to_string()))
    }
}

/// Encode candidates as a payload a [`MockAdapter`] can parse.
pub fn candidates_payload(candidates: &[RawCandidate]) -> String {
    serde_json::to_string(candidates).expect("candidates always serialize")
}
