//! Rotating identity profiles for outgoing requests.
//!
//! Varying the request fingerprint reduces the chance of source-side
//! blocking. Selection is a deterministic round-robin over a small
//! pool with a guaranteed-valid default, so choosing a profile can
//! never fail.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A set of request headers identifying one browser fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
}

impl IdentityProfile {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            accept:
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"
                    .to_string(),
            accept_language: "fr-FR,fr;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
        }
    }
}

impl Default for IdentityProfile {
    /// The fixed fallback profile used when the pool is empty.
    fn default() -> Self {
        Self::new(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
        )
    }
}

/// Round-robin pool of identity profiles.
pub struct IdentityPool {
    profiles: Vec<IdentityProfile>,
    next: AtomicUsize,
}

impl IdentityPool {
    /// Create a pool from the given profiles. An empty pool is valid;
    /// it always yields the default profile.
    pub fn new(profiles: Vec<IdentityProfile>) -> Self {
        Self {
            profiles,
            next: AtomicUsize::new(0),
        }
    }

    /// A small built-in pool of common desktop browser fingerprints.
    pub fn builtin() -> Self {
        Self::new(vec![
            IdentityProfile::default(),
            IdentityProfile::new(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 \
                 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
            ),
            IdentityProfile::new(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
            ),
            IdentityProfile::new(
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            ),
        ])
    }

    /// Select the next profile. Never fails: an empty pool falls back
    /// to the default profile.
    pub fn next_profile(&self) -> IdentityProfile {
        if self.profiles.is_empty() {
            return IdentityProfile::default();
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.profiles.len();
        self.profiles[idx].clone()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for IdentityPool {
    fn default() -> Self {
        Self::builtin()
    }
}
