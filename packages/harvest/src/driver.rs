//! Per-source pagination loop.
//!
//! Drives one adapter through its page budget: fetch, parse, filter,
//! normalize, store. Page-level failures are absorbed here: one bad
//! page never aborts a source, but three consecutive failed pages do,
//! as the site is then likely blocking us or out of results.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::SiteAdapter;
use crate::fetch::{RetryingFetcher, Transport};
use crate::store::{AddOutcome, RecordStore};
use crate::types::config::{HarvestConfig, SourceConfig};
use crate::types::record::JobRecord;

/// Consecutive failed pages before a source is abandoned early.
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Why a source loop stopped. All of these are normal termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Full page budget processed
    PageBudget,
    /// Abandoned early after consecutive page failures
    ConsecutiveFailures,
    /// Global or per-source deadline reached
    Deadline,
    /// Run cancelled by signal
    Cancelled,
}

/// Partial or complete result of running one source.
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub pages_fetched: u32,
    pub records_added: usize,
    pub duplicates_rejected: usize,
    pub stopped: StopReason,
}

impl SourceOutcome {
    /// Whether the source ran its full budget and can be skipped on a
    /// recovered run.
    pub fn completed(&self) -> bool {
        matches!(
            self.stopped,
            StopReason::PageBudget | StopReason::ConsecutiveFailures
        )
    }
}

/// Pagination/query loop for a single source.
pub struct SourceDriver<'a, T: Transport> {
    fetcher: &'a RetryingFetcher<T>,
    config: &'a HarvestConfig,
}

impl<'a, T: Transport> SourceDriver<'a, T> {
    pub fn new(fetcher: &'a RetryingFetcher<T>, config: &'a HarvestConfig) -> Self {
        Self { fetcher, config }
    }

    /// Run the source until its page budget, the deadline, or
    /// abandonment. Returns a partial result rather than an error on
    /// every stop path.
    pub async fn run(
        &self,
        adapter: &dyn SiteAdapter,
        source: &SourceConfig,
        store: &RecordStore,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> SourceOutcome {
        let budget = self.config.page_budget(source);
        let source_id = adapter.source().id();

        info!(
            source = source_id,
            query = %source.query,
            pages = budget,
            "starting source"
        );

        let mut outcome = SourceOutcome {
            pages_fetched: 0,
            records_added: 0,
            duplicates_rejected: 0,
            stopped: StopReason::PageBudget,
        };
        let mut consecutive_failures = 0u32;

        for page in 1..=budget {
            if cancel.is_cancelled() {
                outcome.stopped = StopReason::Cancelled;
                break;
            }
            if Instant::now() >= deadline {
                info!(source = source_id, page, "deadline reached, stopping source");
                outcome.stopped = StopReason::Deadline;
                break;
            }

            let url = adapter.page_url(&source.query, &self.config.location, page);
            // The deadline also cuts an in-flight fetch short, so a
            // page started late cannot overrun it by its retry budget.
            let fetched = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    info!(source = source_id, page, "deadline reached mid-fetch, stopping source");
                    outcome.stopped = StopReason::Deadline;
                    break;
                }
                fetched = self.fetcher.fetch(&url, cancel) => fetched,
            };
            let page_ok = match fetched {
                Ok(body) => {
                    outcome.pages_fetched += 1;
                    match adapter.parse(&body) {
                        Ok(candidates) => {
                            debug!(
                                source = source_id,
                                page,
                                candidates = candidates.len(),
                                "page parsed"
                            );
                            self.submit(adapter, candidates, store, &mut outcome);
                            true
                        }
                        Err(e) => {
                            warn!(source = source_id, page, error = %e, "page parse failed, skipping");
                            false
                        }
                    }
                }
                Err(e) if e.is_cancelled() => {
                    outcome.stopped = StopReason::Cancelled;
                    break;
                }
                Err(e) => {
                    warn!(source = source_id, page, error = %e, "page fetch failed, skipping");
                    false
                }
            };

            if page_ok {
                consecutive_failures = 0;
            } else {
                consecutive_failures += 1;
                if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    warn!(
                        source = source_id,
                        failures = consecutive_failures,
                        "abandoning source, likely blocked or exhausted"
                    );
                    outcome.stopped = StopReason::ConsecutiveFailures;
                    break;
                }
            }

            // Politeness toward the remote site, not mere pacing.
            if page < budget {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        outcome.stopped = StopReason::Cancelled;
                        break;
                    }
                    _ = tokio::time::sleep(self.page_delay()) => {}
                }
            }
        }

        info!(
            source = source_id,
            pages = outcome.pages_fetched,
            added = outcome.records_added,
            duplicates = outcome.duplicates_rejected,
            stopped = ?outcome.stopped,
            "source finished"
        );
        outcome
    }

    /// Filter, normalize, and store one page's candidates.
    fn submit(
        &self,
        adapter: &dyn SiteAdapter,
        candidates: Vec<crate::types::record::RawCandidate>,
        store: &RecordStore,
        outcome: &mut SourceOutcome,
    ) {
        for candidate in candidates {
            if !self.config.filter.matches(&candidate.filter_text()) {
                debug!(title = %candidate.title, "candidate filtered out");
                continue;
            }

            let Some(record) =
                JobRecord::from_candidate(adapter.source(), candidate, &self.config.location)
            else {
                continue;
            };

            match store.add(record) {
                AddOutcome::Inserted => outcome.records_added += 1,
                AddOutcome::Duplicate => outcome.duplicates_rejected += 1,
            }
        }
    }

    /// Uniform random delay in `[min_delay, max_delay]`.
    fn page_delay(&self) -> Duration {
        let min = self.config.min_delay;
        let max = self.config.max_delay.max(min);
        if max == min {
            return min;
        }
        let span_ms = (max - min).as_millis() as u64;
        min + Duration::from_millis(rand::thread_rng().gen_range(0..=span_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{candidates_payload, MockAdapter, MockTransport};
    use crate::types::config::KeywordFilter;
    use crate::types::record::RawCandidate;

    fn test_config(pages: u32) -> HarvestConfig {
        HarvestConfig::new()
            .with_max_pages(pages)
            .with_delay_range(Duration::ZERO, Duration::ZERO)
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(3600)
    }

    #[tokio::test]
    async fn test_full_budget_run() {
        let adapter = MockAdapter::new("a");
        let source = SourceConfig::new(adapter.source(), "q");
        let config = test_config(2);

        let transport = MockTransport::new()
            .with_body(
                adapter.page_url("q", &config.location, 1),
                candidates_payload(&[
                    RawCandidate::new("Agent").with_url("https://example.com/1"),
                    RawCandidate::new("Broker").with_url("https://example.com/2"),
                ]),
            )
            .with_body(
                adapter.page_url("q", &config.location, 2),
                candidates_payload(&[
                    RawCandidate::new("Analyst").with_url("https://example.com/3")
                ]),
            );
        let fetcher = RetryingFetcher::new(transport, 1, Duration::ZERO);
        let store = RecordStore::new();

        let outcome = SourceDriver::new(&fetcher, &config)
            .run(
                &adapter,
                &source,
                &store,
                far_deadline(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.pages_fetched, 2);
        assert_eq!(outcome.records_added, 3);
        assert_eq!(outcome.stopped, StopReason::PageBudget);
        assert!(outcome.completed());
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_three_consecutive_failures_abandon_source() {
        let adapter = MockAdapter::new("a");
        let source = SourceConfig::new(adapter.source(), "q");
        let config = test_config(10);

        // Unknown URLs fail transiently; a 1-attempt fetcher turns
        // each page into a failure.
        let fetcher = RetryingFetcher::new(MockTransport::new(), 1, Duration::ZERO);
        let store = RecordStore::new();

        let outcome = SourceDriver::new(&fetcher, &config)
            .run(
                &adapter,
                &source,
                &store,
                far_deadline(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.stopped, StopReason::ConsecutiveFailures);
        assert_eq!(outcome.pages_fetched, 0);
        assert_eq!(fetcher.transport.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_success_resets_failure_counter() {
        let adapter = MockAdapter::new("a");
        let source = SourceConfig::new(adapter.source(), "q");
        let config = test_config(5);

        // Pages 1, 2, 4, 5 fail; page 3 succeeds and resets the
        // counter, so the budget is never abandoned.
        let transport = MockTransport::new().with_body(
            adapter.page_url("q", &config.location, 3),
            candidates_payload(&[RawCandidate::new("Agent").with_url("https://example.com/1")]),
        );
        let fetcher = RetryingFetcher::new(transport, 1, Duration::ZERO);
        let store = RecordStore::new();

        let outcome = SourceDriver::new(&fetcher, &config)
            .run(
                &adapter,
                &source,
                &store,
                far_deadline(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.stopped, StopReason::PageBudget);
        assert_eq!(outcome.records_added, 1);
    }

    #[tokio::test]
    async fn test_parse_failures_count_toward_abandonment() {
        let adapter = MockAdapter::new("a");
        let source = SourceConfig::new(adapter.source(), "q");
        let config = test_config(10);

        let transport = MockTransport::new();
        let transport = (1..=4).fold(transport, |t, page| {
            t.with_body(adapter.page_url("q", &config.location, page), "<garbage>")
        });
        let fetcher = RetryingFetcher::new(transport, 1, Duration::ZERO);
        let store = RecordStore::new();

        let outcome = SourceDriver::new(&fetcher, &config)
            .run(
                &adapter,
                &source,
                &store,
                far_deadline(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.stopped, StopReason::ConsecutiveFailures);
        // Fetches succeeded even though parsing did not
        assert_eq!(outcome.pages_fetched, 3);
    }

    #[tokio::test]
    async fn test_expired_deadline_stops_immediately() {
        let adapter = MockAdapter::new("a");
        let source = SourceConfig::new(adapter.source(), "q");
        let config = test_config(5);
        let fetcher = RetryingFetcher::new(MockTransport::new(), 1, Duration::ZERO);
        let store = RecordStore::new();

        let outcome = SourceDriver::new(&fetcher, &config)
            .run(
                &adapter,
                &source,
                &store,
                Instant::now(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.stopped, StopReason::Deadline);
        assert!(!outcome.completed());
        assert!(fetcher.transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cuts_retries_short() {
        let adapter = MockAdapter::new("a");
        let source = SourceConfig::new(adapter.source(), "q");
        let config = test_config(3);

        // Every fetch fails and backs off for ~10s; the deadline lands
        // during the first backoff, so no retry ever fires.
        let fetcher = RetryingFetcher::new(MockTransport::new(), 3, Duration::from_secs(10));
        let store = RecordStore::new();
        let deadline = Instant::now() + Duration::from_secs(1);

        let outcome = SourceDriver::new(&fetcher, &config)
            .run(
                &adapter,
                &source,
                &store,
                deadline,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.stopped, StopReason::Deadline);
        assert_eq!(fetcher.transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_source() {
        let adapter = MockAdapter::new("a");
        let source = SourceConfig::new(adapter.source(), "q");
        let config = test_config(5);
        let fetcher = RetryingFetcher::new(MockTransport::new(), 1, Duration::ZERO);
        let store = RecordStore::new();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = SourceDriver::new(&fetcher, &config)
            .run(&adapter, &source, &store, far_deadline(), &cancel)
            .await;

        assert_eq!(outcome.stopped, StopReason::Cancelled);
        assert!(!outcome.completed());
    }

    #[tokio::test]
    async fn test_filter_and_dedup_applied() {
        let adapter = MockAdapter::new("a");
        let source = SourceConfig::new(adapter.source(), "q");
        let config = test_config(1)
            .with_filter(KeywordFilter::including(["immobilier"]).excluding(["stage"]));

        let transport = MockTransport::new().with_body(
            adapter.page_url("q", &config.location, 1),
            candidates_payload(&[
                RawCandidate::new("Agent immobilier").with_url("https://example.com/1"),
                RawCandidate::new("Agent immobilier").with_url("https://example.com/1"),
                RawCandidate::new("Stage immobilier").with_url("https://example.com/2"),
                RawCandidate::new("Software engineer").with_url("https://example.com/3"),
            ]),
        );
        let fetcher = RetryingFetcher::new(transport, 1, Duration::ZERO);
        let store = RecordStore::new();

        let outcome = SourceDriver::new(&fetcher, &config)
            .run(
                &adapter,
                &source,
                &store,
                far_deadline(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.records_added, 1);
        assert_eq!(outcome.duplicates_rejected, 1);
        assert_eq!(store.len(), 1);
    }
}
