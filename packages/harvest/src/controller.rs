//! Run orchestration: recovery, checkpointing, sequential source
//! execution, and finalization.
//!
//! The controller owns the whole lifecycle of one harvest run. It is
//! generic over [`Transport`] so tests drive it with scripted
//! transports; production wiring uses [`HttpTransport`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::adapters::{ApecAdapter, IndeedAdapter, LinkedInAdapter, SiteAdapter, WttjAdapter};
use crate::driver::{SourceDriver, StopReason};
use crate::error::{HarvestError, Result};
use crate::fetch::{HttpTransport, RetryingFetcher, Transport};
use crate::report::{RunReport, SourceSummary};
use crate::store::RecordStore;
use crate::types::config::HarvestConfig;
use crate::types::record::JobRecord;

/// Everything a finished run hands back: the summary plus the final
/// record set (recovered records included).
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub report: RunReport,
    pub records: Vec<JobRecord>,
}

/// Orchestrates one harvest run end to end.
pub struct RunController<T: Transport> {
    config: HarvestConfig,
    fetcher: RetryingFetcher<T>,
    adapters: Vec<Box<dyn SiteAdapter>>,
}

impl RunController<HttpTransport> {
    /// Production controller: HTTP transport plus every built-in site
    /// adapter.
    pub fn new(config: HarvestConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.request_timeout)?;
        Ok(Self::with_transport(config, transport)
            .register(Box::new(IndeedAdapter::new()))
            .register(Box::new(ApecAdapter::new()))
            .register(Box::new(LinkedInAdapter::new()))
            .register(Box::new(WttjAdapter::new())))
    }
}

impl<T: Transport> RunController<T> {
    /// Controller with a custom transport and no adapters registered.
    pub fn with_transport(config: HarvestConfig, transport: T) -> Self {
        let fetcher = RetryingFetcher::new(
            transport,
            config.retry_budget.saturating_add(1),
            config.retry_base_delay,
        );
        Self {
            config,
            fetcher,
            adapters: Vec::new(),
        }
    }

    /// Register an adapter. Sources without a matching adapter are
    /// skipped with an error log at run time.
    pub fn register(mut self, adapter: Box<dyn SiteAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Run every configured source, checkpointing along the way, and
    /// finalize the output file. Cancelling the token stops the run at
    /// the next page boundary; finalization still happens.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunOutput> {
        let run_started = Instant::now();
        let deadline = run_started + self.config.global_timeout;
        let store = Arc::new(RecordStore::new());

        self.recover(&store);

        let checkpoint = self.spawn_checkpoint_task(store.clone());

        let mut summaries = Vec::with_capacity(self.config.sources.len());
        let mut aborted = false;
        let mut fatal: Option<HarvestError> = None;

        for source_config in &self.config.sources {
            if store.is_source_completed(source_config.source) {
                info!(
                    source = source_config.source.id(),
                    "source already completed, skipping"
                );
                summaries.push(SourceSummary::skipped(source_config.source));
                continue;
            }

            if cancel.is_cancelled() || Instant::now() >= deadline {
                aborted = true;
                break;
            }

            let Some(adapter) = self.adapter_for(source_config.source) else {
                error!(
                    source = source_config.source.id(),
                    "no adapter registered for source, skipping"
                );
                continue;
            };

            let driver = SourceDriver::new(&self.fetcher, &self.config);
            // A panicking adapter must not take the run down with it;
            // whatever is already collected still gets finalized.
            let driven = AssertUnwindSafe(
                driver.run(adapter, source_config, &store, deadline, &cancel),
            )
            .catch_unwind()
            .await;
            let outcome = match driven {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let reason = panic_message(panic);
                    error!(
                        source = source_config.source.id(),
                        reason = %reason,
                        "source driver panicked, aborting run"
                    );
                    fatal = Some(HarvestError::Fatal(format!(
                        "source {} panicked: {}",
                        source_config.source.id(),
                        reason
                    )));
                    aborted = true;
                    break;
                }
            };

            if outcome.completed() {
                store.mark_source_completed(source_config.source);
            }
            if matches!(outcome.stopped, StopReason::Deadline | StopReason::Cancelled) {
                aborted = true;
            }
            summaries.push(SourceSummary::from_outcome(source_config.source, &outcome));

            // Checkpoint at source boundaries too; losing a whole
            // source to a crash is worse than a redundant write.
            if let Err(e) = store.save(&self.config.backup_path) {
                warn!(error = %e, "checkpoint after source failed");
            }
        }

        checkpoint.abort();

        let report = RunReport {
            total_records: store.len(),
            duplicates_rejected: store.duplicates_rejected(),
            sources: summaries,
            elapsed: run_started.elapsed(),
            aborted: aborted || cancel.is_cancelled(),
        };

        // Finalize on every exit path, fatal included: the run always
        // saves what it collected.
        self.finalize(&store)?;

        if let Some(fatal) = fatal {
            return Err(fatal);
        }

        info!(
            records = report.total_records,
            duplicates = report.duplicates_rejected,
            aborted = report.aborted,
            "run finished"
        );
        Ok(RunOutput {
            records: store.records(),
            report,
        })
    }

    /// Seed the store from a leftover backup, if any. A corrupt
    /// backup is logged and ignored rather than failing the run.
    fn recover(&self, store: &RecordStore) {
        match RecordStore::load(&self.config.backup_path) {
            Ok(Some(state)) => {
                info!(
                    records = state.records.len(),
                    completed_sources = state.sources_completed.len(),
                    "recovered state from backup"
                );
                store.seed(state);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "backup unreadable, starting fresh");
            }
        }
    }

    /// Periodic background checkpoints to the backup path. Failures
    /// are logged, never fatal.
    fn spawn_checkpoint_task(&self, store: Arc<RecordStore>) -> tokio::task::JoinHandle<()> {
        let path = self.config.backup_path.clone();
        let interval = self.config.backup_interval.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = store.save(&path) {
                    warn!(error = %e, "periodic checkpoint failed");
                }
            }
        })
    }

    /// Write the final output atomically, then drop the backup. If
    /// the final write fails the backup stays so nothing is lost.
    fn finalize(&self, store: &RecordStore) -> Result<()> {
        store.save(&self.config.output_path)?;

        match std::fs::remove_file(&self.config.backup_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(error = %e, "could not remove backup after finalize");
            }
        }
        Ok(())
    }

    fn adapter_for(&self, source: crate::types::record::Source) -> Option<&dyn SiteAdapter> {
        self.adapters
            .iter()
            .find(|a| a.source() == source)
            .map(|a| a.as_ref())
    }
}

/// Best-effort text from a caught panic payload.
fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{candidates_payload, MockAdapter, MockTransport};
    use crate::types::config::SourceConfig;
    use crate::types::record::{RawCandidate, Source};

    fn base_config(dir: &std::path::Path) -> HarvestConfig {
        HarvestConfig::new()
            .with_max_pages(1)
            .with_delay_range(Duration::ZERO, Duration::ZERO)
            .with_retries(0, Duration::ZERO)
            .with_output_path(dir.join("jobs.json"))
    }

    fn candidate(title: &str, url: &str) -> RawCandidate {
        RawCandidate::new(title).with_url(url)
    }

    #[tokio::test]
    async fn test_two_sources_dedup_across_sources() {
        let dir = tempfile::tempdir().unwrap();
        let config = base_config(dir.path())
            .with_source(SourceConfig::new(Source::Indeed, "q"))
            .with_source(SourceConfig::new(Source::Apec, "q"));

        let a = MockAdapter::new("a").with_source(Source::Indeed);
        let b = MockAdapter::new("b").with_source(Source::Apec);

        let transport = MockTransport::new()
            .with_body(
                a.page_url("q", &config.location, 1),
                candidates_payload(&[
                    candidate("Agent", "https://example.com/1"),
                    candidate("Broker", "https://example.com/2"),
                    candidate("Analyst", "https://example.com/3"),
                    candidate("Agent again", "https://example.com/1"),
                ]),
            )
            .with_body(
                b.page_url("q", &config.location, 1),
                candidates_payload(&[
                    candidate("Advisor", "https://example.com/4"),
                    candidate("Manager", "https://example.com/5"),
                    candidate("Agent cross-posted", "https://example.com/1"),
                ]),
            );

        let controller = RunController::with_transport(config.clone(), transport)
            .register(Box::new(a))
            .register(Box::new(b));

        let output = controller.run(CancellationToken::new()).await.unwrap();

        assert_eq!(output.report.total_records, 5);
        assert_eq!(output.report.duplicates_rejected, 2);
        assert!(!output.report.aborted);
        assert_eq!(output.records.len(), 5);

        // Output written, backup cleaned up
        let state = RecordStore::load(&config.output_path).unwrap().unwrap();
        assert_eq!(state.records.len(), 5);
        assert!(!config.backup_path.exists());
    }

    #[tokio::test]
    async fn test_recovery_skips_completed_sources() {
        let dir = tempfile::tempdir().unwrap();
        let config = base_config(dir.path())
            .with_source(SourceConfig::new(Source::Indeed, "q"))
            .with_source(SourceConfig::new(Source::Apec, "q"));

        // A previous run finished Indeed and crashed before Apec.
        let previous = RecordStore::new();
        previous.add(
            JobRecord::from_candidate(
                Source::Indeed,
                candidate("Agent", "https://example.com/1"),
                "Paris",
            )
            .unwrap(),
        );
        previous.mark_source_completed(Source::Indeed);
        previous.save(&config.backup_path).unwrap();

        let a = MockAdapter::new("a").with_source(Source::Indeed);
        let b = MockAdapter::new("b").with_source(Source::Apec);
        let transport = MockTransport::new().with_body(
            b.page_url("q", &config.location, 1),
            candidates_payload(&[
                candidate("Advisor", "https://example.com/2"),
                // Already harvested by the crashed run
                candidate("Agent", "https://example.com/1"),
            ]),
        );

        let controller = RunController::with_transport(config.clone(), transport)
            .register(Box::new(a))
            .register(Box::new(b));

        let output = controller.run(CancellationToken::new()).await.unwrap();

        assert_eq!(output.report.total_records, 2);
        assert_eq!(output.report.duplicates_rejected, 1);
        assert!(output.report.sources[0].recovered);
        // Indeed was never fetched again
        assert_eq!(controller.fetcher.transport.calls_matching("mock://a"), 0);
    }

    #[tokio::test]
    async fn test_cancelled_run_still_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let config = base_config(dir.path())
            .with_source(SourceConfig::new(Source::Indeed, "q"));

        let a = MockAdapter::new("a").with_source(Source::Indeed);
        let controller =
            RunController::with_transport(config.clone(), MockTransport::new())
                .register(Box::new(a));

        let cancel = CancellationToken::new();
        cancel.cancel();

        let output = controller.run(cancel).await.unwrap();

        assert!(output.report.aborted);
        assert_eq!(output.report.total_records, 0);
        // Output exists even for an aborted empty run
        assert!(config.output_path.exists());
    }

    #[tokio::test]
    async fn test_expired_deadline_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = base_config(dir.path())
            .with_global_timeout(Duration::ZERO)
            .with_source(SourceConfig::new(Source::Indeed, "q"));

        let a = MockAdapter::new("a").with_source(Source::Indeed);
        let controller =
            RunController::with_transport(config.clone(), MockTransport::new())
                .register(Box::new(a));

        let output = controller.run(CancellationToken::new()).await.unwrap();

        assert!(output.report.aborted);
        assert!(controller.fetcher.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_source_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = base_config(dir.path())
            .with_source(SourceConfig::new(Source::LinkedIn, "q"));

        let controller =
            RunController::with_transport(config.clone(), MockTransport::new());

        let output = controller.run(CancellationToken::new()).await.unwrap();
        assert_eq!(output.report.total_records, 0);
        assert!(output.report.sources.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_backup_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let config = base_config(dir.path())
            .with_source(SourceConfig::new(Source::Indeed, "q"));
        std::fs::write(&config.backup_path, "{not json").unwrap();

        let a = MockAdapter::new("a").with_source(Source::Indeed);
        let transport = MockTransport::new().with_body(
            a.page_url("q", &config.location, 1),
            candidates_payload(&[candidate("Agent", "https://example.com/1")]),
        );
        let controller = RunController::with_transport(config.clone(), transport)
            .register(Box::new(a));

        let output = controller.run(CancellationToken::new()).await.unwrap();
        assert_eq!(output.report.total_records, 1);
    }

    struct ExplodingAdapter;

    impl SiteAdapter for ExplodingAdapter {
        fn source(&self) -> Source {
            Source::Apec
        }

        fn page_url(&self, _query: &str, _location: &str, page: u32) -> String {
            format!("mock://exploding/page/{}", page)
        }

        fn parse(&self, _body: &str) -> std::result::Result<Vec<RawCandidate>, crate::error::ParseError> {
            panic!("unexpected payload shape")
        }
    }

    #[tokio::test]
    async fn test_adapter_panic_still_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let config = base_config(dir.path())
            .with_source(SourceConfig::new(Source::Indeed, "q"))
            .with_source(SourceConfig::new(Source::Apec, "q"));

        let a = MockAdapter::new("a").with_source(Source::Indeed);
        let exploding = ExplodingAdapter;
        let transport = MockTransport::new()
            .with_body(
                a.page_url("q", &config.location, 1),
                candidates_payload(&[candidate("Agent", "https://example.com/1")]),
            )
            .with_body(exploding.page_url("q", &config.location, 1), "<html>");

        let controller = RunController::with_transport(config.clone(), transport)
            .register(Box::new(a))
            .register(Box::new(exploding));

        let err = controller.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, crate::error::HarvestError::Fatal(_)));
        assert!(err.to_string().contains("apec"));

        // The first source's record survived to the output file.
        let state = RecordStore::load(&config.output_path).unwrap().unwrap();
        assert_eq!(state.records.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_checkpoint_writes_backup() {
        let dir = tempfile::tempdir().unwrap();
        let config = base_config(dir.path()).with_backup_interval(Duration::from_secs(1));

        let controller =
            RunController::with_transport(config.clone(), MockTransport::new());
        let store = Arc::new(RecordStore::new());
        store.add(
            JobRecord::from_candidate(
                Source::Indeed,
                candidate("Agent", "https://example.com/1"),
                "Paris",
            )
            .unwrap(),
        );

        let task = controller.spawn_checkpoint_task(store.clone());
        assert!(!config.backup_path.exists());

        // Virtual time: the first interval elapses without a real wait.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        task.abort();

        let state = RecordStore::load(&config.backup_path).unwrap().unwrap();
        assert_eq!(state.records.len(), 1);
    }
}
