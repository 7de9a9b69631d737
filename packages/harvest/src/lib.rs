//! Rate-limited, crash-safe harvester for real-estate job listings.
//!
//! The crate is organized around four moving parts:
//!
//! - [`store::RecordStore`]: deduplicated record collection with
//!   atomic snapshot persistence
//! - [`fetch::RetryingFetcher`]: bounded retries with exponential
//!   backoff, jitter, and rotating request identities
//! - [`driver::SourceDriver`]: the per-source pagination loop
//! - [`controller::RunController`]: recovery, checkpointing, and
//!   finalization for a whole run
//!
//! Site specifics live in [`adapters`]; everything network-facing sits
//! behind the [`fetch::Transport`] trait so the pipeline is testable
//! without a network.

pub mod adapters;
pub mod controller;
pub mod driver;
pub mod error;
pub mod fetch;
pub mod identity;
pub mod report;
pub mod store;
pub mod testing;
pub mod types;

pub use controller::{RunController, RunOutput};
pub use error::{FetchError, HarvestError, ParseError, PersistError, Result};
pub use report::{render_report, RunReport};
pub use store::RecordStore;
pub use types::config::{HarvestConfig, KeywordFilter, SourceConfig};
pub use types::record::{JobRecord, RawCandidate, Source};
