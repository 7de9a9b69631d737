//! Command-line front end for the harvester.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use harvest::{
    render_report, HarvestConfig, KeywordFilter, RunController, Source, SourceConfig,
};

/// Harvest real-estate job listings from public job boards into a
/// deduplicated JSON file.
#[derive(Parser, Debug)]
#[command(name = "harvest", version, about)]
struct Args {
    /// Output file for the harvested records
    #[arg(long, default_value = "real_estate_jobs.json")]
    output: PathBuf,

    /// Search location
    #[arg(long, default_value = "Paris")]
    location: String,

    /// Max result pages per source
    #[arg(long, default_value_t = 5)]
    pages: u32,

    /// Minimum delay between page requests, in milliseconds
    #[arg(long, default_value_t = 1500)]
    min_delay: u64,

    /// Maximum delay between page requests, in milliseconds
    #[arg(long, default_value_t = 4000)]
    max_delay: u64,

    /// Wall-clock budget for the whole run, in seconds
    #[arg(long, default_value_t = 300)]
    timeout: u64,

    /// Per-request HTTP timeout, in seconds
    #[arg(long, default_value_t = 30)]
    req_timeout: u64,

    /// Retries per page after the first attempt
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Seconds between periodic crash-recovery checkpoints
    #[arg(long, default_value_t = 60)]
    backup_interval: u64,

    /// French search query (Indeed, APEC, Welcome to the Jungle)
    #[arg(long, default_value = "immobilier")]
    query_fr: String,

    /// English search query (LinkedIn)
    #[arg(long, default_value = "real estate")]
    query_en: String,

    /// Additional keywords a listing must match (repeatable)
    #[arg(long = "include")]
    include: Vec<String>,

    /// Keywords that reject a listing (repeatable)
    #[arg(long = "exclude")]
    exclude: Vec<String>,

    /// Skip the Indeed source
    #[arg(long)]
    skip_indeed: bool,

    /// Skip the APEC source
    #[arg(long)]
    skip_apec: bool,

    /// Skip the LinkedIn source
    #[arg(long)]
    skip_linkedin: bool,

    /// Skip the Welcome to the Jungle source
    #[arg(long)]
    skip_wttj: bool,

    /// Print the full text report after the run
    #[arg(long)]
    report: bool,
}

impl Args {
    fn to_config(&self) -> HarvestConfig {
        let include = if self.include.is_empty() {
            vec![
                "immobilier".to_string(),
                "real estate".to_string(),
                "foncier".to_string(),
                "property".to_string(),
            ]
        } else {
            self.include.clone()
        };
        let filter = KeywordFilter::including(include).excluding(self.exclude.clone());

        let mut config = HarvestConfig::new()
            .with_location(self.location.clone())
            .with_max_pages(self.pages)
            .with_delay_range(
                Duration::from_millis(self.min_delay),
                Duration::from_millis(self.max_delay),
            )
            .with_global_timeout(Duration::from_secs(self.timeout))
            .with_request_timeout(Duration::from_secs(self.req_timeout))
            .with_retries(self.retries, Duration::from_secs(1))
            .with_backup_interval(Duration::from_secs(self.backup_interval))
            .with_filter(filter)
            .with_output_path(self.output.clone());

        if !self.skip_indeed {
            config = config.with_source(SourceConfig::new(Source::Indeed, &self.query_fr));
        }
        if !self.skip_apec {
            config = config.with_source(SourceConfig::new(Source::Apec, &self.query_fr));
        }
        if !self.skip_linkedin {
            config = config.with_source(SourceConfig::new(Source::LinkedIn, &self.query_en));
        }
        if !self.skip_wttj {
            config = config.with_source(SourceConfig::new(
                Source::WelcomeToTheJungle,
                &self.query_fr,
            ));
        }

        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.to_config();
    if config.sources.is_empty() {
        anyhow::bail!("every source is skipped; nothing to harvest");
    }

    let output_path = config.output_path.clone();
    let controller = RunController::new(config)?;

    // First Ctrl-C requests a clean stop; the run finalizes what it
    // has before exiting.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing current work and saving");
            signal_cancel.cancel();
        }
    });

    let output = controller.run(cancel).await?;

    if args.report {
        println!("{}", render_report(&output.report, &output.records));
    } else {
        println!(
            "{} records ({} new, {} duplicates rejected) written to {}",
            output.report.total_records,
            output.report.records_added(),
            output.report.duplicates_rejected,
            output_path.display(),
        );
        if output.report.aborted {
            println!("run stopped early; results are partial");
        }
    }

    Ok(())
}
