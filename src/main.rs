use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use log::LevelFilter;

use weekend_events::config::{write_config, AppConfig};
use weekend_events::dedupe::DedupePolicy;
use weekend_events::window::WeekendPolicy;
use weekend_events::{build_pipeline, scraping, utils};

/// Collects this weekend's events, writes an HTML report and mails it.
#[derive(Parser)]
#[command(name = "weekend-events", version)]
struct Cli {
    /// Config file (defaults to the per-user data directory)
    #[arg(long, env = "EVENTS_CONFIG")]
    config: Option<PathBuf>,

    /// Pretend today is this date (YYYY-MM-DD)
    #[arg(long)]
    today: Option<NaiveDate>,

    /// Weekend to target: nearest or next-week
    #[arg(long)]
    policy: Option<WeekendPolicy>,

    /// Duplicate detection: title or full
    #[arg(long)]
    dedupe: Option<DedupePolicy>,

    /// Search term to collect; repeat for several sources
    #[arg(long = "source")]
    sources: Vec<String>,

    /// Directory the report is saved into
    #[arg(long)]
    output: Option<PathBuf>,

    /// Per-source time limit in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Save the report without mailing it
    #[arg(long)]
    no_email: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Collect, render and deliver (default)
    Run,
    /// Print the weekend window that would be targeted
    Window,
    /// List the configured sources
    Sources,
    /// Write the effective configuration to the config file
    InitConfig,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(policy) = self.policy {
            config.weekend_policy = policy;
        }
        if let Some(policy) = self.dedupe {
            config.dedupe_policy = policy;
        }
        if !self.sources.is_empty() {
            config.search_terms = self.sources.clone();
        }
        if let Some(dir) = &self.output {
            config.output_dir = Some(dir.clone());
        }
        if let Some(secs) = self.timeout {
            config.collector_timeout_secs = secs;
        }
    }
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .parse_default_env()
        .init();

    let config_path = cli.config.clone().unwrap_or_else(utils::config_path);
    let mut config = AppConfig::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    cli.apply(&mut config);

    let today = match cli.today {
        Some(today) => today,
        None => config.today_at(Utc::now())?,
    };

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&config, today, !cli.no_email),
        Command::Window => {
            let window = weekend_events::window::resolve(today, config.weekend_policy);
            println!("{window}");
            Ok(())
        }
        Command::Sources => {
            for info in scraping::list_sources(&scraping::active_sources(&config)) {
                println!("{}\t{}", info.name, info.url);
            }
            Ok(())
        }
        Command::InitConfig => {
            write_config(&config_path, &config)?;
            println!("wrote {}", config_path.display());
            Ok(())
        }
    }
}

fn run(config: &AppConfig, today: NaiveDate, send_email: bool) -> Result<()> {
    let pipeline = build_pipeline(config, send_email)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    let outcome = runtime.block_on(pipeline.run(today));
    // A collector that timed out may still be blocked on the network.
    runtime.shutdown_timeout(Duration::from_secs(1));
    let outcome = outcome?;

    let summary = &outcome.summary;
    println!(
        "{} events for {} ({} duplicates, {} discarded)",
        summary.events, summary.window, summary.duplicates, summary.discarded
    );
    for source in summary.failed_sources() {
        println!(
            "  {} failed: {}",
            source.name,
            source.error.as_deref().unwrap_or_default()
        );
    }
    for receipt in &outcome.receipts {
        println!("  delivered: {receipt:?}");
    }

    if !outcome.delivery_failures.is_empty() {
        let joined = outcome
            .delivery_failures
            .iter()
            .map(|(target, err)| format!("{target}: {err}"))
            .collect::<Vec<_>>()
            .join("; ");
        bail!("delivery failed: {joined}");
    }
    Ok(())
}
