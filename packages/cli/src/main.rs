#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the active calls tracker.
//!
//! Meant to be invoked by an external scheduler every few minutes. Each
//! `run` is one self-contained fetch, diff, and persist cycle; all state
//! lives under the configured storage root.

use std::path::PathBuf;

use active_calls_analytics::summary::render_summary;
use active_calls_source::CallSource as _;
use active_calls_source::registry::{all_sources, find_source};
use active_calls_store::{FsSnapshotStore, SnapshotStore as _};
use active_calls_tracker::{
    EmptyResultPolicy, RunOutcome, RunStatus, TrackerConfig, github_output, pipeline,
};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "active_calls", about = "Active police calls tracker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every command that touches persisted state.
#[derive(Args)]
struct ConfigArgs {
    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory holding `data/` and `analysis/` (overrides
    /// `ACTIVE_CALLS_STORAGE_ROOT`)
    #[arg(long)]
    storage_root: Option<PathBuf>,
}

impl ConfigArgs {
    /// Defaults, then the config file, then the environment, then flags.
    fn resolve(
        &self,
        configure: impl FnOnce(&mut TrackerConfig),
    ) -> Result<TrackerConfig, Box<dyn std::error::Error>> {
        let mut config = TrackerConfig::load(self.config.as_deref())?;
        config.apply_env();
        if let Some(root) = &self.storage_root {
            config.storage_root.clone_from(root);
        }
        configure(&mut config);
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the current calls once and update the persisted state
    Run {
        #[command(flatten)]
        config: ConfigArgs,
        /// Source identifier (e.g., "`clearwater_pd`"; overrides
        /// `ACTIVE_CALLS_SOURCE`)
        #[arg(long)]
        source: Option<String>,
        /// Trust an empty upstream result even when calls were active
        #[arg(long)]
        accept_empty: bool,
    },
    /// Print the statistics report from persisted state
    Summary {
        #[command(flatten)]
        config: ConfigArgs,
        /// Entries per ranking
        #[arg(long)]
        top: Option<usize>,
    },
    /// List all configured data sources
    Sources,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            source,
            accept_empty,
        } => {
            let config = config.resolve(|config| {
                if let Some(source) = source {
                    config.source = source;
                }
                if accept_empty {
                    config.empty_result_policy = EmptyResultPolicy::Accept;
                }
            })?;

            let status = run(&config).await?;
            if status != RunStatus::Success {
                std::process::exit(status.exit_code());
            }
        }
        Commands::Summary { config, top } => {
            let config = config.resolve(|config| {
                if let Some(top) = top {
                    config.summary_top_n = top;
                }
            })?;

            let store = FsSnapshotStore::new(&config.storage_root);
            let stats = store.load_statistics()?;
            print!("{}", render_summary(&stats, config.summary_top_n));
        }
        Commands::Sources => {
            let sources = all_sources();
            println!("{:<20} {:<20} TIMEZONE", "ID", "CITY");
            println!("{}", "-".repeat(60));
            for source in &sources {
                let location = format!("{}, {}", source.city, source.state);
                println!("{:<20} {location:<20} {}", source.id(), source.timezone());
            }
        }
    }

    Ok(())
}

async fn run(config: &TrackerConfig) -> Result<RunStatus, Box<dyn std::error::Error>> {
    let source = find_source(&config.source)?;
    let store = FsSnapshotStore::new(&config.storage_root);
    let now = chrono::Utc::now();

    println!("Active Calls Tracker - {} - {}", source.name(), now.to_rfc3339());
    println!("{}", "-".repeat(60));

    let result = pipeline::run(&source, &store, config, now).await;
    let outcome = RunOutcome::from_result(&result);

    match &result {
        Ok(report) => {
            log::info!("Run complete: {}", outcome.summary);
            println!("{}", outcome.summary);
            println!();
            print!("{}", render_summary(&report.statistics, config.summary_top_n));
            github_output::write_if_configured(report);
        }
        Err(_) => {
            log::error!("Run failed ({}): {}", outcome.status, outcome.summary);
            eprintln!("{}: {}", outcome.status, outcome.summary);
        }
    }

    Ok(outcome.status)
}
