//! Sumi-Survey main entry point
//!
//! This is the command-line interface for the Sumi-Survey page survey job runner.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sumi_survey::config::{load_config_with_hash, Config};
use sumi_survey::crawler::{BatchReport, JobOutcome, Orchestrator};
use sumi_survey::output::{export_report, format_job_json, load_statistics, print_job_page, print_statistics};
use sumi_survey::state::JobStatus;
use sumi_survey::storage::{JobStore, ListQuery, SqliteJobStore, DEFAULT_PAGE_LIMIT};
use tracing_subscriber::EnvFilter;

/// Sumi-Survey: a page survey job runner
///
/// Sumi-Survey accepts URLs as crawl jobs, fetches each page once, records
/// its title, HTML version, heading and link counts and login-form presence,
/// and samples outbound links for liveness.
#[derive(Parser, Debug)]
#[command(name = "sumi-survey")]
#[command(version)]
#[command(about = "A page survey job runner", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create queued jobs for one or more URLs
    Submit {
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,

        /// Process the new jobs immediately and wait for them
        #[arg(long)]
        run: bool,
    },

    /// Accept a batch of job ids and wait for every job to finish
    Run {
        #[arg(required = true, value_name = "ID")]
        ids: Vec<String>,
    },

    /// List jobs, newest first
    List {
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        page: i64,

        #[arg(long, default_value_t = i64::from(DEFAULT_PAGE_LIMIT), allow_negative_numbers = true)]
        limit: i64,

        /// Only jobs with this status (queued, running, completed, error)
        #[arg(long)]
        status: Option<JobStatus>,
    },

    /// Print one job as JSON
    Show {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Delete one or more jobs
    Delete {
        #[arg(required = true, value_name = "ID")]
        ids: Vec<String>,
    },

    /// Reset a finished job to queued so it can be run again
    Requeue {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Show job counts by status
    Stats,

    /// Write a markdown report of all jobs
    ExportReport,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = load_configuration(cli.config.as_deref())?;

    let store: Arc<dyn JobStore> = Arc::new(
        SqliteJobStore::new(Path::new(&config.storage.database_path)).with_context(|| {
            format!(
                "failed to open job store at {}",
                config.storage.database_path
            )
        })?,
    );

    match cli.command {
        Command::Submit { urls, run } => handle_submit(&config, store, &urls, run).await,
        Command::Run { ids } => handle_run(&config, store, &ids).await,
        Command::List {
            page,
            limit,
            status,
        } => handle_list(store.as_ref(), ListQuery::new(page, limit, status)),
        Command::Show { id } => handle_show(store.as_ref(), &id),
        Command::Delete { ids } => handle_delete(store.as_ref(), &ids),
        Command::Requeue { id } => handle_requeue(store.as_ref(), &id),
        Command::Stats => handle_stats(&config, store.as_ref()),
        Command::ExportReport => handle_export_report(&config, store.as_ref()),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_survey=info,warn"),
            1 => EnvFilter::new("sumi_survey=debug,info"),
            2 => EnvFilter::new("sumi_survey=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the config file, or the defaults when no file was given
fn load_configuration(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        tracing::debug!("No configuration file given, using defaults");
        return Ok(Config::default());
    };

    tracing::info!("Loading configuration from: {}", path.display());
    let (config, hash) = load_config_with_hash(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    Ok(config)
}

async fn handle_submit(
    config: &Config,
    store: Arc<dyn JobStore>,
    urls: &[String],
    run: bool,
) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(config, store)?;

    let mut ids = Vec::with_capacity(urls.len());
    for url in urls {
        let job = orchestrator
            .submit(url)
            .with_context(|| format!("failed to submit {}", url))?;
        println!("{}  {}", job.id, job.url);
        ids.push(job.id);
    }

    if run {
        run_batch(&orchestrator, &ids).await?;
    }

    Ok(())
}

async fn handle_run(
    config: &Config,
    store: Arc<dyn JobStore>,
    ids: &[String],
) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(config, store)?;
    run_batch(&orchestrator, ids).await
}

/// Accepts a batch, waits for it, and prints one line per job
async fn run_batch(orchestrator: &Orchestrator, ids: &[String]) -> anyhow::Result<()> {
    let handle = orchestrator
        .accept_batch(ids)
        .await
        .context("failed to accept batch")?;
    tracing::info!(
        "Accepted {} jobs ({} moved to running)",
        handle.dispatched(),
        handle.transitioned()
    );

    let report = handle.join().await;
    print_batch_report(&report);

    Ok(())
}

fn print_batch_report(report: &BatchReport) {
    for (id, outcome) in &report.outcomes {
        match outcome {
            JobOutcome::Completed => println!("{}  completed", id),
            JobOutcome::Failed { error } => println!("{}  error: {}", id, error),
            JobOutcome::Skipped(reason) => println!("{}  skipped ({:?})", id, reason),
            JobOutcome::StoreFailed { error } => println!("{}  store failure: {}", id, error),
            JobOutcome::Aborted { error } => println!("{}  aborted: {}", id, error),
        }
    }
    println!(
        "\n✓ {} completed, {} failed, {} skipped",
        report.completed(),
        report.failed(),
        report.skipped()
    );
}

fn handle_list(store: &dyn JobStore, query: ListQuery) -> anyhow::Result<()> {
    let page = store.list_paginated(&query).context("failed to list jobs")?;
    print_job_page(&page);
    Ok(())
}

fn handle_show(store: &dyn JobStore, id: &str) -> anyhow::Result<()> {
    let job = store.get(id)?;
    println!("{}", format_job_json(&job)?);
    Ok(())
}

fn handle_delete(store: &dyn JobStore, ids: &[String]) -> anyhow::Result<()> {
    let removed = match ids {
        [id] => usize::from(store.delete(id)?),
        _ => store.bulk_delete(ids)?,
    };

    if removed == 0 {
        bail!("no matching jobs found");
    }
    println!("✓ Deleted {} job(s)", removed);
    Ok(())
}

fn handle_requeue(store: &dyn JobStore, id: &str) -> anyhow::Result<()> {
    let job = store
        .requeue(id)
        .with_context(|| format!("failed to requeue {}", id))?;
    println!("✓ {} is {}", job.id, job.status);
    Ok(())
}

/// Handles the stats command: shows job counts from the database
fn handle_stats(config: &Config, store: &dyn JobStore) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let stats = load_statistics(store).context("failed to load statistics")?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the export-report command: generates the markdown report
fn handle_export_report(config: &Config, store: &dyn JobStore) -> anyhow::Result<()> {
    println!("=== Exporting Survey Report ===\n");
    println!("Database: {}", config.storage.database_path);
    println!("Output: {}", config.output.report_path);
    println!();

    let count = export_report(store, Path::new(&config.output.report_path))
        .with_context(|| format!("failed to write report to {}", config.output.report_path))?;

    println!("✓ Report with {} jobs exported to: {}", count, config.output.report_path);

    Ok(())
}
