//! CLI entry point for the paper collector.

use std::io::{self, IsTerminal};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use collector_core::pipeline::maintenance::{self, DEFAULT_VIEW_LIMIT};
use collector_core::{
    Database, Pipeline, PipelineConfig, PipelineReport, PipelineStage, RecordRepository, Store,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

mod cli;

use cli::{Action, Args};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.default_log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let loaded = PipelineConfig::load(args.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(path) = loaded.path.as_ref().filter(|_| loaded.loaded_from_file) {
        debug!(path = %path.display(), "configuration file in use");
    }
    let mut config = loaded.config;
    args.apply_overrides(&mut config);
    config.validate().context("invalid configuration")?;

    let db = Database::with_options(&config.database_path, config.database_options())
        .await
        .with_context(|| format!("failed to open database {}", config.database_path.display()))?;
    let store = Store::new(db);

    match args.action() {
        Action::Reset => {
            let summary = maintenance::reset(&store, &config.artifact_dir).await?;
            println!("Deleted {} papers from database", summary.records_removed);
            if summary.artifacts_cleared {
                println!("Cleared PDF directory {}", config.artifact_dir.display());
            }
            let cleared = maintenance::sync(&store).await?;
            println!("Reset {cleared} papers that were missing PDF files");
            Ok(ExitCode::SUCCESS)
        }
        Action::Sync => {
            let cleared = maintenance::sync(&store).await?;
            println!("Reset {cleared} papers that were missing PDF files");
            Ok(ExitCode::SUCCESS)
        }
        Action::Export(path) => {
            let count = maintenance::export_json(&store, &path).await?;
            println!("Exported {count} papers to {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Action::View => {
            print_latest(&store).await?;
            Ok(ExitCode::SUCCESS)
        }
        Action::Collect => run_pipeline(&args, &config, store).await,
    }
}

async fn run_pipeline(args: &Args, config: &PipelineConfig, store: Store) -> Result<ExitCode> {
    info!("Paper collector starting");

    let repository: Arc<dyn RecordRepository> = Arc::new(store);
    let mut pipeline = Pipeline::from_config(config, repository)
        .context("failed to set up the collection pipeline")?;

    if pipeline.source_names().is_empty() {
        warn!("No sources enabled; enable [arxiv] or configure Zotero credentials");
    }

    let spinner = should_use_spinner(io::stderr().is_terminal(), args.quiet, is_dumb_terminal())
        .then(new_spinner);
    if let Some(spinner) = spinner.clone() {
        pipeline = pipeline.with_stage_observer(Arc::new(move |stage: PipelineStage| {
            spinner.set_message(stage_message(stage));
        }));
    }

    let result = pipeline.run().await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let report = result.context("pipeline run failed")?;

    if !args.quiet {
        print_report(&report);
    }

    if report.persistence_conflict.is_some() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn is_dumb_terminal() -> bool {
    std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false)
}

fn should_use_spinner(stderr_is_terminal: bool, quiet: bool, dumb_terminal: bool) -> bool {
    stderr_is_terminal && !quiet && !dumb_terminal
}

fn new_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn stage_message(stage: PipelineStage) -> &'static str {
    match stage {
        PipelineStage::Init | PipelineStage::Snapshot => "Reading stored papers...",
        PipelineStage::Collect => "Collecting from arXiv and Zotero...",
        PipelineStage::Dedup | PipelineStage::Persist => "Storing new papers...",
        PipelineStage::FetchArtifacts => "Downloading PDFs...",
        PipelineStage::Reconcile | PipelineStage::Done => "Recording downloads...",
    }
}

fn print_report(report: &PipelineReport) {
    println!(
        "Collected {} papers ({} unique)",
        report.total_collected, report.deduplicated
    );
    for failure in &report.source_failures {
        println!("  {} unavailable: {}", failure.source, failure.error);
    }
    if let Some(conflict) = &report.persistence_conflict {
        println!("Nothing stored: {conflict}");
    } else {
        println!(
            "Stored {} new papers ({} replaced, {} already present)",
            report.stored_count(),
            report.replaced,
            report.skipped.len()
        );
    }
    if report.published + report.publish_failed > 0 {
        println!(
            "Published {} papers to Zotero ({} failed)",
            report.published, report.publish_failed
        );
    }
    if report.fetch.total() == 0 {
        println!("No new papers to download");
    } else {
        println!(
            "Downloaded {} PDFs ({} failed, {} without URL)",
            report.fetch.fetched, report.fetch.failed, report.fetch.skipped
        );
    }
    println!(
        "{} papers awaiting organization",
        report.awaiting_organization
    );
}

async fn print_latest(store: &Store) -> Result<()> {
    let (total, latest) = maintenance::latest(store, DEFAULT_VIEW_LIMIT).await?;

    println!("Total papers in database: {total}");
    println!("\nLatest {DEFAULT_VIEW_LIMIT} papers:");
    println!("{}", "-".repeat(80));
    for status in latest {
        println!("Title: {}", truncate(&status.title, 70));
        println!("Authors: {}", truncate(&status.authors, 70));
        println!("Source: {}", status.source);
        println!("Has PDF: {}", yes_no(status.has_artifact));
        println!("Organized: {}", yes_no(status.organized));
        println!("{}", "-".repeat(80));
    }
    Ok(())
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let head: String = value.chars().take(max_chars).collect();
        format!("{head}...")
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "Yes" } else { "No" }
}
