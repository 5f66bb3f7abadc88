//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{ArgGroup, Parser};

use collector_core::PipelineConfig;

/// Collect research papers from arXiv and Zotero and fetch their PDFs.
///
/// Without a maintenance flag, runs the collection pipeline once: collect,
/// deduplicate, store, publish to Zotero, fetch PDFs.
#[derive(Parser, Debug)]
#[command(name = "paper-collector")]
#[command(author, version, about)]
#[command(group(
    ArgGroup::new("maintenance")
        .args(["reset", "sync", "export", "view"])
        .multiple(false)
))]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/paper-collector/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Replace stored papers that have no PDF yet
    #[arg(long)]
    pub force: bool,

    /// Papers to collect per arXiv query term (1-10000)
    #[arg(long, alias = "papers-per-category", value_name = "N", value_parser = clap::value_parser!(u32).range(1..=10_000))]
    pub max_results: Option<u32>,

    /// Do not read from or publish to Zotero
    #[arg(long)]
    pub no_zotero: bool,

    /// Do not publish new papers to Zotero
    #[arg(long)]
    pub no_publish: bool,

    /// Maximum concurrent PDF downloads (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Delete all PDFs and stored papers, then sync
    #[arg(long, alias = "flush")]
    pub reset: bool,

    /// Clear PDF state for papers whose file is missing
    #[arg(long)]
    pub sync: bool,

    /// Export all stored papers as a JSON array
    #[arg(long, value_name = "PATH")]
    pub export: Option<PathBuf>,

    /// Show the latest stored papers
    #[arg(long)]
    pub view: bool,
}

/// What the binary was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Collect,
    Reset,
    Sync,
    Export(PathBuf),
    View,
}

impl Args {
    #[must_use]
    pub fn action(&self) -> Action {
        if self.reset {
            Action::Reset
        } else if self.sync {
            Action::Sync
        } else if let Some(path) = &self.export {
            Action::Export(path.clone())
        } else if self.view {
            Action::View
        } else {
            Action::Collect
        }
    }

    /// Log level used when `RUST_LOG` is not set.
    #[must_use]
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }

    /// Applies command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut PipelineConfig) {
        if self.force {
            config.force_update = true;
        }
        if let Some(max_results) = self.max_results {
            config.arxiv.max_results = max_results as usize;
        }
        if self.no_zotero {
            config.zotero.enabled = false;
        }
        if self.no_publish {
            config.zotero.publish = false;
        }
        if let Some(concurrency) = self.concurrency {
            config.fetch_concurrency = usize::from(concurrency);
        }
    }
}
