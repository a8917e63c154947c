//! Command line front-end over [`Pipeline`]
//!
//! - `manifest-dl list` - show discovered items with names and depot counts
//! - `manifest-dl fetch <ITEM>... | --all` - run the pipeline for a selection
//!
//! Exit codes: 0 when a run completes (even with per-item failures), 1 on setup
//! failure, 130 when the run was stopped by a signal.

use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::types::{CooldownKind, Event, ItemId, ItemStatus, RunRequest, RunSummary};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Exit code for a run stopped by SIGINT/SIGTERM
pub const EXIT_CANCELLED: u8 = 130;

/// Fetch depot manifests for locally installed descriptors
#[derive(Debug, Parser)]
#[command(name = "manifest-dl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON configuration file; missing fields take their defaults
    #[arg(long, global = true, env = "MANIFEST_DL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host install directory; sets the descriptor directory and both output roots
    #[arg(long, global = true)]
    pub install_root: Option<PathBuf>,

    /// Descriptor directory (overrides the install root layout)
    #[arg(long, global = true)]
    pub descriptor_dir: Option<PathBuf>,

    /// Log debug output from the pipeline
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List discovered items
    List,
    /// Fetch manifests for the selected items
    Fetch(FetchArgs),
}

/// Arguments of `fetch`
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Items to fetch, in processing order
    #[arg(value_name = "ITEM_ID", required_unless_present = "all", conflicts_with = "all")]
    pub items: Vec<ItemId>,

    /// Fetch every discovered item
    #[arg(long)]
    pub all: bool,

    /// Key for the manifest service
    #[arg(long, env = "MANIFEST_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Pause between items, in seconds
    #[arg(long)]
    pub item_cooldown_secs: Option<u64>,

    /// First output root
    #[arg(long, requires = "secondary_root")]
    pub primary_root: Option<PathBuf>,

    /// Second output root
    #[arg(long, requires = "primary_root")]
    pub secondary_root: Option<PathBuf>,
}

/// How a command ended when it did not fail during setup
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Ran to the end
    Completed,
    /// Stopped by cancellation
    Cancelled,
}

impl Outcome {
    /// Process exit code for this outcome
    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::Completed => 0,
            Outcome::Cancelled => EXIT_CANCELLED,
        }
    }
}

impl Cli {
    /// Build the configuration from the config file and path overrides
    ///
    /// Precedence, lowest first: defaults, `--config`, `--install-root`,
    /// `--descriptor-dir`.
    pub fn resolve_config(&self) -> crate::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(root) = &self.install_root {
            config.apply_install_root(root);
        }
        if let Some(dir) = &self.descriptor_dir {
            config.scan.descriptor_dir = dir.clone();
        }
        Ok(config)
    }
}

/// Execute the parsed command
///
/// # Errors
/// Returns an error for setup failures; per-item failures are part of a completed run.
pub async fn run(cli: Cli, cancel: CancellationToken) -> anyhow::Result<Outcome> {
    let mut config = cli.resolve_config().context("failed to load configuration")?;

    match cli.command {
        Commands::List => {
            let pipeline = Pipeline::new(config)?;
            let items = pipeline.discover_with_names(&cancel).await?;
            for item in &items {
                println!(
                    "{:>10}  {}  ({} depots)",
                    item.id,
                    item.display_name(),
                    item.depots.len()
                );
            }
            Ok(if cancel.is_cancelled() {
                Outcome::Cancelled
            } else {
                Outcome::Completed
            })
        }
        Commands::Fetch(args) => {
            if let Some(secs) = args.item_cooldown_secs {
                config.cooldown.inter_item = Duration::from_secs(secs);
            }
            let pipeline = Pipeline::new(config)?;

            let item_ids = if args.all {
                pipeline.discover().await?.into_iter().map(|i| i.id).collect()
            } else {
                args.items
            };
            let mut request = RunRequest::new(item_ids, args.api_key);
            if let (Some(primary), Some(secondary)) = (args.primary_root, args.secondary_root) {
                request = request.with_roots(primary, secondary);
            }

            let renderer = tokio::spawn(render_events(pipeline.subscribe()));
            let result = pipeline.run(request, cancel).await;
            // The renderer ends once the pipeline (and its sender) is dropped
            drop(pipeline);
            renderer.await.ok();

            let summary = result?;
            print_summary(&summary);
            Ok(if summary.cancelled {
                Outcome::Cancelled
            } else {
                Outcome::Completed
            })
        }
    }
}

async fn render_events(mut rx: broadcast::Receiver<Event>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Some(line) = describe(&event) {
                    println!("{line}");
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::debug!(missed, "progress output fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// One progress line per event worth showing
fn describe(event: &Event) -> Option<String> {
    let line = match event {
        Event::ScanComplete { .. } => return None,
        Event::ItemStarted {
            item,
            name,
            index,
            total,
        } => format!("[{}/{}] {name} ({item})", index + 1, total),
        Event::ManifestMissing { depot, .. } => {
            format!("  depot {depot}: no public manifest, skipped")
        }
        Event::RateLimited { depot, delay_ms } => {
            format!("  depot {depot}: rate limited, waiting {}", seconds(*delay_ms))
        }
        Event::RetryScheduled {
            depot,
            attempt,
            remaining,
            delay_ms,
            error,
        } => format!(
            "  depot {depot}: attempt {attempt} failed ({error}), {remaining} left, retrying in {}",
            seconds(*delay_ms)
        ),
        Event::DepotStored { depot, manifest, .. } => {
            format!("  depot {depot}: stored manifest {manifest}")
        }
        Event::DepotFailed { depot, error, .. } => format!("  depot {depot}: failed: {error}"),
        Event::CooldownStarted {
            kind: CooldownKind::BetweenItems,
            delay_ms,
        } => format!("waiting {} before the next item", seconds(*delay_ms)),
        Event::CooldownStarted { .. } => return None,
        Event::ItemFinished {
            status,
            attempted,
            succeeded,
            skipped,
            failed,
            ..
        } => format!(
            "  {}: {succeeded}/{attempted} stored, {skipped} skipped, {failed} failed",
            status_label(status)
        ),
        Event::RunFinished { .. } => return None,
    };
    Some(line)
}

fn seconds(ms: u64) -> String {
    format!("{:.1}s", ms as f64 / 1000.0)
}

fn status_label(status: &ItemStatus) -> String {
    match status {
        ItemStatus::Completed => "done".into(),
        ItemStatus::NoDepots => "no depots".into(),
        ItemStatus::ResolutionFailed { error } => format!("skipped ({error})"),
        ItemStatus::Cancelled => "cancelled".into(),
    }
}

fn print_summary(summary: &RunSummary) {
    let elapsed = summary.finished_at - summary.started_at;
    println!();
    println!(
        "{} items, {} depots: {} stored, {} skipped, {} failed ({}s)",
        summary.items.len(),
        summary.attempted(),
        summary.succeeded(),
        summary.skipped(),
        summary.failed(),
        elapsed.num_seconds()
    );
    if summary.cancelled {
        println!("run cancelled before all items were processed");
    }
}
