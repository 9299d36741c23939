use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reliquery_core::Palette;
use reliquery_storage::{ColorAssigner, FileColorStateStore};
use reliquery_sync::{SheetLayout, SyncConfig, SyncError, SyncRunSummary};
use tracing::{error, warn};

mod credentials;
mod logging;

#[derive(Debug, Parser)]
#[command(name = "reliquery")]
#[command(about = "Keeps the IT onboarding sheet in step with the HR new-hire roster")]
struct Cli {
    /// Sheet API key
    #[arg(short = 'a', long, global = true)]
    apikey: Option<String>,
    /// Text file holding the API key (".txt" may be omitted)
    #[arg(short = 'f', long, global = true)]
    keyfile: Option<PathBuf>,
    /// Write a fresh debug-level log to reliquery.debug
    #[arg(short, long, global = true)]
    debug: bool,
    /// Mirror progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[arg(long, global = true, default_value = ".")]
    log_dir: PathBuf,
    /// Print the run summary as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one reconciliation pass (default)
    Sync,
    /// Show or reset the persisted cohort color cursor
    ColorState {
        #[arg(long)]
        reset: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_dir, cli.debug, cli.verbose)?;

    let config = SyncConfig::from_env();
    match cli.command.as_ref().unwrap_or(&Commands::Sync) {
        Commands::Sync => {
            let api_key = credentials::resolve_api_key(cli.apikey.clone(), cli.keyfile.as_deref())?;
            if !cli.json {
                eprintln!("Working... please wait");
            }
            let summary = reliquery_sync::run_sync_once_from_env(api_key)
                .await
                .map_err(|err| {
                    error!(error = %format!("{err:#}"), "sync run aborted");
                    if err.is::<SyncError>() {
                        err.context(
                            "could not retrieve sheet data; check that the service is up and the API key has not expired",
                        )
                    } else {
                        err
                    }
                })?;
            print_summary(&summary, cli.json)?;
        }
        Commands::ColorState { reset } => {
            let palette = match SheetLayout::load(&config.layout_path) {
                Ok(layout) => layout.palette()?,
                Err(err) => {
                    warn!(error = %err, "layout unavailable; using default palette");
                    Palette::default()
                }
            };
            let store = Arc::new(FileColorStateStore::new(config.color_state_path.clone()));
            let assigner = ColorAssigner::new(store.clone(), palette);
            if *reset {
                assigner
                    .reset()
                    .await
                    .with_context(|| format!("resetting {}", store.path().display()))?;
            }
            let state = assigner.current().await;
            let color = assigner.palette().color_at(state.color_index);
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "state": state, "current_color": color.0 })
                );
            } else {
                println!(
                    "color state: {} (current color {}) at {}",
                    state.encode(),
                    color,
                    store.path().display()
                );
            }
        }
    }

    Ok(())
}

fn print_summary(summary: &SyncRunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    let elapsed = (summary.finished_at - summary.started_at).num_milliseconds() as f64 / 1000.0;
    println!(
        "sync complete: run_id={} archived={} harmonized={} created={} deleted={} repainted={} failed={}",
        summary.run_id,
        summary.archived,
        summary.dates_harmonized,
        summary.created,
        summary.deleted,
        summary.colors_repaired,
        summary.failed_calls
    );
    if !summary.skipped_steps.is_empty() {
        println!("skipped: {}", summary.skipped_steps.join(", "));
    }
    println!("finished in {elapsed:.2}s");
    Ok(())
}
