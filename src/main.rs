use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use videoforge::config::Config;
use videoforge::store::JobStore;
use videoforge::{print_summary, run_job_with_id};

#[derive(Parser)]
#[command(name = "videoforge")]
#[command(version, about = "Assemble narrated videos from a JSON specification")]
#[command(
    long_about = "Render a JSON specification of video segments (visuals, voice-overs, \
transitions, timed subtitles) into a single MP4 using FFmpeg."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Render a specification file into a video
    Render {
        /// Input specification (JSON)
        spec: PathBuf,

        /// Output directory for the final video
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Suppress progress bars and the summary table
        #[arg(short, long)]
        quiet: bool,
    },
    /// Look up a job in the local job store
    Status {
        /// Job identifier returned by render
        job_id: String,
    },
    /// Remove stale temp directories left behind by crashed jobs
    Cleanup,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load().context("Failed to load configuration")?;

    match cli.command {
        Command::Cleanup => {
            config.validate().context("Configuration validation failed")?;
            let removed = videoforge::resource::sweep_stale_dirs(&config)?;
            println!("Removed {} stale temp directories.", removed);
            Ok(())
        }
        Command::Status { job_id } => {
            let store = JobStore::new(&config.data_dir);
            match store.get(&job_id)? {
                Some(record) => {
                    println!("{}", serde_json::to_string_pretty(&record)?);
                    Ok(())
                }
                None => anyhow::bail!("Job not found: {}", job_id),
            }
        }
        Command::Render {
            spec,
            output_dir,
            quiet,
        } => {
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            config.validate().context("Configuration validation failed")?;

            if !spec.exists() {
                anyhow::bail!("Specification file not found: {}", spec.display());
            }
            let contents = std::fs::read_to_string(&spec)
                .with_context(|| format!("Failed to read {}", spec.display()))?;
            let spec_json: serde_json::Value =
                serde_json::from_str(&contents).context("Specification is not valid JSON")?;

            // Sweep leftovers from earlier runs before starting new work.
            let swept = videoforge::resource::sweep_stale_dirs(&config)?;
            if swept > 0 {
                info!("removed {} stale temp directories", swept);
            }

            // Ctrl+C cancels the job; a second press force-quits.
            let cancelled = Arc::new(AtomicBool::new(false));
            let cancelled_clone = cancelled.clone();
            ctrlc::set_handler(move || {
                if cancelled_clone.load(Ordering::Relaxed) {
                    std::process::exit(1);
                }
                eprintln!("\nReceived Ctrl+C, cancelling... (press again to force quit)");
                cancelled_clone.store(true, Ordering::Relaxed);
            })
            .ok();

            let job_id = Uuid::new_v4().simple().to_string();
            let store = JobStore::new(&config.data_dir);
            if let Err(e) = store.create(&job_id) {
                error!("could not register job in store: {}", e);
            }

            match run_job_with_id(spec_json, &config, cancelled, !quiet, job_id.clone()).await {
                Ok(outcome) => {
                    store.mark_done(&job_id, &outcome.result_url).ok();
                    if !quiet {
                        print_summary(&outcome);
                    }
                    Ok(())
                }
                Err(e) => {
                    store.mark_failed(&job_id, &e.to_string()).ok();
                    error!("Job failed: {}", e);
                    Err(anyhow::anyhow!("{}", e))
                }
            }
        }
    }
}
