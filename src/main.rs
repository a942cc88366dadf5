use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;

use bucketsync::config::{PullConfig, PushConfig};
use bucketsync::fs::{LocalFs, S3Store};
use bucketsync::sync::{Plan, RunReport, SyncDirection, SyncEngine, SyncOptions};

#[derive(Debug, Parser)]
#[command(name = "bucketsync", version, about = "Mirror directories to and from an S3-compatible bucket")]
struct Cli {
    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print the plan without changing anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Concurrent transfers (overrides Concurrency in the config)
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Print the run report as JSON and log as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload changed files and delete remote objects missing locally
    Push { config: PathBuf },
    /// Download objects missing or changed locally
    Pull { config: PathBuf },
    /// Show what a run would do
    Plan {
        #[arg(value_enum)]
        direction: Direction,
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Direction {
    Push,
    Pull,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing::subscriber::set_global_default(log_subscriber(cli.verbose, cli.json))
        .context("installing the log subscriber")?;

    let report = match cli.command {
        Command::Push { ref config } => run_push(&cli, config, cli.dry_run).await?,
        Command::Pull { ref config } => run_pull(&cli, config, cli.dry_run).await?,
        Command::Plan { direction, ref config } => {
            let report = match direction {
                Direction::Push => run_push(&cli, config, true).await?,
                Direction::Pull => run_pull(&cli, config, true).await?,
            };
            if !cli.json {
                if let Some(ref plan) = report.plan {
                    print_plan(plan);
                }
            }
            report
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    if let Some(err) = report.error {
        return Err(err).context(format!("{} run aborted", report.direction));
    }
    Ok(())
}

/// Log subscriber writing to stderr. `RUST_LOG` overrides the `-v` level.
fn log_subscriber(verbose: u8, json: bool) -> Box<dyn Subscriber + Send + Sync> {
    let filter = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        Box::new(builder.json().finish())
    } else {
        Box::new(builder.finish())
    }
}

fn apply_overrides(cli: &Cli, mut options: SyncOptions, dry_run: bool) -> SyncOptions {
    if let Some(concurrency) = cli.concurrency {
        options.concurrency = concurrency.max(1);
    }
    options.dry_run |= dry_run;
    options
}

async fn run_push(cli: &Cli, path: &Path, dry_run: bool) -> Result<RunReport> {
    let config = PushConfig::load(path).with_context(|| format!("loading {}", path.display()))?;
    let store = S3Store::new(&config.store.s3_settings())?;
    let engine = SyncEngine::new(
        Arc::new(LocalFs),
        Arc::new(store),
        apply_overrides(cli, config.options(), dry_run),
    );
    Ok(engine.push(&config.target()?).await)
}

async fn run_pull(cli: &Cli, path: &Path, dry_run: bool) -> Result<RunReport> {
    let config = PullConfig::load(path).with_context(|| format!("loading {}", path.display()))?;
    let store = S3Store::new(&config.store.s3_settings())?;
    let engine = SyncEngine::new(
        Arc::new(LocalFs),
        Arc::new(store),
        apply_overrides(cli, config.options(), dry_run),
    );
    Ok(engine.pull(&config.target()?).await)
}

fn print_plan(plan: &Plan) {
    for path in &plan.to_upload {
        println!("upload    {}", path);
    }
    for path in &plan.to_delete {
        println!("delete    {}", path);
    }
    for path in &plan.to_download {
        println!("download  {}", path);
    }
    if plan.is_empty() {
        println!("nothing to do ({} unchanged)", plan.unchanged);
    }
}

fn print_summary(report: &RunReport) {
    let stats = &report.stats;
    let mode = if report.dry_run { " (dry run)" } else { "" };

    match report.direction {
        SyncDirection::Push => println!(
            "push{}: {} local files, {} remote objects, {} uploaded, {} deleted, {} unchanged, {} failed",
            mode,
            stats.local_files,
            stats.remote_objects,
            stats.uploaded,
            stats.deleted,
            stats.unchanged,
            stats.failed
        ),
        SyncDirection::Pull => println!(
            "pull{}: {} remote objects, {} downloaded, {} unchanged, {} failed",
            mode, stats.remote_objects, stats.downloaded, stats.unchanged, stats.failed
        ),
    }
    println!(
        "transferred {} in {:.1}s",
        humansize::format_size(stats.bytes_transferred, humansize::BINARY),
        stats.duration_ms as f64 / 1000.0
    );

    for failure in report.failures() {
        eprintln!(
            "  failed {:?} {}: {}",
            failure.action,
            failure.key,
            failure.error.as_deref().unwrap_or("unknown error")
        );
    }
}
