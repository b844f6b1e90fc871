//! # Smart Harvest CLI (`harvest`)
//!
//! ## Usage
//!
//! ```bash
//! harvest --config ./config/harvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest run` | Run a multi-session harvest |
//! | `harvest report` | Analyse the persisted corpus and session history |
//! | `harvest duplicates` | List titles shared by more than one item |
//! | `harvest plan` | Preview the continuation for a session |
//!
//! A missing config file is not an error: every setting has a default.
//! Logs go to stderr (`RUST_LOG` or `--verbose` to tune), command output to
//! stdout.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use smart_harvest::collector::build_collector;
use smart_harvest::config::{self, Config};
use smart_harvest::orchestrator::{HarvestOrchestrator, HarvestRun};
use smart_harvest::progress::{format_duration, ProgressMode};
use smart_harvest::report;
use smart_harvest::store::JsonFileStore;

/// Smart Harvest CLI — paced multi-session collection with a deduplicated
/// corpus.
#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Smart Harvest — paced multi-session collection with a deduplicated corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/harvest.toml`. Defaults apply when the file
    /// does not exist.
    #[arg(long, global = true, default_value = "./config/harvest.toml")]
    config: PathBuf,

    /// Debug-level logging for smart_harvest (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a multi-session harvest.
    ///
    /// Stops when the corpus reaches `--target` items, after `--sessions`
    /// sessions, or on Ctrl-C. State is saved after every session.
    Run {
        /// Maximum number of sessions in this run.
        #[arg(long, default_value_t = 5)]
        sessions: usize,

        /// Stop once the corpus holds this many items.
        #[arg(long, default_value_t = 300)]
        target: usize,

        /// Lower bound of the base gap between sessions, in seconds.
        #[arg(long)]
        gap_min: Option<u64>,

        /// Upper bound of the base gap between sessions, in seconds.
        #[arg(long)]
        gap_max: Option<u64>,

        /// Progress on stderr: off, human, or json. Default: human when
        /// stderr is a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,

        /// Seed offsets, scroll budgets and gaps for a reproducible run.
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Analyse the persisted corpus and session history.
    Report,

    /// List titles shared by more than one item.
    Duplicates,

    /// Preview the continuation the planner would choose.
    Plan {
        /// Zero-based session index. Defaults to the next session.
        #[arg(long)]
        session: Option<usize>,
    },
}

fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("smart_harvest={}", level).parse()?),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let mut cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Run {
            sessions,
            target,
            gap_min,
            gap_max,
            progress,
            seed,
        } => {
            if let Some(secs) = gap_min {
                cfg.schedule.gap_floor_secs = secs;
            }
            if let Some(secs) = gap_max {
                cfg.schedule.gap_ceiling_secs = secs;
            }
            cfg.validate()?;
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let run = run_harvest(&cfg, sessions, target, progress, seed).await?;
            print_summary(&cfg, &run);
        }
        Commands::Report => report::run_report(&cfg)?,
        Commands::Duplicates => report::run_duplicates(&cfg)?,
        Commands::Plan { session } => report::run_plan(&cfg, session)?,
    }

    Ok(())
}

async fn run_harvest(
    cfg: &Config,
    sessions: usize,
    target: usize,
    progress: ProgressMode,
    seed: Option<u64>,
) -> Result<HarvestRun> {
    let collector = build_collector(cfg)?;
    let store = Arc::new(JsonFileStore::new(&cfg.state.path));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current session");
            on_interrupt.cancel();
        }
    });

    let mut orchestrator = HarvestOrchestrator::from_config(cfg, collector, store)
        .with_observer(progress.observer())
        .with_cancellation(cancel);
    if let Some(seed) = seed {
        orchestrator = orchestrator.with_seed(seed);
    }
    Ok(orchestrator.run(sessions, target).await?)
}

fn print_summary(cfg: &Config, run: &HarvestRun) {
    let totals = run.state.totals();
    println!("Harvest finished: {}", run.stop_reason);
    println!(
        "  Sessions:      {} completed, {} failed",
        run.completed_sessions, run.failed_sessions
    );
    println!("  New items:     {}", run.new_items);
    println!("  Corpus:        {}", run.state.corpus().size());
    println!("  Sessions run:  {} (all time)", totals.sessions_run);
    println!("  Best score:    {}", totals.best_session_score);
    println!("  Elapsed:       {}", format_duration(run.elapsed.as_secs()));
    println!("  State:         {}", cfg.state.path.display());
}
