//! turnlimit - Bounded conversation turns with scroll-stable reveal
//!
//! Usage:
//!   turnlimit simulate            - Replay a synthetic conversation and report
//!   turnlimit config              - Show the effective configuration
//!   turnlimit config --init       - Write a default configuration file
//!   turnlimit config --check      - Validate the configuration file

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use turnlimit::{
    page::{MemoryDocument, ScrollSource, SharedDocument},
    session::{Session, SessionReport},
    Config, Error,
};

#[derive(Parser)]
#[command(name = "turnlimit")]
#[command(author = "turnlimit Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bounded conversation turns with scroll-stable reveal")]
struct Cli {
    /// Configuration file path (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a synthetic conversation against an in-memory page
    Simulate {
        /// Number of prompt/answer turns to stream in
        #[arg(long, default_value_t = 8)]
        turns: usize,

        /// Lines of markup per block
        #[arg(long, default_value_t = 12)]
        lines: usize,

        /// Scroll offset to jump to when revealing older turns
        #[arg(long, default_value_t = 50.0)]
        scroll_to: f64,

        /// How many times to scroll back up
        #[arg(long, default_value_t = 2)]
        reveals: usize,
    },

    /// Show or manage the configuration file
    Config {
        /// Write a default configuration file
        #[arg(long)]
        init: bool,

        /// Overwrite an existing file with --init
        #[arg(long)]
        force: bool,

        /// Validate the configuration and exit
        #[arg(long)]
        check: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .as_ref()
        .map(expand_tilde)
        .unwrap_or_else(Config::default_path);

    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Failed to set subscriber");
    }

    if let Err(e) = run_command(cli.command, &config_path, config) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Load the config file if present, otherwise defaults plus environment
fn load_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        Config::load(path).with_context(|| format!("Failed to load config from {:?}", path))
    } else {
        Config::from_env().context("Invalid configuration from environment")
    }
}

fn run_command(command: Commands, config_path: &Path, config: Config) -> anyhow::Result<()> {
    match command {
        Commands::Simulate {
            turns,
            lines,
            scroll_to,
            reveals,
        } => cmd_simulate(&config, turns, lines, scroll_to, reveals),

        Commands::Config { init, force, check } => {
            cmd_config(config_path, &config, init, force, check)
        }
    }
}

fn cmd_simulate(
    config: &Config,
    turns: usize,
    lines: usize,
    scroll_to: f64,
    reveals: usize,
) -> anyhow::Result<()> {
    info!(
        "Simulating {} turns, keeping {} pairs, revealing {} per scroll",
        turns, config.limiter.max_pairs, config.limiter.reveal_batch_size
    );

    let runtime = tokio::runtime::Runtime::new().map_err(|e| Error::Internal(e.to_string()))?;
    let report = runtime.block_on(simulate(config, turns, lines, scroll_to, reveals))?;

    println!("Simulation Summary");
    println!("==================");
    println!("Eviction runs: {}", report.limiter.eviction_runs);
    println!("Pairs evicted: {}", report.limiter.pairs_evicted);
    println!("Restoration runs: {}", report.limiter.restoration_runs);
    println!("Pairs restored: {}", report.limiter.pairs_restored);
    println!("Scroll corrections: {}", report.limiter.scroll_corrections);
    println!("Pairs skipped: {}", report.limiter.pairs_skipped);
    println!(
        "Still cached: {} pairs ({} bytes)",
        report.cache.pair_count, report.cache.cached_bytes
    );

    Ok(())
}

async fn simulate(
    config: &Config,
    turns: usize,
    lines: usize,
    scroll_to: f64,
    reveals: usize,
) -> turnlimit::Result<SessionReport> {
    let doc = SharedDocument::new(MemoryDocument::new());
    let (session, handle) = Session::new(doc.clone(), config);
    let task = tokio::spawn(session.run());

    let timing = &config.timing;
    let stream_gap = Duration::from_millis(timing.content_debounce_ms / 4 + 1);
    let quiet = timing.content_debounce_ms.max(timing.scroll_debounce_ms);
    let settle = Duration::from_millis(timing.ready_poll_interval_ms + 2 * quiet);

    for turn in 0..turns {
        {
            let mut page = doc.lock();
            page.append_pair(block("prompt", turn, lines), block("answer", turn, lines));
            page.scroll_to_bottom();
        }
        tokio::time::sleep(stream_gap).await;
    }
    tokio::time::sleep(settle).await;

    println!(
        "After streaming: {} blocks live, scroll offset {:.0}",
        doc.lock().len(),
        doc.scroll_offset()
    );

    for step in 1..=reveals {
        doc.lock().set_scroll_offset(scroll_to);
        tokio::time::sleep(settle).await;
        println!(
            "After reveal {}: {} blocks live, scroll offset {:.0}",
            step,
            doc.lock().len(),
            doc.scroll_offset()
        );
    }

    let detached = doc.lock().detached_len();
    if detached > 0 {
        warn!("{} detached blocks left behind", detached);
    }

    handle.shutdown();
    task.await.map_err(|e| Error::Internal(e.to_string()))?
}

/// Synthetic block markup of `lines` lines
fn block(kind: &str, turn: usize, lines: usize) -> String {
    let mut markup = format!("<article data-role=\"{}\" data-turn=\"{}\">", kind, turn);
    for line in 1..lines {
        markup.push_str(&format!("\n  <p>{} {} line {}</p>", kind, turn, line));
    }
    markup.push_str("</article>");
    markup
}

fn cmd_config(
    config_path: &Path,
    config: &Config,
    init: bool,
    force: bool,
    check: bool,
) -> anyhow::Result<()> {
    if init {
        if config_path.exists() && !force {
            anyhow::bail!("{:?} already exists (use --force to overwrite)", config_path);
        }
        Config::default().save(config_path)?;
        info!("Configuration saved to {:?}", config_path);
        return Ok(());
    }

    if check {
        config.validate()?;
        println!("Configuration OK: {:?}", config_path);
        return Ok(());
    }

    println!("# {:?}", config_path);
    print!("{}", serde_yaml::to_string(config).map_err(Error::from)?);
    Ok(())
}

/// Expand ~ to home directory
fn expand_tilde(path: &PathBuf) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.clone()
}
