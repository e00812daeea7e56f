use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serpentine_app::{RunOptions, run_online_pair, run_single};
use serpentine_core::ArenaConfig;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "serpentine",
    version,
    about = "Run the serpentine worm arena headlessly"
)]
struct Cli {
    /// JSON file with arena settings; missing keys keep their defaults.
    #[arg(long, env = "SERPENTINE_CONFIG")]
    config: Option<PathBuf>,
    /// RNG seed for a reproducible arena.
    #[arg(long)]
    seed: Option<u64>,
    /// Autonomous agent population (single-player only).
    #[arg(long)]
    bots: Option<usize>,
    /// Initial food count.
    #[arg(long)]
    food: Option<usize>,
    /// Maximum frames to run.
    #[arg(long, default_value_t = 600)]
    ticks: u64,
    /// Pace frames in real time at the configured tick rate.
    #[arg(long)]
    realtime: bool,
    /// Start a new run after game over this many times.
    #[arg(long, default_value_t = 0)]
    restarts: u32,
    /// Run two online peers connected by an in-process link instead of single-player.
    #[arg(long)]
    online: bool,
    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    dump_config: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = resolve_config(&cli)?;
    if cli.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let options = RunOptions {
        ticks: cli.ticks,
        realtime: cli.realtime,
        restarts: cli.restarts,
    };
    if cli.online {
        let (alpha, beta) = run_online_pair(config, &options)?;
        info!(?alpha, ?beta, "online pair finished");
    } else {
        let summary = run_single(config, &options)?;
        info!(?summary, "single-player run finished");
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn load_config(path: &Path) -> Result<ArenaConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn resolve_config(cli: &Cli) -> Result<ArenaConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ArenaConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.rng_seed = Some(seed);
    }
    if let Some(bots) = cli.bots {
        config.autonomous_target = bots;
    }
    if let Some(food) = cli.food {
        config.food_initial = food;
        config.food_floor = config.food_floor.min(food);
    }
    config
        .validate()
        .context("arena configuration rejected")?;
    Ok(config)
}
