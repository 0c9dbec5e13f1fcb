//! Lockstep CLI
//!
//! Animate several terminal progress bars from one shared frame loop.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod demo;

use config::{config_path, LockstepConfig};

#[derive(Parser)]
#[command(name = "lockstep")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Lockstep animation demo", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Animate progress bars in lockstep
    Run {
        /// Config file or directory containing lockstep.toml
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Run duration in milliseconds
        #[arg(short, long)]
        duration_ms: Option<u64>,

        /// Frame rate of the frame thread
        #[arg(long)]
        fps: Option<u32>,

        /// Number of bars
        #[arg(short, long)]
        bars: Option<usize>,

        /// Number of runs to play back to back
        #[arg(short, long)]
        repeat: Option<u32>,
    },

    /// Write a default lockstep.toml
    Init {
        /// Target file or directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Run {
            config,
            duration_ms,
            fps,
            bars,
            repeat,
        } => cmd_run(config.as_deref(), duration_ms, fps, bars, repeat),

        Commands::Init { path, force } => cmd_init(&path, force),
    }
}

fn cmd_run(
    config_file: Option<&Path>,
    duration_ms: Option<u64>,
    fps: Option<u32>,
    bars: Option<usize>,
    repeat: Option<u32>,
) -> Result<()> {
    let mut config = match config_file {
        Some(path) => LockstepConfig::load(path)?,
        None => LockstepConfig::default(),
    };

    if let Some(duration_ms) = duration_ms {
        config.animator.duration_ms = duration_ms;
    }
    if let Some(fps) = fps {
        config.animator.target_fps = fps;
    }
    if let Some(bars) = bars {
        config.demo.bars = bars;
    }
    if let Some(repeat) = repeat {
        config.demo.repeat = repeat;
    }
    config.validate()?;

    let summaries = demo::run(&config)?;
    let frames: u64 = summaries.iter().map(|s| s.frames).sum();
    info!("{} runs, {} frames total", summaries.len(), frames);

    Ok(())
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    let target = config_path(path);

    if target.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite it.",
            target.display()
        );
    }

    fs::write(&target, LockstepConfig::default().to_toml()?)?;
    info!("Wrote {}", target.display());

    Ok(())
}
