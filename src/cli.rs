use clap::Parser;
use std::path::PathBuf;

/// Signal-driven spot trading agent.
#[derive(Debug, Parser)]
#[command(name = "spotter", version, about)]
pub struct Cli {
    /// Path to the configuration file (defaults to config/spotter.toml)
    #[arg(short, long, env = "SPOTTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Run in dev mode: full lifecycle, no orders reach any exchange
    #[arg(short, long)]
    pub dev: bool,
}
