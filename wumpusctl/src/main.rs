// Wumpus DQN Control CLI
// Train, evaluate and inspect agents for the Hunt the Wumpus grid world

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod rl_commands;

#[derive(Parser)]
#[command(name = "wumpusctl")]
#[command(about = "Wumpus DQN Control CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a DQN agent
    Train {
        /// JSON file with `agent`, `env` and `trainer` sections
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of training episodes
        #[arg(long)]
        episodes: Option<usize>,

        /// Seed for the agent and the world
        #[arg(long)]
        seed: Option<u64>,

        /// Checkpoint file, written periodically and at the end
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Where to write the training results JSON
        #[arg(long)]
        results: Option<PathBuf>,

        /// Continue from the checkpoint instead of starting fresh
        #[arg(long, requires = "checkpoint")]
        resume: bool,
    },

    /// Play greedy episodes with a saved agent
    Evaluate {
        /// Checkpoint to load
        #[arg(long)]
        checkpoint: PathBuf,

        /// JSON config whose `env` section describes the world
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of episodes
        #[arg(short = 'n', long, default_value = "10")]
        episodes: usize,

        /// Seed for the world
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Summarize a checkpoint
    Inspect {
        /// Checkpoint to read
        #[arg(long)]
        checkpoint: PathBuf,

        /// Number of recent episodes to summarize
        #[arg(short, long, default_value = "100")]
        window: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    rl_commands::handle_command(cli.command).await
}
