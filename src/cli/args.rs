use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "framefinder")]
#[command(about = "Semantic video search: index a video, then resolve text queries to timestamps")]
#[command(version)]
pub struct Args {
    /// Path to a framefinder.toml config file.
    #[arg(short, long, env = "FRAMEFINDER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP service
    Serve,

    /// Chunk, embed, and index a local video file
    Process {
        /// Path to a readable video file
        file: PathBuf,
    },

    /// Resolve a free-text query against the active index
    Search {
        query: String,

        /// Number of ranked time ranges to print
        #[arg(long, default_value_t = 1)]
        top_k: usize,
    },

    /// Show the active index and processed videos
    Status,
}
