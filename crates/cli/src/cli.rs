use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mytunes")]
#[command(author, version, about = "Audio library tagging and batch conversion")]
pub struct Cli {
    /// Path to config file (defaults to $MYTUNES_CONFIG, then ./mytunes.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert or copy every file under a source tree into an output directory
    Convert {
        /// Source root (defaults to library.root_path)
        source: Option<PathBuf>,

        /// Output directory (defaults to library.sync_path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of parallel workers
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Keep destination files that already exist
        #[arg(long)]
        no_overwrite: bool,

        /// Verify byte copies with sha256
        #[arg(long)]
        verify: bool,

        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report encoder availability and versions
    Check,

    /// Print the tags of an audio file
    Tags {
        /// File to read
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
