use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "tagsmith",
    version,
    about = "Rebuild release tags and branches for an imported svn mirror"
)]
pub struct Cli {
    /// Path to the git repository
    #[arg(long, global = true, default_value = ".")]
    pub repo: PathBuf,

    /// Reconciliation settings (JSON); built-in defaults when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Checkpoint location; a .json path selects the JSON format,
    /// anything else is a SQLite database
    #[arg(long, global = true)]
    pub checkpoint: Option<PathBuf>,

    /// Print per-phase timings instead of progress bars
    #[arg(long, global = true)]
    pub profile: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Collect branch histories and survey new commits into the checkpoint
    Survey,
    /// Build subhistories from the checkpoint and print them
    Index {
        /// Dump the index as JSON
        #[arg(long)]
        json: bool,
    },
    /// Survey, index and print the release table without writing anything
    Reconcile,
    /// Run every phase and write tags and branches into the repository
    Synthesize,
    /// Write the checkpoint out as JSON
    Export {
        /// Destination file
        path: PathBuf,
    },
}
