use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Data directory (default: $SIFT_DATA, then ~/.sift)
    #[clap(short = 'd', long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the search daemon (detached; reports load progress)
    Start {},

    /// Stop the running daemon
    Stop {},

    /// Show daemon status
    Status {},

    /// Filtered similarity search.
    ///
    /// The query is a V|T pipeline: everything before the first
    /// unescaped `|` seeds the vector search, everything after it is a
    /// text filter (`-term` excludes, "double quotes" keep phrases).
    Search {
        query: String,

        /// Number of results (1-100)
        #[clap(short = 'k', long, default_value = "10")]
        top_k: usize,

        /// Scoring mode: content, reasoning, summary, average, maximum, minimum
        #[clap(short, long, default_value = "content")]
        mode: String,

        /// Comma-separated space weights for average mode, e.g. "0.7,0.2,0.1"
        #[clap(long)]
        weights: Option<String>,

        /// Only posts on or after this date/time
        #[clap(long)]
        from: Option<String>,

        /// Only posts on or before this date/time
        #[clap(long)]
        to: Option<String>,

        /// Only posts by this author (repeatable)
        #[clap(short, long)]
        user: Vec<String>,

        /// Drop posts by this author (repeatable)
        #[clap(short = 'x', long)]
        exclude_user: Vec<String>,

        /// Only authors with at least this many posts
        #[clap(long)]
        min_posts: Option<u64>,

        /// Only authors with at most this many posts
        #[clap(long)]
        max_posts: Option<u64>,
    },

    /// Raw similarity ranking, no filters, no dedup.
    /// Without --top-k this walks the entire archive (streamed).
    Vector {
        query: String,

        #[clap(short = 'k', long)]
        top_k: Option<usize>,

        #[clap(short, long, default_value = "content")]
        mode: String,
    },

    /// Plain text search, newest first
    Text {
        terms: String,

        #[clap(short, long)]
        limit: Option<usize>,

        /// Text source: content, reasoning, summary
        #[clap(short, long)]
        source: Option<String>,
    },

    /// Database statistics
    Stats {},

    /// Authors by post count
    Users {
        #[clap(short, long)]
        limit: Option<usize>,
    },

    /// This is for internal use only!
    /// Runs the daemon process in the foreground; `start` spawns it.
    #[clap(hide = true)]
    Daemon {},
}
