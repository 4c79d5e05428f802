use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "tome", version, about = "Keeps a book catalog in sync with the files on disk")]
pub struct Cli {
    /// Config file to load instead of the one in the platform config directory.
    #[arg(long, global = true, env = "TOME_CONFIG")]
    pub config: Option<PathBuf>,
    /// Log more (repeat for even more). Ignored when `RUST_LOG` is set.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage libraries.
    #[command(subcommand)]
    Library(LibraryCommand),
    /// Queue a scan of one library, or of every library.
    Scan {
        #[arg(long)]
        library: Option<i64>,
        /// Run the scan here and wait for it instead of leaving it to a worker.
        #[arg(long)]
        wait: bool,
    },
    /// Run the worker pool until interrupted.
    Worker,
    /// Inspect and control jobs.
    #[command(subcommand)]
    Job(JobCommand),
    /// Move a book's files to where its metadata says they belong.
    Organize(OrganizeArgs),
    #[command(subcommand)]
    People(PeopleCommand),
    #[command(subcommand)]
    Series(SeriesCommand),
    /// Remove people and series nothing refers to anymore.
    Cleanup {
        #[arg(long)]
        library: Option<i64>,
    },
}

#[derive(Debug, Subcommand)]
pub enum LibraryCommand {
    Add {
        name: String,
        /// Root folders; repeat for more than one.
        #[arg(long = "path", required = true)]
        paths: Vec<PathBuf>,
        /// Let tome move and rename files to match their metadata.
        #[arg(long)]
        organize: bool,
        #[arg(long, default_value = "book")]
        cover_aspect_ratio: String,
    },
    List,
    Show {
        id: i64,
    },
}

#[derive(Debug, Subcommand)]
pub enum JobCommand {
    Show {
        id: i64,
    },
    /// Print a job's log.
    Logs {
        id: i64,
        /// Keep printing new lines until the job finishes.
        #[arg(short, long)]
        follow: bool,
    },
    Cancel {
        id: i64,
    },
    List {
        #[arg(long)]
        library: Option<i64>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct OrganizeArgs {
    /// Organize one book right away.
    #[arg(long)]
    pub book: Option<i64>,
    /// Queue a job that organizes a whole library.
    #[arg(long)]
    pub library: Option<i64>,
}

#[derive(Debug, Subcommand)]
pub enum PeopleCommand {
    /// Fold SOURCE into TARGET.
    Merge { target: i64, source: i64 },
    Rename { id: i64, name: String },
}

#[derive(Debug, Subcommand)]
pub enum SeriesCommand {
    /// Fold SOURCE into TARGET.
    Merge { target: i64, source: i64 },
}
