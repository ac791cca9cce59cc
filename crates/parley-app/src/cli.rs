use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "parley", about = "Realtime change feeds and presence for Parley chat")]
pub struct Cli {
    /// Config file (defaults to the platform config dir).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. "parley=debug". Overrides the config file and RUST_LOG.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Use in-process backends instead of the hosted project.
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print every change on a table as a JSON line.
    Watch {
        #[arg(long)]
        table: String,
        /// insert, update, delete, or all.
        #[arg(long, default_value = "all")]
        event: String,
        /// Row filter in `column=op.value` form.
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        schema: Option<String>,
    },
    /// Go online, optionally set a status, and follow other users.
    Presence {
        /// online, idle, or dnd.
        #[arg(long)]
        status: Option<String>,
        /// User id to follow; repeatable.
        #[arg(long = "watch")]
        watch: Vec<String>,
    },
    /// Follow one channel's messages, starting from a full fetch.
    Tail {
        #[arg(long)]
        channel: String,
        /// Messages printed from the initial fetch.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}
