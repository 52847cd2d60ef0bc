use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use vidget_engine::TransferKind;

#[derive(Parser, Debug)]
#[command(name = "vidget")]
#[command(about = "Resumable downloader for media files and HLS streams")]
#[command(version)]
pub struct Args {
    /// Config file (defaults to <config dir>/vidget/config.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Retries after the first attempt
    #[arg(long, global = true)]
    pub retries: Option<u32>,

    /// Base retry delay in milliseconds
    #[arg(long, global = true)]
    pub retry_delay: Option<u64>,

    /// Connection timeout in seconds
    #[arg(long, global = true)]
    pub connect_timeout: Option<u64>,

    /// Read (idle) timeout in seconds, 0 disables it
    #[arg(long, global = true)]
    pub read_timeout: Option<u64>,

    /// TCP keep-alive interval in seconds, 0 disables it
    #[arg(long, global = true)]
    pub keep_alive: Option<u64>,

    /// DNS server used instead of the system resolver (IP or IP:PORT)
    #[arg(long, global = true)]
    pub dns: Option<String>,

    /// Proxy URL (http, https, socks5, socks5h), credentials allowed
    #[arg(long, global = true)]
    pub proxy: Option<String>,

    /// Disable progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Download HLS outputs again even when a non-empty file already exists
    /// (single files always resume or verify instead)
    #[arg(long, global = true)]
    pub overwrite: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download one URL
    Get {
        /// Source URL
        url: String,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Transfer strategy
        #[arg(long, value_enum, default_value_t = KindArg::Auto)]
        kind: KindArg,
    },

    /// Download every job of a TOML manifest, one after another
    Batch {
        /// Manifest with [[job]] entries
        manifest: PathBuf,

        /// Keep going after a failed job
        #[arg(long)]
        keep_going: bool,
    },
}

#[derive(ValueEnum, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KindArg {
    /// Guess from the URL extension
    #[default]
    Auto,
    /// Single file with range resume
    File,
    /// HLS playlist
    Hls,
}

impl KindArg {
    pub fn resolve(self) -> Option<TransferKind> {
        match self {
            KindArg::Auto => None,
            KindArg::File => Some(TransferKind::File),
            KindArg::Hls => Some(TransferKind::Hls),
        }
    }
}
