//! CLI argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "hookscope",
    about = "Inspect and maintain hookscope's on-disk caches",
    after_help = "\
EXAMPLES:
    hookscope --cache-dir ./cache symbols              List cached resolutions
    hookscope --data-root /sdcard/Android/data \\
              --package com.example.game request 1000  Show a captured request
    hookscope --cache-dir ./cache clear --requests     Reset all discovery state"
)]
pub struct Args {
    /// Cache directory to operate on
    #[arg(long, value_name = "DIR", conflicts_with_all = ["data_root", "package"])]
    pub cache_dir: Option<PathBuf>,

    /// Per-app data root; combined with --package to locate the cache
    #[arg(long, value_name = "DIR", requires = "package")]
    pub data_root: Option<PathBuf>,

    /// Application package name
    #[arg(long, requires = "data_root")]
    pub package: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print cached symbol resolutions
    Symbols,
    /// List dynamic exports of a module image
    Exports {
        /// Path to the `.so` file
        path: PathBuf,
        /// Only show names matching this regex
        #[arg(long)]
        pattern: Option<String>,
    },
    /// Print a captured request record
    Request {
        /// Anchor request id
        #[arg(default_value = "1000")]
        id: i32,
    },
    /// Print the currency modification flags
    Flags,
    /// Delete the symbol cache and state flags
    Clear {
        /// Also remove captured request records
        #[arg(long)]
        requests: bool,
    },
}
