use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Parser)]
#[command(name = "offcache", about = "Offline asset cache worker")]
pub struct Cli {
    /// Path to the runtime configuration file (defaults to ./offcache.toml if present).
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Seed the static cache from the manifest against the configured origin.
    Install,
    /// List caches on disk with their entry counts.
    Status,
    /// Delete every cache immediately.
    Clear,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}
