//! Command-line surface: one subcommand per stage plus `status`.

pub mod stages;
pub mod stats;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "papercast", version, about = "Turns daily research papers into narrated podcast episodes")]
pub struct Cli {
    /// Path to config.yaml
    #[arg(long, global = true, env = "PAPERCAST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Discover new papers and download their documents
    Acquire(AcquireArgs),
    /// Write scripts, synthesize voices and mix episodes
    Synthesize(SynthesizeArgs),
    /// Upload finished episodes
    Publish(PublishArgs),
    /// Show per-stage progress and backlog
    Status,
}

impl Command {
    /// Seconds to sleep after the run before exiting.
    pub fn wait_seconds(&self) -> u64 {
        match self {
            Self::Acquire(a) => a.run.wait,
            Self::Synthesize(a) => a.run.wait,
            Self::Publish(a) => a.run.wait,
            Self::Status => 0,
        }
    }
}

/// Options shared by every stage command.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Reprocess this item regardless of its flags
    #[arg(long)]
    pub item_id: Option<String>,

    /// Seconds to sleep after the run before exiting
    #[arg(long, default_value_t = 0)]
    pub wait: u64,
}

#[derive(Debug, Clone, Args)]
pub struct AcquireArgs {
    /// Listing date (YYYY-MM-DD); latest day when omitted
    #[arg(long)]
    pub date: Option<NaiveDate>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Debug, Clone, Args)]
pub struct SynthesizeArgs {
    /// With --item-id, also regenerate the script
    #[arg(long, requires = "item_id")]
    pub remove_script: bool,

    /// Keep per-line clips after the mixdown is written
    #[arg(long)]
    pub keep_audio: bool,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Debug, Clone, Args)]
pub struct PublishArgs {
    #[command(flatten)]
    pub run: RunArgs,
}
