//! Command-line interface for snapmigrate

use crate::retention::RetentionPolicy;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "snapmigrate")]
#[command(about = "Migrate ZFS snapshots into restic repositories")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Prefix for restic repositories; the dataset name is appended
    #[arg(short = 'r', long, global = true, env = "SNAPMIGRATE_REPO_PREFIX")]
    pub repo_prefix: Option<String>,

    /// Prefix removed from each dataset name before it is used in the repository, e.g. backup01
    #[arg(short = 'c', long, global = true, env = "SNAPMIGRATE_COMMON_PREFIX", default_value = "")]
    pub common_prefix: String,

    /// Path to the restic password file
    #[arg(short = 'p', long, global = true, env = "SNAPMIGRATE_PASSWORD_FILE")]
    pub password_file: Option<PathBuf>,

    /// Only report what would be migrated
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Back up a single snapshot
    SingleSnapshot {
        /// The name of the dataset to back up
        dataset: String,

        /// The name of the snapshot to back up
        snapshot: String,

        /// Archive id of the parent snapshot
        #[arg(short = 'P', long)]
        parent: Option<String>,
    },

    /// Back up the next snapshot of a dataset
    NextSnapshotInDataset {
        /// The name of the dataset to back up
        dataset: String,

        #[command(flatten)]
        retention: RetentionArgs,
    },

    /// Back up all remaining snapshots of a dataset
    Dataset {
        /// The name of the dataset to back up
        dataset: String,

        #[command(flatten)]
        retention: RetentionArgs,
    },

    /// Show the migration state of every snapshot of a dataset
    Status {
        /// The name of the dataset to inspect
        dataset: String,

        #[command(flatten)]
        retention: RetentionArgs,

        /// Output format: "pretty", "json"
        #[arg(long, default_value = "pretty")]
        format: String,
    },
}

/// Retention limits shared by the planning subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct RetentionArgs {
    /// Keep the N most recent snapshots
    #[arg(long, value_parser = validate_keep_count)]
    pub keep_last_n: Option<usize>,

    /// Keep the newest snapshot of each of the N most recent weeks
    #[arg(long, value_parser = validate_keep_count)]
    pub keep_weekly_n: Option<usize>,

    /// Keep the newest snapshot of each of the N most recent months
    #[arg(long, value_parser = validate_keep_count)]
    pub keep_monthly_n: Option<usize>,
}

impl RetentionArgs {
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.keep_last_n, self.keep_weekly_n, self.keep_monthly_n)
    }
}

/// Parse output format string
#[derive(Debug, Clone)]
pub enum OutputFormat {
    Pretty,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {}. Use 'pretty' or 'json'", s)),
        }
    }
}

/// Validate that a keep count is greater than 0
fn validate_keep_count(s: &str) -> Result<usize, String> {
    let count: usize = s
        .parse()
        .map_err(|_| format!("Invalid keep count: '{}'. Must be a positive integer.", s))?;

    if count == 0 {
        return Err("Keep count must be greater than 0; omit the flag to disable it".to_string());
    }

    Ok(count)
}
