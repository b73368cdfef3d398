//! # snapmigrate
//!
//! Incrementally migrates ZFS snapshot history into restic repositories,
//! one repository per dataset, keeping snapshot times, applying a
//! last/weekly/monthly retention policy and chaining every backup onto the
//! nearest earlier archived snapshot.

pub mod archive;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod executor;
pub mod output;
pub mod planner;
pub mod process;
pub mod progress;
pub mod retention;
pub mod snapshot;
pub mod zero_diff;

pub use archive::{ArchiveEntry, ArchiveId, ArchiveIndex};
pub use error::{MigrateError, Result};
pub use executor::{MigrationReport, Migrator};
pub use retention::RetentionPolicy;
pub use snapshot::{Snapshot, SnapshotSource};
