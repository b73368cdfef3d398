//! Filesystem snapshots and the ZFS snapshot source

use crate::error::{MigrateError, Result};
use crate::process;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::process::Command;

/// Directory under a mountpoint exposing read-only snapshot contents
pub const ZFS_SNAPSHOT_DIR: &str = ".zfs/snapshot";

/// One immutable point-in-time capture of a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Snapshot name without the `dataset@` prefix
    pub name: String,
    pub creation_time: DateTime<Utc>,
    /// Space held uniquely by this snapshot
    pub used_bytes: u64,
    /// Logical size of everything the snapshot references
    pub logical_bytes: u64,
}

impl Snapshot {
    pub fn new(
        name: impl Into<String>,
        creation_time: DateTime<Utc>,
        used_bytes: u64,
        logical_bytes: u64,
    ) -> Self {
        Self {
            name: name.into(),
            creation_time,
            used_bytes,
            logical_bytes,
        }
    }

    pub fn full_name(&self, dataset: &str) -> String {
        format!("{}@{}", dataset, self.name)
    }
}

/// Provider of a dataset's snapshot history and content
pub trait SnapshotSource {
    /// All snapshots of the dataset in ascending creation order
    fn list_snapshots(&self, dataset: &str) -> Result<Vec<Snapshot>>;

    /// True if no byte-level difference exists between the two snapshots
    fn diff_is_empty(&self, dataset: &str, predecessor: &str, candidate: &str) -> Result<bool>;

    /// Make the dataset's snapshot directory reachable
    fn ensure_mounted(&self, dataset: &str) -> Result<()>;

    /// Path at which the snapshot's content can be read
    fn snapshot_path(&self, dataset: &str, snapshot: &str) -> Result<PathBuf>;

    /// Look up one snapshot by name
    fn find_snapshot(&self, dataset: &str, name: &str) -> Result<Snapshot> {
        self.list_snapshots(dataset)?
            .into_iter()
            .find(|snapshot| snapshot.name == name)
            .ok_or_else(|| MigrateError::snapshot_not_found(dataset, name))
    }
}

/// Snapshot source backed by the `zfs` command line tool
#[derive(Debug, Default, Clone)]
pub struct ZfsSource;

impl ZfsSource {
    pub fn new() -> Self {
        Self
    }

    fn get_property(&self, target: &str, property: &str) -> Result<String> {
        let mut command = Command::new("zfs");
        command.args(["get", "-Hp", "-o", "value", property, target]);
        Ok(process::eval(&mut command)?.trim().to_string())
    }
}

impl SnapshotSource for ZfsSource {
    fn list_snapshots(&self, dataset: &str) -> Result<Vec<Snapshot>> {
        let mut command = Command::new("zfs");
        command.args([
            "list",
            "-Hp",
            "-t",
            "snapshot",
            "-o",
            "name,creation,used,logicalreferenced",
            "-s",
            "creation",
            dataset,
        ]);
        let stdout = process::eval(&mut command)?;
        parse_snapshot_list(dataset, &stdout)
            .map_err(|message| MigrateError::unexpected_output(process::describe(&command), message))
    }

    fn diff_is_empty(&self, dataset: &str, predecessor: &str, candidate: &str) -> Result<bool> {
        let mut command = Command::new("zfs");
        command.args([
            "diff",
            "-H",
            &format!("{}@{}", dataset, predecessor),
            &format!("{}@{}", dataset, candidate),
        ]);
        let stdout = process::eval(&mut command)?;
        Ok(stdout.trim().is_empty())
    }

    fn ensure_mounted(&self, dataset: &str) -> Result<()> {
        if self.get_property(dataset, "mounted")? == "yes" {
            log::debug!("Dataset {} already mounted", dataset);
            return Ok(());
        }
        log::info!("Mounting dataset {}", dataset);
        let mut command = Command::new("zfs");
        command.args(["mount", dataset]);
        process::eval(&mut command)?;
        Ok(())
    }

    fn snapshot_path(&self, dataset: &str, snapshot: &str) -> Result<PathBuf> {
        let mountpoint = self.get_property(dataset, "mountpoint")?;
        if !mountpoint.starts_with('/') {
            return Err(MigrateError::configuration(format!(
                "Dataset {} has no usable mountpoint ({})",
                dataset, mountpoint
            )));
        }
        Ok(PathBuf::from(mountpoint).join(ZFS_SNAPSHOT_DIR).join(snapshot))
    }
}

/// Parse `zfs list -Hp -o name,creation,used,logicalreferenced` output
pub fn parse_snapshot_list(dataset: &str, stdout: &str) -> std::result::Result<Vec<Snapshot>, String> {
    let mut snapshots = Vec::new();

    for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 4 {
            return Err(format!("expected 4 columns, got {}: {:?}", fields.len(), line));
        }

        let (owner, name) = fields[0]
            .split_once('@')
            .ok_or_else(|| format!("not a snapshot name: {}", fields[0]))?;
        if owner != dataset {
            log::debug!("Ignoring snapshot {} of another dataset", fields[0]);
            continue;
        }

        let seconds: i64 = parse_number(fields[1], "creation")?;
        let creation_time = Utc
            .timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| format!("creation time out of range: {}", seconds))?;

        snapshots.push(Snapshot {
            name: name.to_string(),
            creation_time,
            used_bytes: parse_number(fields[2], "used")?,
            logical_bytes: parse_number(fields[3], "logicalreferenced")?,
        });
    }

    // Creation time is authoritative; a stable sort keeps zfs order for ties
    snapshots.sort_by_key(|snapshot| snapshot.creation_time);
    Ok(snapshots)
}

fn parse_number<T: std::str::FromStr>(value: &str, column: &str) -> std::result::Result<T, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("invalid {} value: {:?}", column, value))
}
