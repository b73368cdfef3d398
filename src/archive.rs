//! Archive entries and the restic archive adapter

use crate::error::{MigrateError, Result};
use crate::process;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Command;

/// Tag key carrying the source snapshot name
pub const SNAPSHOT_TAG: &str = "snapshot";

/// Tag key carrying the snapshot's logical referenced size
pub const LOGICAL_REFERENCED_TAG: &str = "logicalreferenced";

/// Marker present in an initialized repository's config
const CHUNKER_MARKER: &str = "chunker_polynomial";

const SHORT_ID_LEN: usize = 8;

/// restic exit code for a snapshot saved while some source files were unreadable
const INCOMPLETE_BACKUP_EXIT: i32 = 3;

/// Opaque identifier assigned by the archive on store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchiveId(pub String);

impl ArchiveId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One stored migration result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEntry {
    pub id: ArchiveId,
    /// Name of the snapshot this entry was stored from
    pub name: String,
    /// Creation time of the original snapshot
    pub creation_time: DateTime<Utc>,
    pub tags: BTreeMap<String, String>,
}

/// Everything needed to store one snapshot
#[derive(Debug, Clone)]
pub struct StoreRequest {
    /// Where the snapshot content can be read
    pub source_path: PathBuf,
    /// Stable path the content is recorded under inside the archive
    pub path_in_archive: String,
    pub timestamp: DateTime<Utc>,
    pub tags: BTreeMap<String, String>,
    pub parent: Option<ArchiveId>,
}

impl StoreRequest {
    /// Snapshot name recorded in the tags, if any
    pub fn snapshot_name(&self) -> Option<&str> {
        self.tags.get(SNAPSHOT_TAG).map(String::as_str)
    }
}

/// Long-term store receiving migrated snapshots
pub trait ArchiveIndex {
    /// Existing entries of the repository
    fn list_entries(&self, repository: &str) -> Result<Vec<ArchiveEntry>>;

    /// Store one snapshot, returning the new entry's id
    fn store(&self, repository: &str, request: &StoreRequest) -> Result<ArchiveId>;

    fn is_initialized(&self, repository: &str) -> Result<bool>;

    fn init(&self, repository: &str) -> Result<()>;

    /// Run a consistency check of the repository
    fn check(&self, repository: &str) -> Result<()>;
}

/// Build the tag map for a snapshot store
pub fn snapshot_tags(name: &str, logical_bytes: u64) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    tags.insert(SNAPSHOT_TAG.to_string(), name.to_string());
    tags.insert(LOGICAL_REFERENCED_TAG.to_string(), logical_bytes.to_string());
    tags
}

/// Parse `key=value` tags into a map; bare tags map to an empty value
pub fn parse_tags<S: AsRef<str>>(tags: &[S]) -> BTreeMap<String, String> {
    tags.iter()
        .map(|tag| {
            let tag = tag.as_ref();
            match tag.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (tag.to_string(), String::new()),
            }
        })
        .collect()
}

/// Render a tag map as `key=value` strings
pub fn format_tags(tags: &BTreeMap<String, String>) -> Vec<String> {
    tags.iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect()
}

#[derive(Debug, Deserialize)]
struct ResticSnapshot {
    short_id: String,
    time: DateTime<Utc>,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Parse `restic snapshots --json` output
pub fn parse_snapshot_listing(json: &str) -> Result<Vec<ArchiveEntry>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let listing: Vec<ResticSnapshot> = serde_json::from_str(json)?;

    listing
        .into_iter()
        .map(|snapshot| {
            let tags = parse_tags(snapshot.tags.as_deref().unwrap_or_default());
            let name = tags.get(SNAPSHOT_TAG).cloned().ok_or_else(|| {
                MigrateError::metadata(format!(
                    "Archive entry {} does not have a valid {} tag",
                    snapshot.short_id, SNAPSHOT_TAG
                ))
            })?;
            Ok(ArchiveEntry {
                id: ArchiveId(snapshot.short_id),
                name,
                creation_time: snapshot.time,
                tags,
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct BackupMessage {
    message_type: String,
    #[serde(default)]
    snapshot_id: Option<String>,
}

/// Extract the new snapshot id from `restic backup --json` output
pub fn parse_backup_summary(stdout: &str) -> Option<ArchiveId> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<BackupMessage>(line).ok())
        .filter(|message| message.message_type == "summary")
        .find_map(|message| message.snapshot_id)
        .map(|id| ArchiveId(id.chars().take(SHORT_ID_LEN).collect()))
}

/// Archive backed by the `restic` command line tool
#[derive(Debug, Clone)]
pub struct ResticArchive {
    password_file: PathBuf,
}

impl ResticArchive {
    pub fn new(password_file: impl Into<PathBuf>) -> Self {
        Self {
            password_file: password_file.into(),
        }
    }

    fn restic_args(&self, repository: &str, subcommand: &str) -> Vec<String> {
        vec![
            "-r".to_string(),
            repository.to_string(),
            "--password-file".to_string(),
            self.password_file.to_string_lossy().to_string(),
            subcommand.to_string(),
        ]
    }

    fn restic(&self, repository: &str, subcommand: &str) -> Command {
        let mut command = Command::new("restic");
        command.env("TZ", "UTC").args(self.restic_args(repository, subcommand));
        command
    }

    /// Arguments for `restic backup`, including the global repository flags
    pub fn backup_args(&self, repository: &str, request: &StoreRequest) -> Vec<String> {
        let mut args = self.restic_args(repository, "backup");
        args.extend([
            "--json".to_string(),
            "--ignore-ctime".to_string(),
            "--time".to_string(),
            request.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            "--compression".to_string(),
            "max".to_string(),
        ]);
        for tag in format_tags(&request.tags) {
            args.push("--tag".to_string());
            args.push(tag);
        }
        if let Some(parent) = &request.parent {
            args.push("--parent".to_string());
            args.push(parent.to_string());
        }
        args.push(request.path_in_archive.clone());
        args
    }
}

/// Run `restic backup` and return the id of the snapshot it wrote.
///
/// Exit code 3 means the snapshot was saved but some files could not be
/// read; that is reported as a warning and the snapshot is still used.
fn run_backup(command: &mut Command) -> Result<ArchiveId> {
    let output = process::run(command)?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    match output.status.code() {
        Some(0) => {}
        Some(INCOMPLETE_BACKUP_EXIT) => match parse_backup_summary(&stdout) {
            Some(id) => {
                log::warn!(
                    "restic saved snapshot {} but could not read some source files: {}",
                    id,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                return Ok(id);
            }
            None => return Err(process::failure(command, &output)),
        },
        _ => return Err(process::failure(command, &output)),
    }

    parse_backup_summary(&stdout).ok_or_else(|| {
        MigrateError::unexpected_output(process::describe(command), "no backup summary with a snapshot id")
    })
}

impl ArchiveIndex for ResticArchive {
    fn list_entries(&self, repository: &str) -> Result<Vec<ArchiveEntry>> {
        let mut command = self.restic(repository, "snapshots");
        command.arg("--json");
        let stdout = process::eval(&mut command)?;
        parse_snapshot_listing(&stdout)
    }

    fn store(&self, repository: &str, request: &StoreRequest) -> Result<ArchiveId> {
        // proot binds the snapshot directory to a stable path so every
        // archive entry records the same source path
        let mut command = Command::new("proot");
        command
            .env("TZ", "UTC")
            .arg("-b")
            .arg(format!(
                "{}:{}",
                request.source_path.display(),
                request.path_in_archive
            ))
            .arg("restic")
            .args(self.backup_args(repository, request));

        run_backup(&mut command)
    }

    fn is_initialized(&self, repository: &str) -> Result<bool> {
        let mut command = self.restic(repository, "cat");
        command.arg("config");
        Ok(process::eval_lenient(&mut command)?.contains(CHUNKER_MARKER))
    }

    fn init(&self, repository: &str) -> Result<()> {
        process::eval(&mut self.restic(repository, "init"))?;
        Ok(())
    }

    fn check(&self, repository: &str) -> Result<()> {
        process::eval(&mut self.restic(repository, "check"))?;
        Ok(())
    }
}
