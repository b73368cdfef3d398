//! Selection of the next snapshot to migrate and its delta parent

use crate::archive::{ArchiveEntry, ArchiveId};
use crate::retention::{KeepReason, RetentionPolicy};
use crate::snapshot::Snapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

/// Snapshot chosen for migration together with its delta base
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub snapshot: Snapshot,
    pub parent: Option<ArchiveId>,
}

/// Archive entries simulated during a dry run.
///
/// Lives only for one executor run and is merged with the real entries
/// whenever the planner looks at archive state.
#[derive(Debug, Clone, Default)]
pub struct DryRunOverlay {
    entries: Vec<ArchiveEntry>,
}

impl DryRunOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a simulated store and return the synthetic entry
    pub fn record(&mut self, snapshot: &Snapshot, tags: BTreeMap<String, String>) -> ArchiveEntry {
        let id = Uuid::new_v4().simple().to_string();
        let entry = ArchiveEntry {
            id: ArchiveId(format!("dryrun-{}", &id[..8])),
            name: snapshot.name.clone(),
            creation_time: snapshot.creation_time,
            tags,
        };
        self.entries.push(entry.clone());
        entry
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Real entries followed by the simulated ones
    pub fn merged(&self, real: &[ArchiveEntry]) -> Vec<ArchiveEntry> {
        real.iter().chain(self.entries.iter()).cloned().collect()
    }
}

/// Most recent entry created strictly before `time`
pub fn select_parent<'a>(
    entries: impl IntoIterator<Item = &'a ArchiveEntry>,
    time: &DateTime<Utc>,
) -> Option<&'a ArchiveEntry> {
    entries
        .into_iter()
        .filter(|entry| entry.creation_time < *time)
        .max_by_key(|entry| entry.creation_time)
}

fn ascending(candidates: &[Snapshot]) -> Vec<&Snapshot> {
    let mut ordered: Vec<&Snapshot> = candidates.iter().collect();
    ordered.sort_by_key(|snapshot| snapshot.creation_time);
    ordered
}

/// Pick the oldest retained, not yet archived candidate.
///
/// The full candidate list is re-scanned on every call since weekly and
/// monthly bucket membership depends on all siblings. `None` means there is
/// nothing left to migrate under the policy.
pub fn select_next(
    dataset: &str,
    candidates: &[Snapshot],
    entries: &[ArchiveEntry],
    overlay: &DryRunOverlay,
    policy: &RetentionPolicy,
) -> Option<Selection> {
    let evaluation = policy.evaluate(candidates);
    let archived: HashSet<&str> = entries
        .iter()
        .chain(overlay.entries())
        .map(|entry| entry.name.as_str())
        .collect();

    for snapshot in ascending(candidates) {
        if !evaluation.must_keep(snapshot) {
            log::debug!(
                "Skipping {} because it is not retained ({})",
                snapshot.full_name(dataset),
                policy
            );
            continue;
        }
        if archived.contains(snapshot.name.as_str()) {
            log::debug!("Skipping {} because it is already archived", snapshot.full_name(dataset));
            continue;
        }

        let parent = select_parent(entries.iter().chain(overlay.entries()), &snapshot.creation_time)
            .map(|entry| entry.id.clone());
        return Some(Selection {
            snapshot: snapshot.clone(),
            parent,
        });
    }

    None
}

/// Migration state of one snapshot
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotStatus {
    pub snapshot: Snapshot,
    /// False when excluded as adding no content
    pub meaningful: bool,
    pub keep_reasons: Vec<KeepReason>,
    pub archived_as: Option<ArchiveId>,
}

/// Read-only overview of a dataset against its repository
#[derive(Debug, Clone, Serialize)]
pub struct DatasetStatus {
    pub dataset: String,
    pub repository: String,
    pub policy: RetentionPolicy,
    pub snapshots: Vec<SnapshotStatus>,
    pub next: Option<Selection>,
}

impl DatasetStatus {
    pub fn archived_count(&self) -> usize {
        self.snapshots.iter().filter(|s| s.archived_as.is_some()).count()
    }

    /// Snapshots that would still be migrated by a full dataset run
    pub fn pending_count(&self) -> usize {
        self.snapshots
            .iter()
            .filter(|s| s.meaningful && !s.keep_reasons.is_empty() && s.archived_as.is_none())
            .count()
    }
}

/// Describe every snapshot of a dataset and the planned next selection
pub fn describe(
    dataset: &str,
    repository: &str,
    history: &[Snapshot],
    candidates: &[Snapshot],
    entries: &[ArchiveEntry],
    policy: &RetentionPolicy,
) -> DatasetStatus {
    let evaluation = policy.evaluate(candidates);
    let meaningful: HashSet<&str> = candidates.iter().map(|s| s.name.as_str()).collect();
    let archived: HashMap<&str, &ArchiveId> = entries
        .iter()
        .map(|entry| (entry.name.as_str(), &entry.id))
        .collect();

    let snapshots = ascending(history)
        .into_iter()
        .map(|snapshot| {
            let is_meaningful = meaningful.contains(snapshot.name.as_str());
            SnapshotStatus {
                snapshot: snapshot.clone(),
                meaningful: is_meaningful,
                keep_reasons: if is_meaningful {
                    evaluation.keep_reasons(snapshot)
                } else {
                    Vec::new()
                },
                archived_as: archived.get(snapshot.name.as_str()).map(|id| (*id).clone()),
            }
        })
        .collect();

    DatasetStatus {
        dataset: dataset.to_string(),
        repository: repository.to_string(),
        policy: *policy,
        snapshots,
        next: select_next(dataset, candidates, entries, &DryRunOverlay::new(), policy),
    }
}
