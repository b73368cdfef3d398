//! Common test utilities and in-memory collaborators

use chrono::{DateTime, TimeZone, Utc};
use snapmigrate::archive::{parse_tags, ArchiveEntry, ArchiveId, ArchiveIndex, StoreRequest, SNAPSHOT_TAG};
use snapmigrate::config::{RepoLayout, Repository};
use snapmigrate::{MigrateError, Result, Snapshot, SnapshotSource};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

pub const DATASET: &str = "backup01/tank/home";

/// Timestamp helper
pub fn ts(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).unwrap()
}

pub fn snap(name: &str, seconds: i64) -> Snapshot {
    Snapshot::new(name, ts(seconds), 4096, 1_000_000)
}

pub fn entry(id: &str, name: &str, seconds: i64) -> ArchiveEntry {
    ArchiveEntry {
        id: ArchiveId::new(id),
        name: name.to_string(),
        creation_time: ts(seconds),
        tags: parse_tags(&[format!("{}={}", SNAPSHOT_TAG, name)]),
    }
}

pub fn repository() -> Repository {
    RepoLayout::new("/srv/restic", "backup01")
        .unwrap()
        .repository_for(DATASET)
        .unwrap()
}

/// In-memory ZFS dataset
pub struct FakeZfs {
    pub dataset: String,
    pub snapshots: RefCell<Vec<Snapshot>>,
    /// (predecessor, candidate) pairs whose diff is non-empty
    pub changed: RefCell<HashSet<(String, String)>>,
    pub diff_calls: Cell<usize>,
    pub mounted: Cell<bool>,
    pub mount_calls: Cell<usize>,
}

impl FakeZfs {
    pub fn new() -> Self {
        Self {
            dataset: DATASET.to_string(),
            snapshots: RefCell::new(Vec::new()),
            changed: RefCell::new(HashSet::new()),
            diff_calls: Cell::new(0),
            mounted: Cell::new(false),
            mount_calls: Cell::new(0),
        }
    }

    /// Snapshots with the given names and creation times, all holding data
    pub fn with_snapshots(snapshots: &[(&str, i64)]) -> Self {
        let zfs = Self::new();
        for (name, seconds) in snapshots {
            zfs.add(snap(name, *seconds));
        }
        zfs
    }

    pub fn add(&self, snapshot: Snapshot) {
        self.snapshots.borrow_mut().push(snapshot);
    }

    pub fn mark_changed(&self, predecessor: &str, candidate: &str) {
        self.changed
            .borrow_mut()
            .insert((predecessor.to_string(), candidate.to_string()));
    }
}

impl SnapshotSource for FakeZfs {
    fn list_snapshots(&self, dataset: &str) -> Result<Vec<Snapshot>> {
        if dataset != self.dataset {
            return Ok(Vec::new());
        }
        let mut snapshots = self.snapshots.borrow().clone();
        snapshots.sort_by_key(|s| s.creation_time);
        Ok(snapshots)
    }

    fn diff_is_empty(&self, _dataset: &str, predecessor: &str, candidate: &str) -> Result<bool> {
        self.diff_calls.set(self.diff_calls.get() + 1);
        Ok(!self
            .changed
            .borrow()
            .contains(&(predecessor.to_string(), candidate.to_string())))
    }

    fn ensure_mounted(&self, _dataset: &str) -> Result<()> {
        self.mount_calls.set(self.mount_calls.get() + 1);
        self.mounted.set(true);
        Ok(())
    }

    fn snapshot_path(&self, _dataset: &str, snapshot: &str) -> Result<PathBuf> {
        Ok(PathBuf::from("/tank/home/.zfs/snapshot").join(snapshot))
    }
}

/// In-memory restic repository
pub struct FakeRestic {
    pub entries: RefCell<Vec<ArchiveEntry>>,
    pub stores: RefCell<Vec<StoreRequest>>,
    pub initialized: Cell<bool>,
    pub init_calls: Cell<usize>,
    pub check_calls: Cell<usize>,
    /// Fail the next store like a crashed restic process
    pub fail_next_store: Cell<bool>,
    /// Accept stores without ever listing them
    pub forget_stores: Cell<bool>,
    /// Report one entry without a snapshot tag
    pub corrupt_listing: Cell<bool>,
}

impl FakeRestic {
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
            stores: RefCell::new(Vec::new()),
            initialized: Cell::new(false),
            init_calls: Cell::new(0),
            check_calls: Cell::new(0),
            fail_next_store: Cell::new(false),
            forget_stores: Cell::new(false),
            corrupt_listing: Cell::new(false),
        }
    }

    pub fn with_entries(entries: Vec<ArchiveEntry>) -> Self {
        let restic = Self::new();
        restic.initialized.set(true);
        *restic.entries.borrow_mut() = entries;
        restic
    }

    pub fn stored_names(&self) -> Vec<String> {
        self.stores
            .borrow()
            .iter()
            .filter_map(|request| request.snapshot_name().map(str::to_string))
            .collect()
    }

    pub fn stored_parents(&self) -> Vec<Option<String>> {
        self.stores
            .borrow()
            .iter()
            .map(|request| request.parent.as_ref().map(|id| id.to_string()))
            .collect()
    }
}

impl ArchiveIndex for FakeRestic {
    fn list_entries(&self, repository: &str) -> Result<Vec<ArchiveEntry>> {
        if !self.initialized.get() {
            return Err(MigrateError::External {
                command: format!("restic -r {} snapshots --json", repository),
                status: "exit status: 1".to_string(),
                stderr: "Is there a repository at the following location?".to_string(),
            });
        }
        if self.corrupt_listing.get() {
            return Err(MigrateError::metadata("Archive entry deadbeef does not have a valid snapshot tag"));
        }
        Ok(self.entries.borrow().clone())
    }

    fn store(&self, repository: &str, request: &StoreRequest) -> Result<ArchiveId> {
        if self.fail_next_store.replace(false) {
            return Err(MigrateError::External {
                command: format!("restic -r {} backup", repository),
                status: "exit status: 1".to_string(),
                stderr: "Fatal: unable to save snapshot".to_string(),
            });
        }

        let name = request
            .snapshot_name()
            .ok_or_else(|| MigrateError::metadata("store request without snapshot tag"))?;
        let id = ArchiveId::new(format!("id-{}", name));
        self.stores.borrow_mut().push(request.clone());
        if !self.forget_stores.get() {
            self.entries.borrow_mut().push(ArchiveEntry {
                id: id.clone(),
                name: name.to_string(),
                creation_time: request.timestamp,
                tags: request.tags.clone(),
            });
        }
        Ok(id)
    }

    fn is_initialized(&self, _repository: &str) -> Result<bool> {
        Ok(self.initialized.get())
    }

    fn init(&self, _repository: &str) -> Result<()> {
        self.init_calls.set(self.init_calls.get() + 1);
        self.initialized.set(true);
        Ok(())
    }

    fn check(&self, _repository: &str) -> Result<()> {
        self.check_calls.set(self.check_calls.get() + 1);
        Ok(())
    }
}

/// Tags as stored for a snapshot, for assertions
pub fn tags_of(request: &StoreRequest) -> BTreeMap<String, String> {
    request.tags.clone()
}
