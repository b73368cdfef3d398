//! Migration driver: mount, plan, store, check

use crate::archive::{snapshot_tags, ArchiveEntry, ArchiveId, ArchiveIndex, StoreRequest};
use crate::config::Repository;
use crate::error::{MigrateError, Result};
use crate::planner::{self, DatasetStatus, DryRunOverlay, Selection};
use crate::progress::ProgressReporter;
use crate::retention::RetentionPolicy;
use crate::snapshot::{Snapshot, SnapshotSource};
use crate::zero_diff::ZeroDiffFilter;
use serde::Serialize;

/// One stored (or, in a dry run, simulated) snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    pub snapshot: Snapshot,
    pub parent: Option<ArchiveId>,
    pub id: ArchiveId,
    pub simulated: bool,
}

/// Outcome of one subcommand run against a dataset
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub dataset: String,
    pub repository: String,
    pub dry_run: bool,
    pub records: Vec<MigrationRecord>,
}

impl MigrationReport {
    fn new(dataset: &str, repository: &Repository, dry_run: bool) -> Self {
        Self {
            dataset: dataset.to_string(),
            repository: repository.location.clone(),
            dry_run,
            records: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// State carried through one run; nothing here outlives the process
struct RunState<'a> {
    filter: ZeroDiffFilter<'a>,
    overlay: DryRunOverlay,
    initialized: bool,
}

/// Drives snapshot migration for one dataset at a time.
///
/// Every public operation mounts the dataset and initializes the repository
/// if needed, does its work, then checks the repository. In dry-run mode no
/// mutating external call is made and stores are simulated in a
/// [`DryRunOverlay`].
pub struct Migrator<'a> {
    source: &'a dyn SnapshotSource,
    archive: &'a dyn ArchiveIndex,
    dry_run: bool,
    show_progress: bool,
}

impl<'a> Migrator<'a> {
    pub fn new(source: &'a dyn SnapshotSource, archive: &'a dyn ArchiveIndex, dry_run: bool) -> Self {
        Self {
            source,
            archive,
            dry_run,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Store exactly one named snapshot
    pub fn migrate_single(
        &self,
        dataset: &str,
        repository: &Repository,
        snapshot_name: &str,
        parent: Option<ArchiveId>,
    ) -> Result<MigrationReport> {
        // Resolve before touching anything
        let snapshot = self.source.find_snapshot(dataset, snapshot_name)?;
        if parent.is_none() {
            log::warn!("Caution: No parent specified. This can greatly reduce performance.");
        }

        let mut state = self.prepare(dataset, repository)?;
        let mut report = MigrationReport::new(dataset, repository, self.dry_run);

        let already_archived = self
            .current_entries(repository, &state)?
            .iter()
            .any(|entry| entry.name == snapshot.name);
        if already_archived {
            log::warn!(
                "Snapshot {} is already archived in {}, not storing it again.",
                snapshot.full_name(dataset),
                repository.location
            );
        } else {
            let selection = Selection { snapshot, parent };
            report
                .records
                .push(self.store(dataset, repository, &selection, &mut state)?);
        }

        self.finish(repository)?;
        Ok(report)
    }

    /// Migrate the next snapshot selected by the planner, if any
    pub fn migrate_next(
        &self,
        dataset: &str,
        repository: &Repository,
        policy: &RetentionPolicy,
    ) -> Result<MigrationReport> {
        let mut state = self.prepare(dataset, repository)?;
        let mut report = MigrationReport::new(dataset, repository, self.dry_run);

        if let Some(selection) = self.plan(dataset, repository, policy, &mut state)? {
            report
                .records
                .push(self.store(dataset, repository, &selection, &mut state)?);
        }

        self.finish(repository)?;
        Ok(report)
    }

    /// Migrate until the planner has nothing left
    pub fn migrate_dataset(
        &self,
        dataset: &str,
        repository: &Repository,
        policy: &RetentionPolicy,
    ) -> Result<MigrationReport> {
        let mut state = self.prepare(dataset, repository)?;
        let mut report = MigrationReport::new(dataset, repository, self.dry_run);

        while let Some(selection) = self.plan(dataset, repository, policy, &mut state)? {
            let repeated = report
                .records
                .last()
                .is_some_and(|record| record.snapshot.name == selection.snapshot.name);
            if repeated {
                return Err(MigrateError::metadata(format!(
                    "Snapshot {} was stored but is not listed in {}",
                    selection.snapshot.full_name(dataset),
                    repository.location
                )));
            }
            report
                .records
                .push(self.store(dataset, repository, &selection, &mut state)?);
        }

        self.finish(repository)?;
        Ok(report)
    }

    /// Read-only overview; never mounts, initializes or checks
    pub fn status(
        &self,
        dataset: &str,
        repository: &Repository,
        policy: &RetentionPolicy,
    ) -> Result<DatasetStatus> {
        let history = self.source.list_snapshots(dataset)?;
        let candidates = ZeroDiffFilter::new(self.source, dataset).meaningful(&history)?;
        let entries = if self.archive.is_initialized(&repository.location)? {
            self.archive.list_entries(&repository.location)?
        } else {
            Vec::new()
        };

        Ok(planner::describe(
            dataset,
            &repository.location,
            &history,
            &candidates,
            &entries,
            policy,
        ))
    }

    fn prepare(&self, dataset: &str, repository: &Repository) -> Result<RunState<'a>> {
        let initialized = self.archive.is_initialized(&repository.location)?;

        if self.dry_run {
            log::info!("[dry-run] Would mount dataset {}.", dataset);
            if !initialized {
                log::info!("[dry-run] Would initialize restic repo {}.", repository.location);
            }
        } else {
            self.source.ensure_mounted(dataset)?;
            if initialized {
                log::info!("Restic repo {} already initialized.", repository.location);
            } else {
                log::info!("Initializing restic repo {}.", repository.location);
                self.archive.init(&repository.location)?;
            }
        }

        Ok(RunState {
            filter: ZeroDiffFilter::new(self.source, dataset),
            overlay: DryRunOverlay::new(),
            // A dry run treats a missing repository as empty
            initialized: initialized || !self.dry_run,
        })
    }

    fn finish(&self, repository: &Repository) -> Result<()> {
        if self.dry_run {
            log::info!("[dry-run] Would check restic repo {}.", repository.location);
            return Ok(());
        }
        log::info!("Checking restic repo {}.", repository.location);
        self.archive.check(&repository.location)
    }

    fn current_entries(&self, repository: &Repository, state: &RunState<'_>) -> Result<Vec<ArchiveEntry>> {
        let real = if state.initialized {
            self.archive.list_entries(&repository.location)?
        } else {
            Vec::new()
        };
        Ok(state.overlay.merged(&real))
    }

    fn plan(
        &self,
        dataset: &str,
        repository: &Repository,
        policy: &RetentionPolicy,
        state: &mut RunState<'a>,
    ) -> Result<Option<Selection>> {
        let history = self.source.list_snapshots(dataset)?;
        let candidates = state.filter.meaningful(&history)?;
        let real = if state.initialized {
            self.archive.list_entries(&repository.location)?
        } else {
            Vec::new()
        };

        let selection = planner::select_next(dataset, &candidates, &real, &state.overlay, policy);
        if selection.is_none() {
            log::info!("No further snapshots need to be backed up for {}.", dataset);
        }
        Ok(selection)
    }

    fn store(
        &self,
        dataset: &str,
        repository: &Repository,
        selection: &Selection,
        state: &mut RunState<'a>,
    ) -> Result<MigrationRecord> {
        let snapshot = &selection.snapshot;
        let tags = snapshot_tags(&snapshot.name, snapshot.logical_bytes);
        let parent_label = selection
            .parent
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "none".to_string());

        if self.dry_run {
            let entry = state.overlay.record(snapshot, tags);
            log::info!(
                "[dry-run] Would back up {} into {} under {} (parent {}).",
                snapshot.full_name(dataset),
                repository.location,
                repository.path_in_archive,
                parent_label
            );
            return Ok(MigrationRecord {
                snapshot: snapshot.clone(),
                parent: selection.parent.clone(),
                id: entry.id,
                simulated: true,
            });
        }

        let request = StoreRequest {
            source_path: self.source.snapshot_path(dataset, &snapshot.name)?,
            path_in_archive: repository.path_in_archive.clone(),
            timestamp: snapshot.creation_time,
            tags,
            parent: selection.parent.clone(),
        };

        log::info!(
            "Starting backup of {} into {} under {} (parent {}).",
            snapshot.full_name(dataset),
            repository.location,
            repository.path_in_archive,
            parent_label
        );
        let mut progress = if self.show_progress {
            ProgressReporter::new_for_store(&format!("Storing {}", snapshot.full_name(dataset)))
        } else {
            ProgressReporter::new_minimal()
        };
        let id = self.archive.store(&repository.location, &request)?;
        progress.finish(&format!("Stored {} as {}", snapshot.full_name(dataset), id));
        log::info!("Stored {} as {}.", snapshot.full_name(dataset), id);

        Ok(MigrationRecord {
            snapshot: snapshot.clone(),
            parent: selection.parent.clone(),
            id,
            simulated: false,
        })
    }
}
