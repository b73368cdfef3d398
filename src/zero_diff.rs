//! Detection of snapshots that add no content over their predecessor

use crate::error::Result;
use crate::snapshot::{Snapshot, SnapshotSource};
use std::collections::HashMap;

/// Filters a dataset's history down to the snapshots worth migrating.
///
/// A snapshot is dropped only when its immediate predecessor holds no
/// unique space *and* `zfs diff` between the two is empty. The diff is only
/// consulted when the cheap `used` signal is zero; results are memoized for
/// the lifetime of the filter.
pub struct ZeroDiffFilter<'a> {
    source: &'a dyn SnapshotSource,
    dataset: String,
    diff_cache: HashMap<(String, String), bool>,
}

impl<'a> ZeroDiffFilter<'a> {
    pub fn new(source: &'a dyn SnapshotSource, dataset: impl Into<String>) -> Self {
        Self {
            source,
            dataset: dataset.into(),
            diff_cache: HashMap::new(),
        }
    }

    /// Whether `candidate` carries nothing beyond `predecessor`
    pub fn is_zero_diff(&mut self, predecessor: &Snapshot, candidate: &Snapshot) -> Result<bool> {
        if predecessor.used_bytes != 0 {
            return Ok(false);
        }

        let key = (predecessor.name.clone(), candidate.name.clone());
        if let Some(empty) = self.diff_cache.get(&key) {
            return Ok(*empty);
        }

        let empty = self
            .source
            .diff_is_empty(&self.dataset, &predecessor.name, &candidate.name)?;
        self.diff_cache.insert(key, empty);
        Ok(empty)
    }

    /// The meaningful subsequence of an ascending snapshot history
    pub fn meaningful(&mut self, snapshots: &[Snapshot]) -> Result<Vec<Snapshot>> {
        let mut kept = Vec::with_capacity(snapshots.len());

        for (index, snapshot) in snapshots.iter().enumerate() {
            if index > 0 && self.is_zero_diff(&snapshots[index - 1], snapshot)? {
                log::info!(
                    "Skipping snapshot {} because of zero size.",
                    snapshot.full_name(&self.dataset)
                );
                continue;
            }
            kept.push(snapshot.clone());
        }

        Ok(kept)
    }

    /// Number of distinct diffs run so far
    pub fn diffs_run(&self) -> usize {
        self.diff_cache.len()
    }
}
