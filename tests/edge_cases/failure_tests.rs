//! Failure propagation and recovery by re-running

use crate::common::{entry, repository, FakeRestic, FakeZfs, DATASET};
use snapmigrate::config::RepoLayout;
use snapmigrate::{MigrateError, Migrator, RetentionPolicy};

#[test]
fn test_unknown_snapshot_takes_no_action() {
    let zfs = FakeZfs::with_snapshots(&[("a", 100)]);
    let restic = FakeRestic::new();
    let migrator = Migrator::new(&zfs, &restic, false);

    let err = migrator
        .migrate_single(DATASET, &repository(), "missing", None)
        .unwrap_err();

    assert!(matches!(err, MigrateError::SnapshotNotFound { ref name, .. } if name == "missing"));
    assert!(!zfs.mounted.get());
    assert_eq!(restic.init_calls.get(), 0);
    assert_eq!(restic.check_calls.get(), 0);
}

#[test]
fn test_failed_store_leaves_archive_untouched_and_rerun_recovers() {
    let zfs = FakeZfs::with_snapshots(&[("a", 100), ("b", 200), ("c", 300)]);
    let restic = FakeRestic::new();
    let migrator = Migrator::new(&zfs, &restic, false);

    migrator.migrate_next(DATASET, &repository(), &RetentionPolicy::default()).unwrap();
    restic.fail_next_store.set(true);

    let err = migrator
        .migrate_dataset(DATASET, &repository(), &RetentionPolicy::default())
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(restic.entries.borrow().len(), 1);
    // The post-run check only follows a completed run
    assert_eq!(restic.check_calls.get(), 1);

    let report = migrator
        .migrate_dataset(DATASET, &repository(), &RetentionPolicy::default())
        .unwrap();
    let names: Vec<&str> = report.records.iter().map(|r| r.snapshot.name.as_str()).collect();
    assert_eq!(names, vec!["b", "c"]);
    assert_eq!(restic.stored_parents().last().unwrap().as_deref(), Some("id-b"));
}

#[test]
fn test_untagged_archive_entry_aborts_before_storing() {
    let zfs = FakeZfs::with_snapshots(&[("a", 100)]);
    let restic = FakeRestic::with_entries(vec![entry("id-x", "x", 50)]);
    restic.corrupt_listing.set(true);
    let migrator = Migrator::new(&zfs, &restic, false);

    let err = migrator
        .migrate_next(DATASET, &repository(), &RetentionPolicy::default())
        .unwrap_err();

    assert!(matches!(err, MigrateError::Metadata { .. }));
    assert!(!err.is_transient());
    assert!(restic.stores.borrow().is_empty());
}

#[test]
fn test_store_not_visible_in_index_stops_the_loop() {
    let zfs = FakeZfs::with_snapshots(&[("a", 100), ("b", 200)]);
    let restic = FakeRestic::new();
    restic.forget_stores.set(true);
    let migrator = Migrator::new(&zfs, &restic, false);

    let err = migrator
        .migrate_dataset(DATASET, &repository(), &RetentionPolicy::default())
        .unwrap_err();

    assert!(matches!(err, MigrateError::Metadata { .. }));
    assert_eq!(restic.stored_names(), vec!["a"]);
}

#[test]
fn test_empty_dataset_is_a_normal_finish() {
    let zfs = FakeZfs::new();
    let restic = FakeRestic::new();
    let migrator = Migrator::new(&zfs, &restic, false);

    let report = migrator
        .migrate_dataset(DATASET, &repository(), &RetentionPolicy::new(Some(3), Some(4), Some(6)))
        .unwrap();

    assert!(report.is_empty());
    assert_eq!(restic.check_calls.get(), 1);
}

#[test]
fn test_dataset_outside_common_prefix_is_configuration_error() {
    let layout = RepoLayout::new("/srv/restic", "backup01").unwrap();
    assert!(matches!(
        layout.repository_for("tank/home"),
        Err(MigrateError::Configuration { .. })
    ));
}
