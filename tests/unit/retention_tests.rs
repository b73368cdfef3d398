//! Retention policy behaviour over realistic snapshot histories

use chrono::{Duration, TimeZone, Utc};
use snapmigrate::retention::{KeepReason, RetentionPolicy};
use snapmigrate::Snapshot;

/// Daily snapshots at midnight UTC starting on the given date
fn daily(year: i32, month: u32, day: u32, count: i64) -> Vec<Snapshot> {
    let start = Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            let time = start + Duration::days(i);
            Snapshot::new(time.format("auto-%Y-%m-%d").to_string(), time, 1024, 4096)
        })
        .collect()
}

fn kept(policy: &RetentionPolicy, candidates: &[Snapshot]) -> Vec<String> {
    let evaluation = policy.evaluate(candidates);
    candidates
        .iter()
        .filter(|s| evaluation.must_keep(s))
        .map(|s| s.name.clone())
        .collect()
}

#[test]
fn test_weekly_representatives_over_three_weeks() {
    // Monday 2024-01-01 through Sunday 2024-01-21
    let candidates = daily(2024, 1, 1, 21);

    let all_weeks = RetentionPolicy::new(None, Some(3), None);
    assert_eq!(
        kept(&all_weeks, &candidates),
        vec!["auto-2024-01-07", "auto-2024-01-14", "auto-2024-01-21"]
    );

    let one_week = RetentionPolicy::new(None, Some(1), None);
    assert_eq!(kept(&one_week, &candidates), vec!["auto-2024-01-21"]);
}

#[test]
fn test_monthly_representatives() {
    let candidates = daily(2024, 1, 15, 60);
    let policy = RetentionPolicy::new(None, None, Some(12));
    assert_eq!(
        kept(&policy, &candidates),
        vec!["auto-2024-01-31", "auto-2024-02-29", "auto-2024-03-14"]
    );
}

#[test]
fn test_criteria_are_a_union() {
    let candidates = daily(2024, 1, 1, 21);
    let policy = RetentionPolicy::new(Some(2), Some(2), None);
    assert_eq!(
        kept(&policy, &candidates),
        vec!["auto-2024-01-14", "auto-2024-01-20", "auto-2024-01-21"]
    );

    let evaluation = policy.evaluate(&candidates);
    let newest = candidates.last().unwrap();
    assert_eq!(evaluation.keep_reasons(newest), vec![KeepReason::Last, KeepReason::Weekly]);
}

#[test]
fn test_last_n_precedence_over_five_candidates() {
    let candidates: Vec<Snapshot> = [100, 200, 300, 400, 500]
        .iter()
        .map(|t| Snapshot::new(format!("s{}", t), Utc.timestamp_opt(*t, 0).unwrap(), 1, 1))
        .collect();
    let policy = RetentionPolicy::new(Some(2), None, None);
    assert_eq!(kept(&policy, &candidates), vec!["s400", "s500"]);
}

#[test]
fn test_more_limit_than_candidates_keeps_all() {
    let candidates = daily(2024, 6, 1, 3);
    let policy = RetentionPolicy::new(Some(10), Some(10), Some(10));
    assert_eq!(kept(&policy, &candidates).len(), 3);
}
