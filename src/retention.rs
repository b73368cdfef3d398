//! Retention policy: which snapshots are worth migrating
//!
//! A snapshot is kept when it is among the `keep_last` most recent
//! candidates, or when it is the newest member of its ISO week (calendar
//! month) and that week (month) is among the `keep_weekly` (`keep_monthly`)
//! most recent ones. With no limit configured every candidate is kept.
//!
//! "Among the N most recent" means fewer than N other members are strictly
//! newer, so snapshots sharing a creation time may let more than N survive.
//! Calendar buckets are computed in UTC.

use crate::snapshot::Snapshot;
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Keep limits; `None` means the criterion is not applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetentionPolicy {
    pub keep_last: Option<usize>,
    pub keep_weekly: Option<usize>,
    pub keep_monthly: Option<usize>,
}

/// Why a snapshot survives retention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeepReason {
    /// No policy configured
    All,
    Last,
    Weekly,
    Monthly,
}

impl fmt::Display for KeepReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::All => "all",
            Self::Last => "last",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        };
        f.write_str(label)
    }
}

/// Calendar grouping used for long-term buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    /// ISO (year, week)
    Week,
    /// (year, month)
    Month,
}

impl Period {
    pub fn bucket_key(&self, time: &DateTime<Utc>) -> (i32, u32) {
        match self {
            Self::Week => {
                let week = time.iso_week();
                (week.year(), week.week())
            }
            Self::Month => (time.year(), time.month()),
        }
    }
}

impl RetentionPolicy {
    pub fn new(keep_last: Option<usize>, keep_weekly: Option<usize>, keep_monthly: Option<usize>) -> Self {
        Self {
            keep_last,
            keep_weekly,
            keep_monthly,
        }
    }

    /// True when no limit is configured at all
    pub fn is_unrestricted(&self) -> bool {
        self.keep_last.is_none() && self.keep_weekly.is_none() && self.keep_monthly.is_none()
    }

    /// Precompute bucket membership for a candidate set
    pub fn evaluate(&self, candidates: &[Snapshot]) -> RetentionEvaluation {
        let mut newest_first: Vec<DateTime<Utc>> =
            candidates.iter().map(|snapshot| snapshot.creation_time).collect();
        newest_first.sort_unstable_by(|a, b| b.cmp(a));

        RetentionEvaluation {
            policy: *self,
            newest_first,
            weekly: self
                .keep_weekly
                .map(|_| BucketIndex::build(candidates, Period::Week)),
            monthly: self
                .keep_monthly
                .map(|_| BucketIndex::build(candidates, Period::Month)),
        }
    }

    /// Whether `snapshot` must be migrated given all its sibling candidates
    pub fn must_keep(&self, candidates: &[Snapshot], snapshot: &Snapshot) -> bool {
        self.evaluate(candidates).must_keep(snapshot)
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unrestricted() {
            return f.write_str("keep all");
        }
        let limits: Vec<String> = [
            ("last", self.keep_last),
            ("weekly", self.keep_weekly),
            ("monthly", self.keep_monthly),
        ]
        .iter()
        .filter_map(|(label, limit)| limit.map(|n| format!("{} {}", label, n)))
        .collect();
        write!(f, "keep {}", limits.join(", "))
    }
}

/// Number of entries in a newest-first list strictly newer than `time`
fn count_newer(newest_first: &[DateTime<Utc>], time: &DateTime<Utc>) -> usize {
    newest_first.partition_point(|other| other > time)
}

#[derive(Debug, Clone)]
struct BucketIndex {
    period: Period,
    newest_in_bucket: HashMap<(i32, u32), DateTime<Utc>>,
    /// Creation times of bucket representatives, newest first
    representatives: Vec<DateTime<Utc>>,
}

impl BucketIndex {
    fn build(candidates: &[Snapshot], period: Period) -> Self {
        let mut newest_in_bucket: HashMap<(i32, u32), DateTime<Utc>> = HashMap::new();
        for snapshot in candidates {
            let key = period.bucket_key(&snapshot.creation_time);
            newest_in_bucket
                .entry(key)
                .and_modify(|newest| {
                    if snapshot.creation_time > *newest {
                        *newest = snapshot.creation_time;
                    }
                })
                .or_insert(snapshot.creation_time);
        }

        let mut representatives: Vec<DateTime<Utc>> = candidates
            .iter()
            .map(|snapshot| snapshot.creation_time)
            .filter(|time| newest_in_bucket.get(&period.bucket_key(time)) == Some(time))
            .collect();
        representatives.sort_unstable_by(|a, b| b.cmp(a));

        Self {
            period,
            newest_in_bucket,
            representatives,
        }
    }

    fn is_representative(&self, snapshot: &Snapshot) -> bool {
        let key = self.period.bucket_key(&snapshot.creation_time);
        match self.newest_in_bucket.get(&key) {
            Some(newest) => snapshot.creation_time >= *newest,
            // Not part of the candidate set: it would be alone in its bucket
            None => true,
        }
    }

    fn keeps(&self, snapshot: &Snapshot, limit: usize) -> bool {
        self.is_representative(snapshot)
            && count_newer(&self.representatives, &snapshot.creation_time) < limit
    }
}

/// Retention decisions for one candidate set
#[derive(Debug, Clone)]
pub struct RetentionEvaluation {
    policy: RetentionPolicy,
    newest_first: Vec<DateTime<Utc>>,
    weekly: Option<BucketIndex>,
    monthly: Option<BucketIndex>,
}

impl RetentionEvaluation {
    /// Every criterion under which the snapshot is kept
    pub fn keep_reasons(&self, snapshot: &Snapshot) -> Vec<KeepReason> {
        if self.policy.is_unrestricted() {
            return vec![KeepReason::All];
        }

        let mut reasons = Vec::new();
        if let Some(limit) = self.policy.keep_last {
            if count_newer(&self.newest_first, &snapshot.creation_time) < limit {
                reasons.push(KeepReason::Last);
            }
        }
        if let (Some(limit), Some(index)) = (self.policy.keep_weekly, &self.weekly) {
            if index.keeps(snapshot, limit) {
                reasons.push(KeepReason::Weekly);
            }
        }
        if let (Some(limit), Some(index)) = (self.policy.keep_monthly, &self.monthly) {
            if index.keeps(snapshot, limit) {
                reasons.push(KeepReason::Monthly);
            }
        }
        reasons
    }

    pub fn must_keep(&self, snapshot: &Snapshot) -> bool {
        !self.keep_reasons(snapshot).is_empty()
    }
}
