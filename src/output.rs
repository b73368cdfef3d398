//! Output formatting utilities

use crate::error::Result;
use crate::executor::MigrationReport;
use crate::planner::DatasetStatus;

/// Pretty printer for snapmigrate output
pub struct PrettyPrinter;

impl PrettyPrinter {
    /// Print the per-snapshot migration state of a dataset
    pub fn print_dataset_status(status: &DatasetStatus) {
        println!("📦 Dataset: {}", status.dataset);
        println!("├─ Repository: {}", status.repository);
        println!("├─ Policy: {}", status.policy);
        println!(
            "├─ Snapshots: {} ({} archived, {} pending)",
            status.snapshots.len(),
            status.archived_count(),
            status.pending_count()
        );

        match &status.next {
            Some(next) => println!(
                "├─ Next: {} (parent {})",
                next.snapshot.name,
                next.parent.as_ref().map(|id| id.as_str()).unwrap_or("none")
            ),
            None => println!("├─ Next: nothing to migrate"),
        }

        if status.snapshots.is_empty() {
            println!("└─ No snapshots found.");
            return;
        }

        println!("└─ Snapshots:");
        for (i, entry) in status.snapshots.iter().enumerate() {
            let prefix = if i == status.snapshots.len() - 1 { "   └─" } else { "   ├─" };
            let state = match (&entry.archived_as, entry.meaningful, entry.keep_reasons.is_empty()) {
                (Some(id), _, _) => format!("✅ archived as {}", id),
                (None, false, _) => "⏭️  zero size".to_string(),
                (None, true, true) => "➖ not retained".to_string(),
                (None, true, false) => format!(
                    "⏳ pending ({})",
                    entry
                        .keep_reasons
                        .iter()
                        .map(|reason| reason.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            };
            println!(
                "{} {} {} used {} logical {} {}",
                prefix,
                entry.snapshot.name,
                entry.snapshot.creation_time.format("%Y-%m-%d %H:%M:%S"),
                format_bytes(entry.snapshot.used_bytes),
                format_bytes(entry.snapshot.logical_bytes),
                state
            );
        }
    }

    /// Print what a migration run stored
    pub fn print_migration_report(report: &MigrationReport) {
        let verb = if report.dry_run { "Would store" } else { "Stored" };

        if report.is_empty() {
            println!("✅ {}: nothing to migrate into {}", report.dataset, report.repository);
            return;
        }

        println!("📦 {} → {}", report.dataset, report.repository);
        for (i, record) in report.records.iter().enumerate() {
            let prefix = if i == report.records.len() - 1 { "└─" } else { "├─" };
            println!(
                "{} {} {} as {} (parent {})",
                prefix,
                verb,
                record.snapshot.name,
                record.id,
                record.parent.as_ref().map(|id| id.as_str()).unwrap_or("none")
            );
        }
    }
}

/// JSON formatter for machine-readable output
pub struct JsonFormatter;

impl JsonFormatter {
    /// Format any serializable data as JSON
    pub fn format<T: serde::Serialize + ?Sized>(data: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(data)?)
    }
}

/// Format a byte count for humans
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}
