//! Command implementations for snapmigrate CLI

use crate::archive::{ArchiveId, ArchiveIndex, ResticArchive};
use crate::cli::{Cli, Commands, OutputFormat};
use crate::config::MigrationConfig;
use crate::error::{MigrateError, Result};
use crate::executor::Migrator;
use crate::output::{JsonFormatter, PrettyPrinter};
use crate::retention::RetentionPolicy;
use crate::snapshot::{SnapshotSource, ZfsSource};

/// Build the validated configuration from the global flags
pub fn build_config(cli: &Cli) -> Result<MigrationConfig> {
    let repo_prefix = cli
        .repo_prefix
        .as_deref()
        .ok_or_else(|| MigrateError::configuration("Missing required argument --repo-prefix"))?;
    let password_file = cli
        .password_file
        .clone()
        .ok_or_else(|| MigrateError::configuration("Missing required argument --password-file"))?;

    MigrationConfig::new(repo_prefix, &cli.common_prefix, password_file, cli.dry_run)
}

/// Execute a command against ZFS and restic
pub fn execute_command(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;
    let source = ZfsSource::new();
    let archive = ResticArchive::new(&config.password_file);
    run_command(cli.command, &config, &source, &archive, true)
}

/// Execute a command with explicit collaborators
pub fn run_command(
    command: Commands,
    config: &MigrationConfig,
    source: &dyn SnapshotSource,
    archive: &dyn ArchiveIndex,
    show_progress: bool,
) -> Result<()> {
    let migrator = Migrator::new(source, archive, config.dry_run).with_progress(show_progress);

    match command {
        Commands::SingleSnapshot {
            dataset,
            snapshot,
            parent,
        } => {
            let repository = config.layout.repository_for(&dataset)?;
            let report = migrator.migrate_single(&dataset, &repository, &snapshot, parent.map(ArchiveId::new))?;
            PrettyPrinter::print_migration_report(&report);
            Ok(())
        }
        Commands::NextSnapshotInDataset { dataset, retention } => {
            let repository = config.layout.repository_for(&dataset)?;
            let report = migrator.migrate_next(&dataset, &repository, &retention.policy())?;
            PrettyPrinter::print_migration_report(&report);
            Ok(())
        }
        Commands::Dataset { dataset, retention } => {
            let repository = config.layout.repository_for(&dataset)?;
            let report = migrator.migrate_dataset(&dataset, &repository, &retention.policy())?;
            PrettyPrinter::print_migration_report(&report);
            Ok(())
        }
        Commands::Status {
            dataset,
            retention,
            format,
        } => status_command(&migrator, config, &dataset, &retention.policy(), &format),
    }
}

fn status_command(
    migrator: &Migrator<'_>,
    config: &MigrationConfig,
    dataset: &str,
    policy: &RetentionPolicy,
    format: &str,
) -> Result<()> {
    let format = OutputFormat::parse(format).map_err(MigrateError::configuration)?;
    let repository = config.layout.repository_for(dataset)?;
    let status = migrator.status(dataset, &repository, policy)?;

    match format {
        OutputFormat::Pretty => PrettyPrinter::print_dataset_status(&status),
        OutputFormat::Json => println!("{}", JsonFormatter::format(&status)?),
    }

    Ok(())
}
