//! Run configuration and dataset-to-repository layout

use crate::error::{MigrateError, Result};
use std::path::PathBuf;

/// Validated settings shared by every subcommand
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub layout: RepoLayout,
    pub password_file: PathBuf,
    pub dry_run: bool,
}

impl MigrationConfig {
    pub fn new(
        repo_prefix: &str,
        common_prefix: &str,
        password_file: PathBuf,
        dry_run: bool,
    ) -> Result<Self> {
        let layout = RepoLayout::new(repo_prefix, common_prefix)?;

        if !password_file.is_file() {
            return Err(MigrateError::configuration(format!(
                "Password file does not exist: {}",
                password_file.display()
            )));
        }

        Ok(Self {
            layout,
            password_file,
            dry_run,
        })
    }
}

/// Where a dataset's snapshots land
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    /// Repository location passed to the archive tool
    pub location: String,
    /// Path the snapshot content is recorded under inside the repository
    pub path_in_archive: String,
}

/// Maps datasets onto one repository each below a common prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLayout {
    repo_prefix: String,
    common_prefix: String,
}

impl RepoLayout {
    pub fn new(repo_prefix: &str, common_prefix: &str) -> Result<Self> {
        let repo_prefix = repo_prefix.trim_end_matches('/');
        if repo_prefix.trim().is_empty() {
            return Err(MigrateError::configuration("Repository prefix must not be empty"));
        }

        Ok(Self {
            repo_prefix: repo_prefix.to_string(),
            common_prefix: common_prefix.to_string(),
        })
    }

    /// Resolve the repository for a dataset
    pub fn repository_for(&self, dataset: &str) -> Result<Repository> {
        let relative = dataset.strip_prefix(&self.common_prefix).ok_or_else(|| {
            MigrateError::configuration(format!(
                "Dataset {} does not start with common prefix {}",
                dataset, self.common_prefix
            ))
        })?;
        let relative = relative.trim_matches('/');
        if relative.is_empty() {
            return Err(MigrateError::configuration(format!(
                "Dataset {} is empty once the common prefix is removed",
                dataset
            )));
        }

        Ok(Repository {
            location: format!("{}/{}", self.repo_prefix, relative),
            path_in_archive: format!("/{}", relative),
        })
    }
}
