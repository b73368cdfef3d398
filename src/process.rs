//! External command invocation helpers

use crate::error::{MigrateError, Result};
use std::process::{Command, Output};

/// Render a command line for logs and error messages
pub fn describe(command: &Command) -> String {
    let mut parts = vec![command.get_program().to_string_lossy().to_string()];
    parts.extend(command.get_args().map(|arg| arg.to_string_lossy().to_string()));
    parts.join(" ")
}

/// Run a command to completion, leaving the exit status to the caller
pub fn run(command: &mut Command) -> Result<Output> {
    log::debug!("Running: {}", describe(command));
    Ok(command.output()?)
}

/// External error for a command that exited unsuccessfully
pub fn failure(command: &Command, output: &Output) -> MigrateError {
    MigrateError::External {
        command: describe(command),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

/// Run a command and return its stdout, failing on non-zero exit
pub fn eval(command: &mut Command) -> Result<String> {
    let output = run(command)?;
    if !output.status.success() {
        return Err(failure(command, &output));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Run a command and return its stdout regardless of the exit status
pub fn eval_lenient(command: &mut Command) -> Result<String> {
    let output = run(command)?;
    if !output.status.success() {
        log::debug!(
            "`{}` exited with {}: {}",
            describe(command),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Abort unless running with root privileges
pub fn ensure_root() -> Result<()> {
    if !nix::unistd::geteuid().is_root() {
        return Err(MigrateError::Privilege);
    }
    Ok(())
}
