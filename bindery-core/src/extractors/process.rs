//! Shared subprocess runner for the external tool boundary.

use crate::error::{ConversionError, Result, Stage};
use std::ffi::OsStr;
use std::process::Command;

/// Run an external tool to completion, capturing stdout. A non-zero exit
/// becomes a fatal error for the current stage with stderr attached.
pub fn run_cmd<S: AsRef<OsStr>>(
    tool: &str,
    stage: Stage,
    args: &[S],
    envs: &[(&str, &OsStr)],
) -> Result<String> {
    let mut command = Command::new(tool);
    command.args(args);
    for (key, value) in envs {
        command.env(key, value);
    }

    let output = command.output().map_err(|e| ConversionError::Subprocess {
        tool: tool.to_string(),
        stage,
        stderr: format!("failed to launch: {e}"),
    })?;

    if !output.status.success() {
        return Err(ConversionError::Subprocess {
            tool: tool.to_string(),
            stage,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
