//! Bounded external command execution
//!
//! Every call to the container runtime or compose goes through here so a
//! wedged daemon can never hang a cycle.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, WatchdogError};

/// Captured output of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into `CommandFailed`
    pub fn check(self, program: &str) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(WatchdogError::CommandFailed {
                program: program.to_string(),
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Run `program args..` with an upper bound on wall time.
///
/// The child is killed if the timeout elapses.
pub async fn run_command(
    program: &str,
    args: &[&str],
    work_dir: Option<&Path>,
    timeout: Duration,
) -> Result<CommandOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = work_dir {
        cmd.current_dir(dir);
    }

    debug!("Running {} {:?} (timeout {:?})", program, args, timeout);

    let child = cmd.spawn().map_err(|source| WatchdogError::Spawn {
        program: program.to_string(),
        source,
    })?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),
        Ok(Err(e)) => Err(WatchdogError::Io(e)),
        // dropping the wait future drops the child, which kills it
        Err(_) => Err(WatchdogError::Timeout {
            program: program.to_string(),
            timeout,
        }),
    }
}

/// Whether `name` resolves to an executable on PATH (or is one, if a path)
pub fn binary_exists(name: &str) -> bool {
    which::which(name).is_ok()
}
