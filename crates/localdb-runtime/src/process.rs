use crate::RuntimeError;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Run `program` to completion and capture its output.
///
/// The child is killed when `cancel` fires before it exits.
pub(crate) async fn run_captured(
    program: &str,
    args: &[String],
    cancel: &CancellationToken,
) -> Result<Output, RuntimeError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tokio::select! {
        output = cmd.output() => Ok(output?),
        () = cancel.cancelled() => Err(RuntimeError::Cancelled),
    }
}

/// Like [`run_captured`], but fails unless the program exits successfully.
pub(crate) async fn run_checked(
    program: &str,
    args: &[String],
    cancel: &CancellationToken,
) -> Result<Output, RuntimeError> {
    let output = run_captured(program, args, cancel).await?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(command_failed(program, &output))
    }
}

pub(crate) fn command_failed(program: &str, output: &Output) -> RuntimeError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
    let stderr = if stderr.is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_owned()
    } else {
        stderr
    };
    RuntimeError::CommandFailed {
        program: program.to_owned(),
        status: output.status.to_string(),
        stderr,
    }
}

/// Whether `program` can be spawned at all.
pub(crate) fn program_exists(program: &str, probe_arg: &str) -> bool {
    std::process::Command::new(program)
        .arg(probe_arg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}
