//! External process execution bounded by an `ExecContext`.
//!
//! The child is polled rather than waited on so that cancellation or an
//! expired deadline kills it instead of blocking the workflow.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::context::ExecContext;
use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

/// `sh -c <command>` (or `cmd /C` on Windows), optionally in `current_dir`.
pub fn shell_command(command: &str, current_dir: Option<&str>) -> Command {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    };

    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    };

    if let Some(dir) = current_dir {
        cmd.current_dir(dir);
    }
    cmd
}

/// Run a shell command string under `ctx`.
pub fn run_shell(ctx: &ExecContext, command: &str, current_dir: Option<&str>) -> Result<CommandOutput> {
    run_with_context(ctx, shell_command(command, current_dir))
}

/// Run `cmd` to completion, killing it if `ctx` is cancelled or expires.
///
/// A spawn failure is reported as an unsuccessful output (exit code -1), the
/// same way a failing tool is; only context termination is an `Err`.
pub fn run_with_context(ctx: &ExecContext, mut cmd: Command) -> Result<CommandOutput> {
    ctx.check()?;

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return Ok(CommandOutput {
                stdout: String::new(),
                stderr: format!("Command error: {}", e),
                success: false,
                exit_code: -1,
            })
        }
    };

    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let status = loop {
        if let Some(reason) = ctx.state() {
            // Readers are left detached: a grandchild may still hold the pipes.
            kill_quietly(&mut child);
            return Err(ctx.error_for(reason));
        }
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                kill_quietly(&mut child);
                return Err(Error::internal_io(e.to_string(), Some("wait for child".to_string())));
            }
        }
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    Ok(CommandOutput {
        stdout,
        stderr,
        success: status.success(),
        exit_code: status.code().unwrap_or(-1),
    })
}

fn spawn_reader<R: Read + Send + 'static>(stream: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut stream) = stream {
            let _ = stream.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).to_string()
    })
}

fn kill_quietly(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::console::Console;
    use crate::error::ErrorCode;

    fn ctx() -> ExecContext {
        ExecContext::with_console(Console::captured())
    }

    #[test]
    fn captures_output_and_status() {
        let out = run_shell(&ctx(), "echo hello; echo oops >&2; exit 3", None).unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert!(!out.success);
        assert_eq!(out.exit_code, 3);
    }

    #[test]
    fn expired_deadline_kills_running_child() {
        let ctx = ctx().with_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = run_shell(&ctx, "exec sleep 5", None).unwrap_err();
        assert_eq!(err.code, ErrorCode::WorkflowTimeout);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn cancelled_context_never_spawns() {
        let ctx = ctx();
        ctx.cancel();
        let err = run_shell(&ctx, "echo never", None).unwrap_err();
        assert_eq!(err.code, ErrorCode::WorkflowCancelled);
    }
}
