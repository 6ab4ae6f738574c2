use std::path::Path;
use std::process::Command;

use super::VersionControl;
use crate::context::ExecContext;
use crate::error::{CommandFailedDetails, Error, Result};
use crate::utils::mask::mask_secrets;
use crate::utils::process::{run_with_context, CommandOutput};

/// `VersionControl` backed by the `git` binary.
pub struct GitCli {
    bin: String,
}

impl GitCli {
    pub fn new(bin: &str) -> Self {
        Self {
            bin: if bin.trim().is_empty() {
                "git".to_string()
            } else {
                bin.to_string()
            },
        }
    }

    fn git(&self, ctx: &ExecContext, dir: Option<&Path>, args: &[&str], operation: &str) -> Result<CommandOutput> {
        let mut cmd = Command::new(&self.bin);
        cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }

        let output = run_with_context(ctx, cmd)?;
        if !output.success {
            return Err(Error::platform_command_failed(CommandFailedDetails {
                operation: operation.to_string(),
                command: mask_secrets(&format!("{} {}", self.bin, args.join(" "))),
                exit_code: output.exit_code,
                stdout: mask_secrets(&output.stdout),
                stderr: mask_secrets(&output.stderr),
            }));
        }
        Ok(output)
    }
}

impl VersionControl for GitCli {
    fn clone_repo(&self, ctx: &ExecContext, url: &str, dest: &Path) -> Result<()> {
        log_status!("git", "Cloning {}", mask_secrets(url));
        let dest = dest.to_string_lossy();
        self.git(ctx, None, &["clone", "--quiet", url, &dest], "git clone")
            .map(|_| ())
    }

    fn switch_branch(&self, ctx: &ExecContext, repo: &Path, branch: &str) -> Result<()> {
        self.git(ctx, Some(repo), &["checkout", "--quiet", branch], "git checkout")
            .map(|_| ())
    }

    fn current_branch(&self, ctx: &ExecContext, repo: &Path) -> Result<String> {
        let output = self.git(
            ctx,
            Some(repo),
            &["rev-parse", "--abbrev-ref", "HEAD"],
            "git branch",
        )?;
        Ok(output.stdout.trim().to_string())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::console::Console;
    use crate::error::ErrorCode;

    #[test]
    fn missing_binary_is_a_command_failure() {
        let git = GitCli::new("stagehand-no-such-git");
        let ctx = ExecContext::with_console(Console::captured());
        let dir = tempfile::tempdir().unwrap();
        let err = git.current_branch(&ctx, dir.path()).unwrap_err();
        assert_eq!(err.code, ErrorCode::PlatformCommandFailed);
        assert_eq!(err.details["exit_code"], -1);
    }

    #[test]
    fn blank_binary_defaults_to_git() {
        assert_eq!(GitCli::new(" ").bin, "git");
    }
}
