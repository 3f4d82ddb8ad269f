//! Helpers for building `git` invocations

use crate::error::{SyncError, SyncResult};
use sandbox::{CommandOutput, CommandRunner, CommandSpec};
use std::ffi::OsString;
use std::path::Path;

fn path_flag(flag: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(flag);
    arg.push(path.as_os_str());
    arg
}

/// `git --git-dir=<dir>`, for commands against a bare repository
pub(crate) fn bare(git_dir: &Path) -> CommandSpec {
    CommandSpec::new("git").arg(path_flag("--git-dir=", git_dir))
}

/// `git --work-tree=<dir> --git-dir=<dir>/.git`, run from inside the working tree
pub(crate) fn worktree(work_tree: &Path) -> CommandSpec {
    CommandSpec::new("git")
        .arg("--literal-pathspecs")
        .arg(path_flag("--work-tree=", work_tree))
        .arg(path_flag("--git-dir=", &work_tree.join(".git")))
        .current_dir(work_tree)
}

/// Run a git step that has to succeed
pub(crate) async fn run_checked(
    runner: &dyn CommandRunner,
    step: &str,
    command: CommandSpec,
) -> SyncResult<CommandOutput> {
    let output = runner.run(&command).await?;
    if !output.success() {
        return Err(SyncError::GitCommand {
            step: step.to_string(),
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}
