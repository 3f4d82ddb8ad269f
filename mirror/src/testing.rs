use std::process::{Command, Stdio};

/// Whether a usable `git` binary is on the PATH
pub(crate) fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
