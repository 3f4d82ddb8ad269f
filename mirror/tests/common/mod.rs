#![allow(dead_code)]

use history::MemoryWiki;
use mirror::{MirrorConfig, SyncCoordinator};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

/// Tests that drive real git return early when it is not installed
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

pub fn config(root: &Path) -> MirrorConfig {
    MirrorConfig::new()
        .with_base_dir(root.join("git"))
        .with_tmp_dir(root.join("tmp"))
        .with_server("https://wiki.example.org")
}

pub fn coordinator(config: MirrorConfig, wiki: &Arc<MemoryWiki>) -> Arc<SyncCoordinator> {
    Arc::new(SyncCoordinator::with_process_runner(config, wiki.clone()).unwrap())
}

pub fn scratch_leftovers(root: &Path) -> usize {
    match std::fs::read_dir(root.join("tmp")) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}
