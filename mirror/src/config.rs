use crate::error::{SyncError, SyncResult};
use history::Entity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name of the shared repository in global mode
pub const GLOBAL_REPOSITORY_KEY: &str = "_global";

const LOCK_DIR_NAME: &str = ".locks";

fn invalid_entity(key: &str, reason: impl Into<String>) -> SyncError {
    SyncError::InvalidEntity {
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// A key is used as a relative path inside a working tree, segment by segment.
/// Empty, `.`, `..` and `.git` segments would escape it or clobber git metadata.
fn check_entity_key(key: &str) -> SyncResult<()> {
    if key.is_empty() {
        return Err(invalid_entity(key, "empty key"));
    }
    if key.contains('\0') {
        return Err(invalid_entity(key, "NUL byte"));
    }
    for segment in key.split('/') {
        if segment.is_empty() {
            return Err(invalid_entity(key, "empty path segment"));
        }
        if segment == "." || segment == ".." || segment.eq_ignore_ascii_case(".git") {
            return Err(invalid_entity(key, format!("path segment '{segment}'")));
        }
    }
    Ok(())
}

/// Directory name of a page repository: `%` and `/` are percent-encoded so
/// that a subpage never lands inside the repository of its parent page
fn repository_dir_name(key: &str) -> String {
    key.replace('%', "%25").replace('/', "%2F")
}

/// How pages map onto bare repositories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// One bare repository per page, holding a single file
    #[serde(rename = "one-git-per-page")]
    OneRepositoryPerPage,
    /// One bare repository for the whole wiki, one file per page
    #[serde(rename = "one-global-git")]
    OneGlobalRepository,
}

/// Where one entity lives on disk and in git
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLayout {
    /// Key of the bare repository (the page key, or the global key)
    pub repository_key: String,
    pub git_dir: PathBuf,
    /// Path of the page's file inside a working tree
    pub file_name: String,
    /// Git config key holding the watermark
    pub watermark_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Directory holding the bare repositories
    pub base_dir: PathBuf,
    pub mode: Mode,
    /// Origin server URL, used to synthesize commit emails
    pub server: String,
    /// Parent directory of scratch clones
    pub tmp_dir: PathBuf,
    /// Branch pushed to in every bare repository
    pub branch: String,
    pub command_timeout_secs: u64,
    /// Run `git gc` on the scratch clone before pushing
    pub compact_scratch: bool,
    pub max_walk_hops: usize,
    pub scratch_attempts: usize,
    pub batch_size: usize,
    pub empty_comment_message: String,
    pub unsupported_content_text: String,
    /// Name used when a revision has no visible author; git rejects empty idents
    pub unknown_author_name: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/var/lib/wikigit"),
            mode: Mode::OneRepositoryPerPage,
            server: "http://localhost".to_string(),
            tmp_dir: std::env::temp_dir(),
            branch: "master".to_string(),
            command_timeout_secs: 120,
            compact_scratch: false,
            max_walk_hops: 1_000_000,
            scratch_attempts: 5,
            batch_size: 500,
            empty_comment_message: "(no edit summary)".to_string(),
            unsupported_content_text: "(this revision has no text representation)".to_string(),
            unknown_author_name: "Unknown".to_string(),
        }
    }
}

impl MirrorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    pub fn with_tmp_dir(mut self, tmp_dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = tmp_dir.into();
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_compact_scratch(mut self, compact: bool) -> Self {
        self.compact_scratch = compact;
        self
    }

    pub fn with_max_walk_hops(mut self, hops: usize) -> Self {
        self.max_walk_hops = hops;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Server host with any `http://`, `https://` or `//` prefix removed
    pub fn host(&self) -> &str {
        let server = self.server.trim();
        ["https://", "http://", "//"]
            .iter()
            .find_map(|prefix| server.strip_prefix(prefix))
            .unwrap_or(server)
    }

    /// Where `entity` lives, or `InvalidEntity` when its key cannot be used
    /// as a path below the base directory
    pub fn layout(&self, entity: &Entity) -> SyncResult<RepositoryLayout> {
        check_entity_key(entity.key())?;
        let file_name = entity.title();

        let layout = match self.mode {
            Mode::OneRepositoryPerPage => {
                let directory = repository_dir_name(entity.key());
                if directory == LOCK_DIR_NAME {
                    return Err(invalid_entity(entity.key(), "reserved for lock files"));
                }
                RepositoryLayout {
                    repository_key: entity.key().to_string(),
                    git_dir: self.base_dir.join(directory),
                    file_name,
                    watermark_key: "wikigit.revid".to_string(),
                }
            }
            Mode::OneGlobalRepository => RepositoryLayout {
                repository_key: GLOBAL_REPOSITORY_KEY.to_string(),
                git_dir: self.base_dir.join(GLOBAL_REPOSITORY_KEY),
                file_name,
                watermark_key: format!("wikigit.{}.revid", entity.key()),
            },
        };
        Ok(layout)
    }

    /// Directory holding the per-repository lock files
    pub fn lock_dir(&self) -> PathBuf {
        self.base_dir.join(LOCK_DIR_NAME)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.base_dir.as_os_str().is_empty() {
            return Err(SyncError::config("Base directory cannot be empty"));
        }

        if !self.base_dir.is_absolute() {
            return Err(SyncError::config(format!(
                "Base directory must be absolute, got '{}'",
                self.base_dir.display()
            )));
        }

        if self.tmp_dir.as_os_str().is_empty() {
            return Err(SyncError::config("Temporary directory cannot be empty"));
        }

        if self.branch.is_empty() || self.branch.contains(char::is_whitespace) {
            return Err(SyncError::config(format!(
                "Invalid branch name '{}'",
                self.branch
            )));
        }

        if self.command_timeout_secs == 0 {
            return Err(SyncError::config("Command timeout must be greater than 0"));
        }

        if self.scratch_attempts == 0 {
            return Err(SyncError::config("Scratch attempts must be greater than 0"));
        }

        if self.batch_size == 0 {
            return Err(SyncError::config("Batch size must be greater than 0"));
        }

        if self.max_walk_hops == 0 {
            return Err(SyncError::config("Walk hop limit must be greater than 0"));
        }

        Ok(())
    }

    pub fn from_toml_str(raw: &str) -> SyncResult<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| SyncError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SyncError::config(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }
}
