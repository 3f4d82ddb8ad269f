//! One revision in, one commit out.
//!
//! The materializer works against the working tree of a scratch clone. It
//! writes (or removes) the page's file, stages the change and commits it with
//! the revision's author, comment and timestamp. Commits are made even when
//! nothing changed and when the message is empty, so every revision produces
//! exactly one commit.

use crate::config::MirrorConfig;
use crate::error::{SyncError, SyncResult};
use crate::git;
use history::{Payload, Revision};
use sandbox::CommandRunner;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Date format handed to `GIT_AUTHOR_DATE` and `GIT_COMMITTER_DATE`
const GIT_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Name of the commit message file inside the scratch clone's git directory
const MESSAGE_FILE: &str = "WIKIGIT_COMMIT_MSG";

/// Author and committer identity of a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

pub struct CommitMaterializer {
    config: Arc<MirrorConfig>,
    runner: Arc<dyn CommandRunner>,
}

impl CommitMaterializer {
    pub fn new(config: Arc<MirrorConfig>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// Identity derived from the revision's author display name.
    ///
    /// The email is `<name>@<host>` and is never meant to be deliverable.
    pub fn identity(&self, revision: &Revision) -> CommitIdentity {
        let display_name = revision.author().unwrap_or_default();
        let name = if display_name.trim().is_empty() {
            self.config.unknown_author_name.clone()
        } else {
            display_name.to_string()
        };
        CommitIdentity {
            name,
            email: format!("{}@{}", display_name, self.config.host()),
        }
    }

    pub fn message(&self, revision: &Revision) -> String {
        if revision.comment().is_empty() {
            self.config.empty_comment_message.clone()
        } else {
            revision.comment().to_string()
        }
    }

    /// File content for a payload, `None` when the file must be removed
    pub fn file_content<'a>(&'a self, payload: &'a Payload) -> Option<&'a str> {
        match payload {
            Payload::Text { text } => Some(text.as_str()),
            Payload::Unsupported { .. } => Some(self.config.unsupported_content_text.as_str()),
            Payload::Absent => None,
        }
    }

    /// Stage `revision` as the content of `file_name` in `work_tree` and commit it
    pub async fn materialize(
        &self,
        work_tree: &Path,
        file_name: &str,
        revision: &Revision,
    ) -> SyncResult<()> {
        let runner = self.runner.as_ref();

        match self.file_content(revision.content()) {
            Some(content) => {
                let path = work_tree.join(file_name);
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| SyncError::storage(parent, e))?;
                }
                tokio::fs::write(&path, content)
                    .await
                    .map_err(|e| SyncError::storage(&path, e))?;
                git::run_checked(
                    runner,
                    "add",
                    git::worktree(work_tree).args(["add", "--", file_name]),
                )
                .await?;
            }
            None => {
                git::run_checked(
                    runner,
                    "rm",
                    git::worktree(work_tree).args([
                        "rm",
                        "--force",
                        "--quiet",
                        "--ignore-unmatch",
                        "--",
                        file_name,
                    ]),
                )
                .await?;
            }
        }

        let message_path = work_tree.join(".git").join(MESSAGE_FILE);
        tokio::fs::write(&message_path, self.message(revision))
            .await
            .map_err(|e| SyncError::storage(&message_path, e))?;

        let identity = self.identity(revision);
        let date = revision.timestamp().format(GIT_DATE_FORMAT).to_string();
        let mut file_arg = std::ffi::OsString::from("--file=");
        file_arg.push(message_path.as_os_str());

        let commit = git::worktree(work_tree)
            .args(["-c", "commit.gpgsign=false", "commit"])
            .args([
                "--cleanup=verbatim",
                "--allow-empty",
                "--allow-empty-message",
                "--no-verify",
                "--quiet",
            ])
            .arg(file_arg)
            .env("GIT_AUTHOR_NAME", identity.name.as_str())
            .env("GIT_AUTHOR_EMAIL", identity.email.as_str())
            .env("GIT_AUTHOR_DATE", date.as_str())
            .env("GIT_COMMITTER_NAME", identity.name.as_str())
            .env("GIT_COMMITTER_EMAIL", identity.email.as_str())
            .env("GIT_COMMITTER_DATE", date.as_str());
        git::run_checked(runner, "commit", commit).await?;

        debug!(
            revision = %revision.id,
            file = file_name,
            author = %identity.name,
            "Committed revision"
        );
        Ok(())
    }
}
