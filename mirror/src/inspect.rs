//! Read-only view of a replicated bare repository, using git2.

use chrono::{DateTime, Utc};
use git2::{ErrorCode, Repository, Sort};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InspectError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Invalid timestamp in commit {0}")]
    InvalidTimestamp(String),
}

pub type InspectResult<T> = Result<T, InspectError>;

/// One replicated commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub sha: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub committer_name: String,
    pub author_time: DateTime<Utc>,
    pub committer_time: DateTime<Utc>,
}

fn timestamp(sha: &str, time: git2::Time) -> InspectResult<DateTime<Utc>> {
    DateTime::from_timestamp(time.seconds(), 0)
        .ok_or_else(|| InspectError::InvalidTimestamp(sha.to_string()))
}

fn branch_tip(repo: &Repository, branch: &str) -> InspectResult<Option<git2::Oid>> {
    match repo.find_reference(&format!("refs/heads/{branch}")) {
        Ok(reference) => Ok(reference.target()),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Commits of `branch`, oldest first; empty when the branch has no commit yet
pub fn read_history(git_dir: impl AsRef<Path>, branch: &str) -> InspectResult<Vec<CommitSummary>> {
    let repo = Repository::open_bare(git_dir.as_ref())?;
    let Some(tip) = branch_tip(&repo, branch)? else {
        return Ok(Vec::new());
    };

    let mut walk = repo.revwalk()?;
    walk.push(tip)?;
    walk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;

    let mut commits = Vec::new();
    for oid in walk {
        let commit = repo.find_commit(oid?)?;
        let sha = commit.id().to_string();
        let author = commit.author();
        let committer = commit.committer();
        commits.push(CommitSummary {
            message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
            author_name: String::from_utf8_lossy(author.name_bytes()).into_owned(),
            author_email: String::from_utf8_lossy(author.email_bytes()).into_owned(),
            committer_name: String::from_utf8_lossy(committer.name_bytes()).into_owned(),
            author_time: timestamp(&sha, author.when())?,
            committer_time: timestamp(&sha, committer.when())?,
            sha,
        });
    }
    Ok(commits)
}

/// Content of `file_name` at the tip of `branch`, `None` when it does not exist
pub fn read_file_at_tip(
    git_dir: impl AsRef<Path>,
    branch: &str,
    file_name: &str,
) -> InspectResult<Option<String>> {
    let repo = Repository::open_bare(git_dir.as_ref())?;
    let Some(tip) = branch_tip(&repo, branch)? else {
        return Ok(None);
    };
    let tree = repo.find_commit(tip)?.tree()?;
    let entry = match tree.get_path(Path::new(file_name)) {
        Ok(entry) => entry,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let blob = repo.find_blob(entry.id())?;
    Ok(Some(String::from_utf8_lossy(blob.content()).into_owned()))
}

pub fn file_exists_at_tip(
    git_dir: impl AsRef<Path>,
    branch: &str,
    file_name: &str,
) -> InspectResult<bool> {
    Ok(read_file_at_tip(git_dir, branch, file_name)?.is_some())
}

/// Raw value of a config key of the repository itself
pub fn read_config_value(git_dir: impl AsRef<Path>, key: &str) -> InspectResult<Option<String>> {
    let repo = Repository::open_bare(git_dir.as_ref())?;
    let config = repo.config()?.open_level(git2::ConfigLevel::Local)?;
    match config.get_string(key) {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
