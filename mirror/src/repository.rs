//! Lifecycle of the bare repositories under the base directory.
//!
//! [`RepositoryManager::ensure`] creates a missing repository and rebuilds one
//! that git no longer recognises: an existing directory whose branch listing
//! fails is deleted and initialised again from scratch.

use crate::config::{MirrorConfig, RepositoryLayout};
use crate::error::{SyncError, SyncResult};
use crate::git;
use history::{Entity, RevisionId};
use sandbox::CommandRunner;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct RepositoryManager {
    config: Arc<MirrorConfig>,
    runner: Arc<dyn CommandRunner>,
}

impl RepositoryManager {
    pub fn new(config: Arc<MirrorConfig>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// Make sure a valid bare repository exists for `entity`
    pub async fn ensure(&self, entity: &Entity) -> SyncResult<RepositoryLayout> {
        let layout = self.config.layout(entity)?;
        let git_dir = layout.git_dir.as_path();
        if git_dir.parent() != Some(self.config.base_dir.as_path()) {
            return Err(SyncError::InvalidEntity {
                key: entity.key().to_string(),
                reason: format!(
                    "repository '{}' is not directly below '{}'",
                    git_dir.display(),
                    self.config.base_dir.display()
                ),
            });
        }

        tokio::fs::create_dir_all(&self.config.base_dir)
            .await
            .map_err(|e| SyncError::storage(&self.config.base_dir, e))?;

        if git_dir.is_dir() {
            if self.is_repository(git_dir).await? {
                return Ok(layout);
            }
            warn!(
                entity = %entity,
                path = %git_dir.display(),
                "Directory is not a valid git repository, recreating it"
            );
            tokio::fs::remove_dir_all(git_dir)
                .await
                .map_err(|e| SyncError::storage(git_dir, e))?;
        } else if git_dir.exists() {
            warn!(path = %git_dir.display(), "Replacing file in place of git repository");
            tokio::fs::remove_file(git_dir)
                .await
                .map_err(|e| SyncError::storage(git_dir, e))?;
        }

        tokio::fs::create_dir_all(git_dir)
            .await
            .map_err(|e| SyncError::storage(git_dir, e))?;

        info!(entity = %entity, repository = %layout.repository_key, "Create new git repository");
        git::run_checked(
            self.runner.as_ref(),
            "init",
            git::bare(git_dir).args(["init", "--bare", "--quiet"]),
        )
        .await?;
        git::run_checked(
            self.runner.as_ref(),
            "symbolic-ref",
            git::bare(git_dir)
                .args(["symbolic-ref", "HEAD"])
                .arg(format!("refs/heads/{}", self.config.branch)),
        )
        .await?;

        Ok(layout)
    }

    async fn is_repository(&self, git_dir: &Path) -> SyncResult<bool> {
        let output = self.runner.run(&git::bare(git_dir).arg("branch")).await?;
        Ok(output.success())
    }

    /// Last replicated revision, `None` when nothing was replicated yet
    pub async fn read_watermark(&self, layout: &RepositoryLayout) -> SyncResult<Option<RevisionId>> {
        let output = self
            .runner
            .run(&git::bare(&layout.git_dir).args(["config", "--get", layout.watermark_key.as_str()]))
            .await?;

        match output.exit_code {
            Some(0) => {
                let value = output.stdout_trimmed();
                let watermark = value.parse::<RevisionId>().map_err(|_| {
                    SyncError::InvalidWatermark {
                        repository: layout.git_dir.clone(),
                        value: value.to_string(),
                    }
                })?;
                debug!(repository = %layout.repository_key, watermark = %watermark, "Read watermark");
                Ok(Some(watermark))
            }
            // `git config --get` exits with 1 when the key is not set
            Some(1) => Ok(None),
            exit_code => Err(SyncError::GitCommand {
                step: "config --get".to_string(),
                exit_code,
                stderr: output.stderr.trim().to_string(),
            }),
        }
    }

    pub async fn write_watermark(
        &self,
        layout: &RepositoryLayout,
        revision: RevisionId,
    ) -> SyncResult<()> {
        git::run_checked(
            self.runner.as_ref(),
            "config",
            git::bare(&layout.git_dir)
                .arg("config")
                .arg(&layout.watermark_key)
                .arg(revision.to_string()),
        )
        .await?;
        debug!(repository = %layout.repository_key, watermark = %revision, "Wrote watermark");
        Ok(())
    }
}
