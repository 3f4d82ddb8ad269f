//! Incremental replication of one entity into its bare repository.
//!
//! A populate run holds the repository lock for its whole duration:
//!
//! 1. make sure the bare repository exists ([`RepositoryManager::ensure`])
//! 2. collect the revisions after the watermark ([`RevisionWalker::pending`])
//! 3. clone the bare repository into a scratch directory
//! 4. commit every pending revision, oldest first
//! 5. optionally compact the clone, then push it back
//! 6. only after a successful push, move the watermark to the last commit
//!
//! The scratch directory and the lock are dropped on every exit path.

use crate::config::{MirrorConfig, RepositoryLayout};
use crate::error::SyncResult;
use crate::git;
use crate::lock::RepositoryLock;
use crate::materializer::CommitMaterializer;
use crate::repository::RepositoryManager;
use crate::scratch::ScratchDir;
use crate::walker::RevisionWalker;
use history::{Entity, Revision, RevisionId, RevisionProvider};
use sandbox::{CommandRunner, CommandSpec, ProcessRunner};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one populate run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub entity: Entity,
    /// Number of commits pushed by this run
    pub committed: usize,
    /// Watermark after the run
    pub watermark: Option<RevisionId>,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.committed == 0
    }
}

pub struct SyncCoordinator {
    config: Arc<MirrorConfig>,
    provider: Arc<dyn RevisionProvider>,
    runner: Arc<dyn CommandRunner>,
    repositories: Arc<RepositoryManager>,
    walker: RevisionWalker,
    materializer: CommitMaterializer,
}

impl SyncCoordinator {
    /// Build a coordinator, failing fast on an invalid configuration
    pub fn new(
        config: MirrorConfig,
        provider: Arc<dyn RevisionProvider>,
        runner: Arc<dyn CommandRunner>,
    ) -> SyncResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let repositories = Arc::new(RepositoryManager::new(config.clone(), runner.clone()));
        let walker =
            RevisionWalker::new(repositories.clone(), provider.clone(), config.max_walk_hops);
        let materializer = CommitMaterializer::new(config.clone(), runner.clone());

        Ok(Self {
            config,
            provider,
            runner,
            repositories,
            walker,
            materializer,
        })
    }

    /// Coordinator running git as child processes bounded by the configured timeout
    pub fn with_process_runner(
        config: MirrorConfig,
        provider: Arc<dyn RevisionProvider>,
    ) -> SyncResult<Self> {
        let runner = Arc::new(ProcessRunner::new(config.command_timeout()));
        Self::new(config, provider, runner)
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    pub fn repositories(&self) -> &RepositoryManager {
        &self.repositories
    }

    /// Replicate everything up to the entity's current latest revision
    pub async fn sync(&self, entity: &Entity) -> SyncResult<SyncReport> {
        let head = self.provider.latest(entity).await?;
        self.populate(entity, head).await
    }

    /// Replicate the revisions between the watermark and `head`
    pub async fn populate(
        &self,
        entity: &Entity,
        head: Option<Revision>,
    ) -> SyncResult<SyncReport> {
        let layout = self.config.layout(entity)?;
        let _lock =
            RepositoryLock::acquire(&self.config.lock_dir(), &layout.repository_key).await?;

        self.repositories.ensure(entity).await?;
        let pending = self.walker.pending(entity, &layout, head).await?;

        let Some(last) = pending.last_id() else {
            debug!(entity = %entity, "Repository is up to date");
            return Ok(SyncReport {
                entity: entity.clone(),
                committed: 0,
                watermark: pending.watermark,
            });
        };

        let scratch = ScratchDir::allocate(&self.config.tmp_dir, self.config.scratch_attempts)?;
        self.clone_into(&layout, &scratch).await?;

        for revision in &pending.revisions {
            self.materializer
                .materialize(scratch.path(), &layout.file_name, revision)
                .await?;
        }

        if self.config.compact_scratch {
            self.compact(&scratch).await;
        }

        self.push(&layout, &scratch).await?;
        self.repositories.write_watermark(&layout, last).await?;

        info!(
            entity = %entity,
            repository = %layout.repository_key,
            committed = pending.len(),
            watermark = %last,
            "Replicated revisions"
        );
        Ok(SyncReport {
            entity: entity.clone(),
            committed: pending.len(),
            watermark: Some(last),
        })
    }

    async fn clone_into(&self, layout: &RepositoryLayout, scratch: &ScratchDir) -> SyncResult<()> {
        let clone = CommandSpec::new("git")
            .args(["clone", "--quiet", "--reference"])
            .arg(&layout.git_dir)
            .arg(&layout.git_dir)
            .arg(scratch.path());
        git::run_checked(self.runner.as_ref(), "clone", clone).await?;
        Ok(())
    }

    /// Failures are logged and ignored
    async fn compact(&self, scratch: &ScratchDir) {
        let gc = git::worktree(scratch.path()).args(["gc", "--quiet"]);
        match self.runner.run(&gc).await {
            Ok(output) if output.success() => debug!("Compacted scratch clone"),
            Ok(output) => warn!(
                exit_code = ?output.exit_code,
                stderr = %output.stderr.trim(),
                "git gc failed on scratch clone"
            ),
            Err(e) => warn!(error = %e, "git gc could not run on scratch clone"),
        }
    }

    async fn push(&self, layout: &RepositoryLayout, scratch: &ScratchDir) -> SyncResult<()> {
        let push = git::worktree(scratch.path())
            .args(["push", "--quiet"])
            .arg(&layout.git_dir)
            .arg(format!("HEAD:refs/heads/{}", self.config.branch));
        git::run_checked(self.runner.as_ref(), "push", push).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::testing::git_available;
    use async_trait::async_trait;
    use history::{Edit, MemoryWiki};
    use sandbox::{CommandOutput, ExecutionResult};

    /// Runs real git but rejects every push
    struct RejectingPushRunner {
        inner: ProcessRunner,
    }

    #[async_trait]
    impl CommandRunner for RejectingPushRunner {
        async fn run(&self, command: &CommandSpec) -> ExecutionResult<CommandOutput> {
            if command.args.iter().any(|arg| arg == "push") {
                return Ok(CommandOutput {
                    stdout: String::new(),
                    stderr: "remote rejected".to_string(),
                    exit_code: Some(1),
                });
            }
            self.inner.run(command).await
        }
    }

    fn config(root: &std::path::Path) -> MirrorConfig {
        MirrorConfig::new()
            .with_base_dir(root.join("git"))
            .with_tmp_dir(root.join("tmp"))
            .with_server("https://wiki.example.org")
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let wiki = Arc::new(MemoryWiki::new());
        let result = SyncCoordinator::with_process_runner(
            MirrorConfig::new().with_base_dir("relative"),
            wiki,
        );
        assert!(matches!(result, Err(SyncError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_populate_commits_and_moves_watermark() {
        if !git_available() {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let entity = Entity::new("Page");
        let wiki = Arc::new(MemoryWiki::new());
        wiki.edit(&entity, Edit::text("one").by("Alice"));
        wiki.edit(&entity, Edit::text("two").by("Bob").comment("second"));

        let coordinator =
            SyncCoordinator::with_process_runner(config(root.path()), wiki.clone()).unwrap();
        let report = coordinator.sync(&entity).await.unwrap();

        assert_eq!(report.committed, 2);
        assert_eq!(report.watermark, Some(RevisionId(2)));

        let layout = coordinator.config().layout(&entity).unwrap();
        let stored = coordinator
            .repositories()
            .read_watermark(&layout)
            .await
            .unwrap();
        assert_eq!(stored, Some(RevisionId(2)));

        let leftovers = std::fs::read_dir(root.path().join("tmp")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_rejected_push_keeps_watermark_and_cleans_scratch() {
        if !git_available() {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let entity = Entity::new("Page");
        let wiki = Arc::new(MemoryWiki::new());
        wiki.edit(&entity, Edit::text("one"));

        let runner = Arc::new(RejectingPushRunner {
            inner: ProcessRunner::default(),
        });
        let coordinator = SyncCoordinator::new(config(root.path()), wiki, runner).unwrap();

        let result = coordinator.sync(&entity).await;
        match result {
            Err(SyncError::GitCommand { step, stderr, .. }) => {
                assert_eq!(step, "push");
                assert_eq!(stderr, "remote rejected");
            }
            other => panic!("expected push failure, got {other:?}"),
        }

        let layout = coordinator.config().layout(&entity).unwrap();
        let stored = coordinator
            .repositories()
            .read_watermark(&layout)
            .await
            .unwrap();
        assert_eq!(stored, None);

        let leftovers = std::fs::read_dir(root.path().join("tmp")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_compaction_does_not_change_result() {
        if !git_available() {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let entity = Entity::new("Compacted");
        let wiki = Arc::new(MemoryWiki::new());
        wiki.edit(&entity, Edit::text("a"));
        wiki.edit(&entity, Edit::text("b"));

        let coordinator = SyncCoordinator::with_process_runner(
            config(root.path()).with_compact_scratch(true),
            wiki,
        )
        .unwrap();
        let report = coordinator.sync(&entity).await.unwrap();
        assert_eq!(report.committed, 2);
        assert_eq!(report.watermark, Some(RevisionId(2)));
    }
}
