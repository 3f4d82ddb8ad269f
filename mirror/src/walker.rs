//! Turns "everything newer than the watermark" into an ordered list of
//! revisions to commit.

use crate::config::RepositoryLayout;
use crate::error::{SyncError, SyncResult};
use crate::repository::RepositoryManager;
use history::{Entity, Revision, RevisionId, RevisionProvider};
use std::sync::Arc;
use tracing::debug;

/// Revisions not yet replicated, oldest first
#[derive(Debug, Clone, Default)]
pub struct PendingRevisions {
    /// Watermark read from the repository before walking
    pub watermark: Option<RevisionId>,
    pub revisions: Vec<Revision>,
}

impl PendingRevisions {
    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    /// Id of the newest pending revision
    pub fn last_id(&self) -> Option<RevisionId> {
        self.revisions.last().map(|revision| revision.id)
    }
}

pub struct RevisionWalker {
    repositories: Arc<RepositoryManager>,
    provider: Arc<dyn RevisionProvider>,
    max_hops: usize,
}

impl RevisionWalker {
    pub fn new(
        repositories: Arc<RepositoryManager>,
        provider: Arc<dyn RevisionProvider>,
        max_hops: usize,
    ) -> Self {
        Self {
            repositories,
            provider,
            max_hops,
        }
    }

    /// Read the watermark of `layout` and collect the revisions after it,
    /// starting from `head`
    pub async fn pending(
        &self,
        entity: &Entity,
        layout: &RepositoryLayout,
        head: Option<Revision>,
    ) -> SyncResult<PendingRevisions> {
        let watermark = self.repositories.read_watermark(layout).await?;
        let revisions = self.collect(entity, head, watermark).await?;
        debug!(
            entity = %entity,
            watermark = ?watermark.map(RevisionId::get),
            pending = revisions.len(),
            "Walked revision chain"
        );
        Ok(PendingRevisions {
            watermark,
            revisions,
        })
    }

    /// Walk back from `head` until a revision at or below `watermark`, or the
    /// first revision of the chain.
    ///
    /// Any id not above the watermark ends the walk, so a watermark whose
    /// revision no longer exists in the chain still stops it.
    pub async fn collect(
        &self,
        entity: &Entity,
        head: Option<Revision>,
        watermark: Option<RevisionId>,
    ) -> SyncResult<Vec<Revision>> {
        let mut revisions = Vec::new();
        let mut current = head;

        while let Some(revision) = current {
            if watermark.is_some_and(|watermark| revision.id <= watermark) {
                break;
            }
            if revisions.len() >= self.max_hops {
                return Err(SyncError::WalkLimitExceeded {
                    entity: entity.to_string(),
                    limit: self.max_hops,
                });
            }

            let previous = self.provider.previous(&revision).await?;
            if let Some(previous) = &previous {
                if previous.id >= revision.id {
                    return Err(SyncError::InconsistentChain {
                        entity: entity.to_string(),
                        revision: revision.id,
                        previous: previous.id,
                    });
                }
            }
            revisions.push(revision);
            current = previous;
        }

        revisions.reverse();
        Ok(revisions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MirrorConfig;
    use async_trait::async_trait;
    use chrono::Utc;
    use history::{Edit, HistoryResult, MemoryWiki};
    use sandbox::ProcessRunner;
    use std::collections::HashMap;

    fn walker(provider: Arc<dyn RevisionProvider>, max_hops: usize) -> RevisionWalker {
        let repositories = RepositoryManager::new(
            Arc::new(MirrorConfig::default()),
            Arc::new(ProcessRunner::default()),
        );
        RevisionWalker::new(Arc::new(repositories), provider, max_hops)
    }

    fn ids(revisions: &[Revision]) -> Vec<u64> {
        revisions.iter().map(|r| r.id.get()).collect()
    }

    async fn wiki_with_chain(entity: &Entity, edits: usize) -> Arc<MemoryWiki> {
        let wiki = Arc::new(MemoryWiki::new());
        for i in 0..edits {
            wiki.edit(entity, Edit::text(format!("v{i}")));
        }
        wiki
    }

    #[tokio::test]
    async fn test_collect_without_watermark_returns_whole_chain_oldest_first() {
        let entity = Entity::new("E");
        let wiki = wiki_with_chain(&entity, 4).await;
        let head = wiki.latest(&entity).await.unwrap();

        let revisions = walker(wiki, 100).collect(&entity, head, None).await.unwrap();
        assert_eq!(ids(&revisions), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_collect_stops_at_watermark_exclusive() {
        let entity = Entity::new("E");
        let wiki = wiki_with_chain(&entity, 5).await;
        let head = wiki.latest(&entity).await.unwrap();

        let revisions = walker(wiki, 100)
            .collect(&entity, head, Some(RevisionId(3)))
            .await
            .unwrap();
        assert_eq!(ids(&revisions), vec![4, 5]);
    }

    #[tokio::test]
    async fn test_collect_up_to_date_is_empty() {
        let entity = Entity::new("E");
        let wiki = wiki_with_chain(&entity, 3).await;
        let head = wiki.latest(&entity).await.unwrap();

        let revisions = walker(wiki, 100)
            .collect(&entity, head, Some(RevisionId(3)))
            .await
            .unwrap();
        assert!(revisions.is_empty());
    }

    #[tokio::test]
    async fn test_collect_without_head_is_empty() {
        let wiki = Arc::new(MemoryWiki::new());
        let revisions = walker(wiki, 100)
            .collect(&Entity::new("Missing"), None, None)
            .await
            .unwrap();
        assert!(revisions.is_empty());
    }

    #[tokio::test]
    async fn test_collect_stops_below_missing_watermark() {
        // Ids 2 and 4 belong to another page, so the watermark 4 is never met
        let entity = Entity::new("E");
        let other = Entity::new("Other");
        let wiki = Arc::new(MemoryWiki::new());
        wiki.edit(&entity, Edit::text("a"));
        wiki.edit(&other, Edit::text("x"));
        wiki.edit(&entity, Edit::text("b"));
        wiki.edit(&other, Edit::text("y"));
        wiki.edit(&entity, Edit::text("c"));
        let head = wiki.latest(&entity).await.unwrap();

        let revisions = walker(wiki, 100)
            .collect(&entity, head, Some(RevisionId(4)))
            .await
            .unwrap();
        assert_eq!(ids(&revisions), vec![5]);
    }

    #[tokio::test]
    async fn test_collect_enforces_hop_limit() {
        let entity = Entity::new("Long");
        let wiki = wiki_with_chain(&entity, 10).await;
        let head = wiki.latest(&entity).await.unwrap();

        let result = walker(wiki, 3).collect(&entity, head, None).await;
        assert!(matches!(
            result,
            Err(SyncError::WalkLimitExceeded { limit: 3, .. })
        ));
    }

    struct LoopingProvider {
        revisions: HashMap<u64, Revision>,
    }

    #[async_trait]
    impl RevisionProvider for LoopingProvider {
        async fn latest(&self, _entity: &Entity) -> HistoryResult<Option<Revision>> {
            Ok(self.revisions.get(&2).cloned())
        }

        async fn previous(&self, revision: &Revision) -> HistoryResult<Option<Revision>> {
            Ok(revision
                .parent
                .and_then(|parent| self.revisions.get(&parent.get()).cloned()))
        }
    }

    #[tokio::test]
    async fn test_collect_rejects_forward_links() {
        let now = Utc::now();
        let mut revisions = HashMap::new();
        revisions.insert(2, Revision::new(2, now).with_parent(5).with_text("b"));
        revisions.insert(5, Revision::new(5, now).with_parent(2).with_text("a"));
        let provider = Arc::new(LoopingProvider { revisions });
        let entity = Entity::new("Loop");
        let head = provider.latest(&entity).await.unwrap();

        let result = walker(provider, 100).collect(&entity, head, None).await;
        assert!(matches!(
            result,
            Err(SyncError::InconsistentChain {
                revision: RevisionId(2),
                previous: RevisionId(5),
                ..
            })
        ));
    }
}
