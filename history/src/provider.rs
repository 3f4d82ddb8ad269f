use crate::types::{Entity, Revision, RevisionId, UserId};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Entity not found: {key}")]
    EntityNotFound { key: String },

    #[error("Revision not found: {id}")]
    RevisionNotFound { id: RevisionId },

    #[error("Inconsistent revision data: {message}")]
    Inconsistent { message: String },

    #[error("Snapshot IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot parse error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Provider unavailable: {message}")]
    Unavailable { message: String },
}

pub type HistoryResult<T> = Result<T, HistoryError>;

/// Read access to the host's revision storage
#[async_trait]
pub trait RevisionProvider: Send + Sync {
    /// Most recent revision of a page, `None` if the page has no history
    async fn latest(&self, entity: &Entity) -> HistoryResult<Option<Revision>>;

    /// The revision before `revision`, `None` at genesis
    async fn previous(&self, revision: &Revision) -> HistoryResult<Option<Revision>>;
}

/// Enumerates every page in ascending key order
#[async_trait]
pub trait EntityCatalog: Send + Sync {
    /// Up to `limit` entities whose key sorts strictly after `after`
    async fn entities_after(
        &self,
        after: Option<&Entity>,
        limit: usize,
    ) -> HistoryResult<Vec<Entity>>;
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Look up a registered account by name
    async fn resolve_user(&self, name: &str) -> Option<UserId>;

    async fn check_password(&self, user: &UserId, password: &str) -> bool;

    async fn display_name(&self, user: &UserId) -> Option<String>;
}

#[async_trait]
pub trait PermissionProvider: Send + Sync {
    async fn can_edit(&self, user: &UserId, entity: &Entity) -> bool;
}
