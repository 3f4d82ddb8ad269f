//! In-process wiki backing all collaborator interfaces.
//!
//! `MemoryWiki` is what the CLI loads a snapshot into, and what tests use to
//! grow a page's history between two replication runs.

use crate::provider::{
    EntityCatalog, HistoryError, HistoryResult, IdentityProvider, PermissionProvider,
    RevisionProvider,
};
use crate::types::{Entity, Payload, Revision, RevisionId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use subtle::ConstantTimeEq;

/// Grants edit rights on every page
pub const ANY_PAGE: &str = "*";

/// Salted SHA-256 password digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordDigest {
    pub salt: String,
    pub sha256: String,
}

impl PasswordDigest {
    pub fn from_password(salt: impl Into<String>, password: &str) -> Self {
        let salt = salt.into();
        let sha256 = digest(&salt, password);
        Self { salt, sha256 }
    }

    pub fn verify(&self, password: &str) -> bool {
        let candidate = digest(&self.salt, password);
        candidate.as_bytes().ct_eq(self.sha256.as_bytes()).into()
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// A registered wiki account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub password: PasswordDigest,
    /// Page keys this user may edit; `*` grants every page
    #[serde(default)]
    pub can_edit: Vec<String>,
}

impl UserRecord {
    pub fn new(name: impl Into<String>, password: &str) -> Self {
        let name = name.into();
        let password = PasswordDigest::from_password(format!("{name}-salt"), password);
        Self {
            name,
            display_name: None,
            password,
            can_edit: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_edit_rights(mut self, key: impl Into<String>) -> Self {
        self.can_edit.push(key.into());
        self
    }

    fn may_edit(&self, entity: &Entity) -> bool {
        self.can_edit
            .iter()
            .any(|grant| grant == ANY_PAGE || grant == entity.key())
    }
}

/// The content of one new edit, before an id is assigned
#[derive(Debug, Clone)]
pub struct Edit {
    pub content: Payload,
    pub author: Option<String>,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
}

impl Edit {
    pub fn text(text: impl Into<String>) -> Self {
        Self::with_content(Payload::text(text))
    }

    pub fn deletion() -> Self {
        Self::with_content(Payload::Absent)
    }

    pub fn with_content(content: Payload) -> Self {
        Self {
            content,
            author: None,
            comment: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn by(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[derive(Debug, Default)]
struct WikiState {
    /// Head revision per page
    heads: BTreeMap<Entity, RevisionId>,
    revisions: HashMap<RevisionId, Revision>,
    users: HashMap<String, UserRecord>,
    last_id: u64,
}

#[derive(Debug, Default)]
pub struct MemoryWiki {
    state: RwLock<WikiState>,
}

impl MemoryWiki {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, WikiState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, WikiState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an edit on top of the page's current head and return its id
    pub fn edit(&self, entity: &Entity, edit: Edit) -> RevisionId {
        let mut state = self.write();
        state.last_id += 1;
        let id = RevisionId(state.last_id);
        let parent = state.heads.get(entity).copied();

        let revision = Revision {
            id,
            parent,
            content: edit.content,
            author: edit.author,
            comment: edit.comment,
            timestamp: edit.timestamp,
        };
        state.revisions.insert(id, revision);
        state.heads.insert(entity.clone(), id);
        id
    }

    /// Insert a revision with an explicit id and parent link.
    ///
    /// The revision becomes the page head when it is newer than the current one.
    pub fn insert(&self, entity: &Entity, revision: Revision) -> HistoryResult<()> {
        let mut state = self.write();

        if state.revisions.contains_key(&revision.id) {
            return Err(HistoryError::Inconsistent {
                message: format!("duplicate revision id {}", revision.id),
            });
        }
        if let Some(parent) = revision.parent {
            if parent >= revision.id {
                return Err(HistoryError::Inconsistent {
                    message: format!(
                        "revision {} links to non-older revision {}",
                        revision.id, parent
                    ),
                });
            }
        }

        let id = revision.id;
        state.last_id = state.last_id.max(id.get());
        state.revisions.insert(id, revision);
        let head = state.heads.entry(entity.clone()).or_insert(id);
        if *head < id {
            *head = id;
        }
        Ok(())
    }

    pub fn add_user(&self, user: UserRecord) {
        self.write().users.insert(user.name.clone(), user);
    }
}

#[async_trait]
impl RevisionProvider for MemoryWiki {
    async fn latest(&self, entity: &Entity) -> HistoryResult<Option<Revision>> {
        let state = self.read();
        match state.heads.get(entity) {
            Some(id) => state
                .revisions
                .get(id)
                .cloned()
                .map(Some)
                .ok_or(HistoryError::RevisionNotFound { id: *id }),
            None => Ok(None),
        }
    }

    async fn previous(&self, revision: &Revision) -> HistoryResult<Option<Revision>> {
        let Some(parent) = revision.parent else {
            return Ok(None);
        };
        self.read()
            .revisions
            .get(&parent)
            .cloned()
            .map(Some)
            .ok_or(HistoryError::RevisionNotFound { id: parent })
    }
}

#[async_trait]
impl EntityCatalog for MemoryWiki {
    async fn entities_after(
        &self,
        after: Option<&Entity>,
        limit: usize,
    ) -> HistoryResult<Vec<Entity>> {
        let state = self.read();
        let entities = state
            .heads
            .keys()
            .filter(|entity| after.is_none_or(|after| *entity > after))
            .take(limit)
            .cloned()
            .collect();
        Ok(entities)
    }
}

#[async_trait]
impl IdentityProvider for MemoryWiki {
    async fn resolve_user(&self, name: &str) -> Option<UserId> {
        let state = self.read();
        state.users.get(name).map(|user| UserId::new(&user.name))
    }

    async fn check_password(&self, user: &UserId, password: &str) -> bool {
        let state = self.read();
        state
            .users
            .get(user.name())
            .is_some_and(|record| record.password.verify(password))
    }

    async fn display_name(&self, user: &UserId) -> Option<String> {
        let state = self.read();
        let record = state.users.get(user.name())?;
        Some(
            record
                .display_name
                .clone()
                .unwrap_or_else(|| record.name.clone()),
        )
    }
}

#[async_trait]
impl PermissionProvider for MemoryWiki {
    async fn can_edit(&self, user: &UserId, entity: &Entity) -> bool {
        let state = self.read();
        state
            .users
            .get(user.name())
            .is_some_and(|record| record.may_edit(entity))
    }
}
