//! JSON export of a wiki: pages with their revisions, plus accounts.
//!
//! ```json
//! {
//!   "pages": [
//!     {
//!       "title": "Main Page",
//!       "revisions": [
//!         { "id": 1, "author": "Alice", "comment": "create",
//!           "timestamp": "2024-01-01T10:00:00Z",
//!           "content": { "type": "text", "text": "Hello" } }
//!       ]
//!     }
//!   ],
//!   "users": [
//!     { "name": "alice", "password": { "salt": "s", "sha256": "..." },
//!       "can_edit": ["*"] }
//!   ]
//! }
//! ```

use crate::memory::{MemoryWiki, UserRecord};
use crate::provider::HistoryResult;
use crate::types::{Entity, Revision};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WikiSnapshot {
    #[serde(default)]
    pub pages: Vec<PageSnapshot>,
    #[serde(default)]
    pub users: Vec<UserRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub title: String,
    pub revisions: Vec<Revision>,
}

impl WikiSnapshot {
    pub fn load(path: impl AsRef<Path>) -> HistoryResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> HistoryResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Build an in-memory wiki, checking that every chain only links backwards
    pub fn into_wiki(self) -> HistoryResult<MemoryWiki> {
        let wiki = MemoryWiki::new();

        for page in self.pages {
            let entity = Entity::new(&page.title);
            let mut revisions = page.revisions;
            revisions.sort_by_key(|revision| revision.id);
            debug!(entity = %entity, revisions = revisions.len(), "Loading page");
            for revision in revisions {
                wiki.insert(&entity, revision)?;
            }
        }

        for user in self.users {
            wiki.add_user(user);
        }

        Ok(wiki)
    }
}
