pub mod memory;
pub mod provider;
pub mod snapshot;
pub mod types;

pub use memory::{Edit, MemoryWiki, PasswordDigest, UserRecord, ANY_PAGE};
pub use provider::{
    EntityCatalog, HistoryError, HistoryResult, IdentityProvider, PermissionProvider,
    RevisionProvider,
};
pub use snapshot::{PageSnapshot, WikiSnapshot};
pub use types::{Entity, Payload, Revision, RevisionId, UserId};

pub mod prelude {
    pub use crate::memory::*;
    pub use crate::provider::*;
    pub use crate::types::*;
}
