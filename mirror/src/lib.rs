//! Replicates wiki page histories into bare git repositories and guards
//! pushes to them.
//!
//! [`SyncCoordinator`] turns the revisions added since the last run into one
//! commit each, pushes them and only then moves the watermark stored in the
//! repository. [`TransportGate`] decides, per smart-HTTP request, whether git
//! may proceed: reads always may, pushes need a user allowed to edit the page.

pub mod batch;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gate;
mod git;
pub mod inspect;
pub mod lock;
pub mod materializer;
pub mod notifier;
pub mod repository;
pub mod scratch;
pub mod server;
pub mod walker;

#[cfg(test)]
mod testing;

pub use batch::{BatchInitializer, BatchReport, EntityFailure};
pub use config::{MirrorConfig, Mode, RepositoryLayout, GLOBAL_REPOSITORY_KEY};
pub use coordinator::{SyncCoordinator, SyncReport};
pub use error::{SyncError, SyncResult};
pub use gate::{
    classify, parse_basic, resolve_entity, Access, Credentials, GateDecision, GateError,
    GateRequest, TransportGate,
};
pub use inspect::{CommitSummary, InspectError, InspectResult};
pub use lock::RepositoryLock;
pub use materializer::{CommitIdentity, CommitMaterializer};
pub use notifier::SyncNotifier;
pub use repository::RepositoryManager;
pub use scratch::ScratchDir;
pub use walker::{PendingRevisions, RevisionWalker};
