//! Replication triggered by page events.

use crate::coordinator::{SyncCoordinator, SyncReport};
use crate::error::SyncResult;
use history::Entity;
use std::sync::Arc;
use tracing::{info, warn};

/// Runs a sync when a page is saved or purged.
///
/// Failures are logged and returned; nothing here panics, so a host can fire
/// these from its event handlers and move on.
#[derive(Clone)]
pub struct SyncNotifier {
    coordinator: Arc<SyncCoordinator>,
}

impl SyncNotifier {
    pub fn new(coordinator: Arc<SyncCoordinator>) -> Self {
        Self { coordinator }
    }

    pub async fn on_page_save(&self, entity: &Entity) -> SyncResult<SyncReport> {
        self.run("save", entity).await
    }

    /// A purge replays the page history, which also catches up any save
    /// whose sync failed earlier
    pub async fn on_page_purge(&self, entity: &Entity) -> SyncResult<SyncReport> {
        self.run("purge", entity).await
    }

    async fn run(&self, event: &str, entity: &Entity) -> SyncResult<SyncReport> {
        match self.coordinator.sync(entity).await {
            Ok(report) => {
                info!(
                    event,
                    entity = %entity,
                    committed = report.committed,
                    "Page event replicated"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(event, entity = %entity, error = %e, "Page event replication failed");
                Err(e)
            }
        }
    }
}
