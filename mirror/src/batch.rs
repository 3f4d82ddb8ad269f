//! Initial replication of a whole wiki.

use crate::coordinator::SyncCoordinator;
use crate::error::SyncResult;
use history::{Entity, EntityCatalog};
use std::sync::Arc;
use tracing::{error, info};

/// An entity whose replication failed during a batch run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityFailure {
    pub entity: Entity,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Entities visited, failed ones included
    pub processed: usize,
    /// Total commits pushed across all entities
    pub committed: usize,
    pub failures: Vec<EntityFailure>,
    /// Last entity visited; pass it as `resume_after` to continue an interrupted run
    pub last: Option<Entity>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Walks every entity of the catalog in key order and replicates it
pub struct BatchInitializer {
    coordinator: Arc<SyncCoordinator>,
    catalog: Arc<dyn EntityCatalog>,
    batch_size: usize,
}

impl BatchInitializer {
    pub fn new(coordinator: Arc<SyncCoordinator>, catalog: Arc<dyn EntityCatalog>) -> Self {
        let batch_size = coordinator.config().batch_size;
        Self {
            coordinator,
            catalog,
            batch_size,
        }
    }

    /// Replicate all entities with a key greater than `resume_after`.
    ///
    /// A failing entity is logged and recorded, the run goes on with the next
    /// one. Only a failing catalog stops the run.
    pub async fn run(&self, resume_after: Option<Entity>) -> SyncResult<BatchReport> {
        let mut report = BatchReport {
            last: resume_after,
            ..BatchReport::default()
        };
        let mut batch_number = 0usize;

        loop {
            let entities = self
                .catalog
                .entities_after(report.last.as_ref(), self.batch_size)
                .await?;
            if entities.is_empty() {
                break;
            }
            batch_number += 1;
            info!(
                batch = batch_number,
                size = entities.len(),
                first = %entities[0],
                "Batch {}",
                batch_number
            );

            let full_batch = entities.len() == self.batch_size;
            for entity in entities {
                match self.coordinator.sync(&entity).await {
                    Ok(sync) => report.committed += sync.committed,
                    Err(e) => {
                        error!(entity = %entity, error = %e, "Replication failed");
                        report.failures.push(EntityFailure {
                            entity: entity.clone(),
                            error: e.to_string(),
                        });
                    }
                }
                report.processed += 1;
                report.last = Some(entity);
            }

            if !full_batch {
                break;
            }
        }

        info!(
            processed = report.processed,
            committed = report.committed,
            failed = report.failures.len(),
            "Batch run finished"
        );
        Ok(report)
    }
}
