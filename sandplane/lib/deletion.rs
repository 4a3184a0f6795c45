//! Removal of paused snapshots and the artifacts behind them.
//!
//! The database rows go first, in one statement; the template cache is invalidated next; the
//! build artifacts are then deleted by a detached task that the caller never waits on. A failure
//! to delete artifacts is logged and left to a later sweep.

use std::sync::Arc;

use sqlx::{Pool, Sqlite};
use tokio_util::task::TaskTracker;

use crate::{
    fabric::NodeFabric, models::SnapshotLineage, store, templates::TemplateResolver,
    SandplaneResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Deletes paused snapshots.
#[derive(Clone)]
pub struct SnapshotDeleter {
    pool: Pool<Sqlite>,
    fabric: Arc<dyn NodeFabric>,
    templates: Arc<dyn TemplateResolver>,
    tracker: TaskTracker,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SnapshotDeleter {
    /// Creates a deleter whose cleanup tasks are spawned on `tracker`.
    pub fn new(
        pool: Pool<Sqlite>,
        fabric: Arc<dyn NodeFabric>,
        templates: Arc<dyn TemplateResolver>,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            pool,
            fabric,
            templates,
            tracker,
        }
    }

    /// Deletes the team's snapshot of a sandbox. Returns whether there was one.
    ///
    /// Deleting a snapshot that does not exist, including one deleted by a concurrent call, is
    /// not an error.
    pub async fn delete_snapshot(&self, sandbox_id: &str, team_id: &str) -> SandplaneResult<bool> {
        let Some(lineage) = store::get_snapshot_lineage(&self.pool, sandbox_id, team_id).await?
        else {
            return Ok(false);
        };

        let deleted = self.delete_lineage(lineage).await?;
        if deleted {
            tracing::info!(sandbox_id, team_id, "snapshot deleted");
        }

        Ok(deleted)
    }

    /// Deletes a snapshot template whose snapshot row is already gone, as left behind by a
    /// resumed sandbox once it no longer runs from that build.
    pub async fn delete_template_lineage(&self, template_id: &str) -> SandplaneResult<bool> {
        match store::get_template_lineage(&self.pool, template_id).await? {
            Some(lineage) => self.delete_lineage(lineage).await,
            None => Ok(false),
        }
    }

    async fn delete_lineage(&self, lineage: SnapshotLineage) -> SandplaneResult<bool> {
        if !store::delete_template(&self.pool, lineage.get_template_id()).await? {
            return Ok(false);
        }

        self.templates.invalidate(lineage.get_template_id());

        let fabric = self.fabric.clone();
        self.tracker.spawn(async move {
            for build_id in lineage.get_build_ids() {
                if let Err(e) = fabric
                    .delete_build_artifacts(lineage.get_cluster_id(), build_id)
                    .await
                {
                    tracing::error!(
                        template_id = %lineage.get_template_id(),
                        cluster_id = %lineage.get_cluster_id(),
                        build_id = %build_id,
                        error = %e,
                        "failed to delete snapshot build artifacts"
                    );
                }
            }
        });

        Ok(true)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl std::fmt::Debug for SnapshotDeleter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotDeleter")
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}
