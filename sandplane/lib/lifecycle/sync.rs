use std::collections::BTreeSet;

use super::SandboxService;
use crate::{
    models::SandboxState,
    registry::{RemovalKind, RemovalStart},
    SandplaneResult,
};

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SandboxService {
    /// Syncs every cluster that has running sandboxes. Returns how many entries were dropped.
    pub async fn sync_clusters(&self) -> usize {
        let clusters: BTreeSet<String> = self
            .inner
            .registry
            .items(Some(SandboxState::Running))
            .await
            .into_iter()
            .map(|sandbox| sandbox.cluster_id)
            .collect();

        let mut dropped = 0;
        for cluster_id in clusters {
            match self.sync_cluster(&cluster_id).await {
                Ok(count) => dropped += count,
                Err(e) => tracing::warn!(cluster_id = %cluster_id, error = %e, "failed to sync cluster"),
            }
        }

        dropped
    }

    /// Drops registry entries of running sandboxes that the cluster's nodes no longer report.
    ///
    /// Returns how many entries were dropped. Sandboxes in a transition are left to it, and a
    /// cluster that does not report its state is skipped.
    pub async fn sync_cluster(&self, cluster_id: &str) -> SandplaneResult<usize> {
        let inner = &self.inner;

        let Some(reported) = inner.fabric.reported_sandboxes(cluster_id).await? else {
            tracing::debug!(cluster_id, "cluster does not report its state");
            return Ok(0);
        };

        let mut dropped = 0;
        for sandbox in inner.registry.items(Some(SandboxState::Running)).await {
            if sandbox.cluster_id != cluster_id || reported.contains(&sandbox.sandbox_id) {
                continue;
            }

            let sandbox_id = sandbox.sandbox_id.as_str();
            match inner
                .registry
                .start_removing(sandbox_id, RemovalKind::Kill)
                .await
            {
                Ok(RemovalStart::Started { transition, .. }) => {
                    inner.registry.remove(sandbox_id);
                    inner
                        .admission
                        .release_team_slot(&sandbox.team_id, sandbox_id);
                    transition.resolve(Ok(()));
                    self.drop_resumed_build(&sandbox).await;
                    dropped += 1;

                    tracing::warn!(
                        sandbox_id,
                        team_id = %sandbox.team_id,
                        cluster_id,
                        node_id = %sandbox.node_id,
                        "sandbox no longer reported by its node, removed"
                    );
                }
                // Moved on since the scan.
                Ok(RemovalStart::InProgress { .. }) => {}
                Err(e) => {
                    tracing::debug!(sandbox_id, error = %e, "sandbox gone before sync");
                }
            }
        }

        Ok(dropped)
    }
}
