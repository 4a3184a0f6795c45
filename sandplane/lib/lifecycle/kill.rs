use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::{sync::Semaphore, task::JoinSet};

use super::{service::check_owner, SandboxService};
use crate::{
    fabric::RemoveAction,
    models::SandboxState,
    registry::{RemovalKind, RemovalStart, TransitionOutcome},
    SandplaneError, SandplaneResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The tally of a bulk kill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkKillSummary {
    /// Sandboxes removed.
    pub killed: usize,

    /// Sandboxes whose kill failed.
    pub failed: usize,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SandboxService {
    /// Kills one of the team's sandboxes and deletes its paused snapshot, if any.
    ///
    /// Succeeds when either a live sandbox or a snapshot was removed. A node that fails to stop
    /// the sandbox does not keep it in the registry.
    pub async fn kill(&self, team_id: &str, sandbox_id: &str) -> SandplaneResult<()> {
        let mut removed = false;

        if let Some(sandbox) = self.inner.registry.get(sandbox_id).await {
            check_owner(sandbox.get_team_id(), team_id, sandbox_id)?;
            removed = self.kill_live(sandbox_id).await?;
        }

        let deleted = self.inner.deleter.delete_snapshot(sandbox_id, team_id).await?;

        if removed || deleted {
            Ok(())
        } else {
            Err(SandplaneError::NotFound(format!(
                "sandbox {sandbox_id} not found"
            )))
        }
    }

    /// Kills every running sandbox of the team, a bounded number at a time.
    pub async fn kill_all(&self, team_id: &str) -> BulkKillSummary {
        let running = self
            .inner
            .registry
            .team_items(team_id, Some(SandboxState::Running))
            .await;
        let limiter = Arc::new(Semaphore::new(
            self.inner.config.bulk_kill_concurrency.max(1),
        ));

        let mut tasks = JoinSet::new();
        for sandbox in running {
            let service = self.clone();
            let limiter = limiter.clone();
            let team_id = team_id.to_string();
            tasks.spawn(async move {
                let Ok(_permit) = limiter.acquire_owned().await else {
                    return Err(SandplaneError::Unavailable("bulk kill aborted".to_string()));
                };
                service.kill(&team_id, sandbox.get_sandbox_id()).await
            });
        }

        let mut summary = BulkKillSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => summary.killed += 1,
                Ok(Err(e)) => {
                    tracing::warn!(team_id, error = %e, "failed to kill sandbox");
                    summary.failed += 1;
                }
                Err(e) => {
                    tracing::error!(team_id, error = %e, "kill task failed");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            team_id,
            killed = summary.killed,
            failed = summary.failed,
            "bulk kill finished"
        );
        summary
    }

    /// Takes a live sandbox off its node and out of the registry. Returns whether this call or a
    /// concurrent kill removed it.
    async fn kill_live(&self, sandbox_id: &str) -> SandplaneResult<bool> {
        let inner = &self.inner;

        // A pause in flight is awaited once; if it failed, the kill takes over.
        for _ in 0..2 {
            let start = match inner
                .registry
                .start_removing(sandbox_id, RemovalKind::Kill)
                .await
            {
                Ok(start) => start,
                Err(SandplaneError::NotFound(_)) => return Ok(false),
                Err(e) => return Err(e),
            };

            match start {
                RemovalStart::Started {
                    sandbox,
                    transition,
                    ..
                } => {
                    if let Err(e) = inner
                        .fabric
                        .remove_from_node(&sandbox, RemoveAction::Kill)
                        .await
                    {
                        tracing::warn!(
                            sandbox_id,
                            node_id = %sandbox.node_id,
                            cluster_id = %sandbox.cluster_id,
                            error = %e,
                            "failed to remove sandbox from node"
                        );
                    }

                    inner.registry.remove(sandbox_id);
                    inner
                        .admission
                        .release_team_slot(&sandbox.team_id, sandbox_id);
                    transition.resolve(Ok(()));
                    self.drop_resumed_build(&sandbox).await;

                    tracing::info!(
                        sandbox_id,
                        team_id = %sandbox.team_id,
                        "sandbox killed"
                    );
                    return Ok(true);
                }
                RemovalStart::InProgress {
                    state: SandboxState::Killing,
                    mut waiter,
                } => {
                    return match waiter.wait().await {
                        TransitionOutcome::Failed(message) => {
                            Err(SandplaneError::Internal(message))
                        }
                        TransitionOutcome::Completed | TransitionOutcome::Closed => Ok(true),
                    };
                }
                RemovalStart::InProgress { mut waiter, .. } => {
                    match waiter.wait().await {
                        // Now a snapshot; the caller deletes it.
                        TransitionOutcome::Completed | TransitionOutcome::Closed => {
                            return Ok(false)
                        }
                        TransitionOutcome::Failed(_) => continue,
                    }
                }
            }
        }

        Err(SandplaneError::Internal(format!(
            "sandbox {sandbox_id} could not be killed"
        )))
    }
}
