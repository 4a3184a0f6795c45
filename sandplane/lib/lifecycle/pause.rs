use uuid::Uuid;

use super::{service::check_owner, SandboxService};
use crate::{
    fabric::{RemovalOutcome, RemoveAction},
    models::{PausedSnapshot, Sandbox, SandboxState},
    registry::{RemovalKind, RemovalStart, Transition, TransitionOutcome},
    store, utils, SandplaneError, SandplaneResult,
};

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SandboxService {
    /// Pauses one of the team's running sandboxes and waits for its snapshot to be persisted.
    ///
    /// The capture runs in a detached task. Dropping the returned future stops the wait, not the
    /// capture, and a retried pause joins the capture still in flight.
    pub async fn pause(&self, team_id: &str, sandbox_id: &str) -> SandplaneResult<()> {
        let inner = &self.inner;

        let Some(sandbox) = inner.registry.get(sandbox_id).await else {
            return Err(self.not_running_error(team_id, sandbox_id).await?);
        };
        check_owner(sandbox.get_team_id(), team_id, sandbox_id)?;

        let start = match inner
            .registry
            .start_removing(sandbox_id, RemovalKind::Pause)
            .await
        {
            Ok(start) => start,
            Err(SandplaneError::NotFound(_)) => {
                return Err(self.not_running_error(team_id, sandbox_id).await?)
            }
            Err(e) => return Err(e),
        };

        match start {
            RemovalStart::Started {
                sandbox,
                transition,
                mut waiter,
            } => {
                self.spawn_capture(sandbox, transition);
                match waiter.wait().await {
                    TransitionOutcome::Completed => Ok(()),
                    TransitionOutcome::Failed(message) => Err(SandplaneError::Internal(message)),
                    TransitionOutcome::Closed => Err(already_paused(sandbox_id)),
                }
            }
            RemovalStart::InProgress { state, mut waiter } => {
                tracing::debug!(sandbox_id, %state, "joining transition in flight");
                if state != SandboxState::Pausing {
                    return Err(SandplaneError::Conflict(format!(
                        "sandbox {sandbox_id} is {state}"
                    )));
                }

                match waiter.wait().await {
                    TransitionOutcome::Failed(message) => Err(SandplaneError::Internal(message)),
                    TransitionOutcome::Completed | TransitionOutcome::Closed => {
                        Err(already_paused(sandbox_id))
                    }
                }
            }
        }
    }

    /// Starts pausing a running sandbox without waiting for the capture. Returns whether this
    /// call started the transition.
    pub(super) async fn begin_pause(&self, sandbox_id: &str) -> SandplaneResult<bool> {
        match self
            .inner
            .registry
            .start_removing(sandbox_id, RemovalKind::Pause)
            .await
        {
            Ok(RemovalStart::Started {
                sandbox,
                transition,
                ..
            }) => {
                self.spawn_capture(sandbox, transition);
                Ok(true)
            }
            Ok(RemovalStart::InProgress { .. }) | Err(SandplaneError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Runs the node-side capture and the persist-then-deregister step off the caller's task.
    fn spawn_capture(&self, sandbox: Sandbox, transition: Transition) {
        let service = self.clone();
        self.inner.tracker.spawn(async move {
            let sandbox_id = sandbox.sandbox_id.clone();
            let team_id = sandbox.team_id.clone();

            match service.capture(&sandbox).await {
                Ok(()) => {
                    service.inner.registry.remove(&sandbox_id);
                    service
                        .inner
                        .admission
                        .release_team_slot(&team_id, &sandbox_id);
                    transition.resolve(Ok(()));
                    tracing::info!(
                        sandbox_id = %sandbox_id,
                        team_id = %team_id,
                        cluster_id = %sandbox.cluster_id,
                        "sandbox paused"
                    );
                    service.drop_resumed_build(&sandbox).await;
                }
                Err(e) => {
                    tracing::error!(
                        sandbox_id = %sandbox_id,
                        team_id = %team_id,
                        node_id = %sandbox.node_id,
                        error = %e,
                        "failed to pause sandbox"
                    );
                    transition.resolve(Err(format!("failed to pause sandbox: {e}")));
                }
            }
        });
    }

    async fn capture(&self, sandbox: &Sandbox) -> SandplaneResult<()> {
        let inner = &self.inner;
        let build_id = Uuid::new_v4().to_string();

        let outcome = inner
            .fabric
            .remove_from_node(
                sandbox,
                RemoveAction::Pause {
                    build_id: build_id.clone(),
                },
            )
            .await?;
        if let RemovalOutcome::Capturing(capture) = outcome {
            capture.await?;
        }

        let snapshot = PausedSnapshot::builder()
            .sandbox_id(sandbox.sandbox_id.clone())
            .team_id(sandbox.team_id.clone())
            .template_id(Uuid::new_v4().to_string())
            .base_template_id(sandbox.template_id.clone())
            .build_id(build_id)
            .cluster_id(sandbox.cluster_id.clone())
            .alias(sandbox.alias.clone())
            .resources(sandbox.resources)
            .metadata(sandbox.metadata.clone())
            .sandbox_started_at(sandbox.started_at)
            .created_at(utils::now_micros())
            .build();

        store::insert_snapshot(&inner.pool, &snapshot).await
    }

    /// The error for a pause of a sandbox that is not in the registry.
    async fn not_running_error(
        &self,
        team_id: &str,
        sandbox_id: &str,
    ) -> SandplaneResult<SandplaneError> {
        let paused = store::get_snapshot(&self.inner.pool, sandbox_id, team_id)
            .await?
            .is_some();

        Ok(if paused {
            already_paused(sandbox_id)
        } else {
            SandplaneError::NotFound(format!("sandbox {sandbox_id} not found"))
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn already_paused(sandbox_id: &str) -> SandplaneError {
    SandplaneError::Conflict(format!("sandbox {sandbox_id} is already paused"))
}
