use std::collections::HashMap;

use serde::Deserialize;
use typed_builder::TypedBuilder;

use super::{create::requested_lifetime, service::check_owner, SandboxService};
use crate::{
    fabric::CreateRequest,
    models::{PausedSnapshot, Sandbox, SandboxState, Team},
    registry::TransitionOutcome,
    store, utils, SandplaneError, SandplaneResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// What the caller asks for when resuming a paused sandbox.
#[derive(Debug, Clone, Default, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct ResumeSandboxRequest {
    /// Lifetime in seconds; the configured default when absent.
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub timeout: Option<u64>,

    /// Pause instead of kill when the deadline passes.
    #[serde(default)]
    #[builder(default)]
    pub auto_pause: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SandboxService {
    /// Starts one of the team's paused sandboxes again, under its old identifier and with its
    /// labels and alias.
    ///
    /// A pause still in flight is waited for. The snapshot row is claimed before the node starts
    /// the sandbox and put back if the start fails, so concurrent resumes never both start it.
    /// The start runs off the caller's task: dropping the returned future cannot lose the
    /// snapshot.
    pub async fn resume(
        &self,
        team: &Team,
        sandbox_id: &str,
        request: ResumeSandboxRequest,
    ) -> SandplaneResult<Sandbox> {
        let inner = &self.inner;
        let lifetime = requested_lifetime(
            team,
            request.timeout,
            inner.config.default_sandbox_timeout(),
        )?;

        self.wait_for_pause(&team.id, sandbox_id).await?;

        let Some(snapshot) = store::take_snapshot(&inner.pool, sandbox_id, &team.id).await? else {
            return Err(SandplaneError::NotFound(format!(
                "sandbox {sandbox_id} snapshot not found"
            )));
        };

        let service = self.clone();
        let team = team.clone();
        let handle = inner.tracker.spawn(async move {
            match service
                .start_resumed(&team, &snapshot, lifetime, request.auto_pause)
                .await
            {
                Ok(sandbox) => Ok(sandbox),
                Err(e) => {
                    if let Err(restore) =
                        store::restore_snapshot(&service.inner.pool, &snapshot).await
                    {
                        tracing::error!(
                            sandbox_id = %snapshot.sandbox_id,
                            team_id = %snapshot.team_id,
                            error = %restore,
                            "failed to put back the snapshot of a failed resume"
                        );
                    }
                    Err(e)
                }
            }
        });

        handle.await?
    }

    /// Deletes the snapshot build a resumed sandbox ran from, once the sandbox left its node.
    pub(super) async fn drop_resumed_build(&self, sandbox: &Sandbox) {
        let Some(template_id) = &sandbox.resumed_from else {
            return;
        };

        if let Err(e) = self
            .inner
            .deleter
            .delete_template_lineage(template_id)
            .await
        {
            tracing::error!(
                sandbox_id = %sandbox.sandbox_id,
                template_id = %template_id,
                error = %e,
                "failed to delete the snapshot a resumed sandbox ran from"
            );
        }
    }

    async fn wait_for_pause(&self, team_id: &str, sandbox_id: &str) -> SandplaneResult<()> {
        let inner = &self.inner;
        let Some(sandbox) = inner.registry.get(sandbox_id).await else {
            return Ok(());
        };
        check_owner(sandbox.get_team_id(), team_id, sandbox_id)?;

        match inner.registry.transition_of(sandbox_id).await {
            None => Ok(()),
            Some((SandboxState::Pausing, Some(mut waiter))) => {
                tracing::debug!(sandbox_id, "resume waiting for pause in flight");
                match waiter.wait().await {
                    TransitionOutcome::Failed(message) => Err(SandplaneError::Internal(message)),
                    TransitionOutcome::Completed | TransitionOutcome::Closed => Ok(()),
                }
            }
            Some((SandboxState::Running, _)) => Err(SandplaneError::Conflict(format!(
                "sandbox {sandbox_id} is already running"
            ))),
            Some((state, _)) => Err(SandplaneError::Conflict(format!(
                "sandbox {sandbox_id} is {state}"
            ))),
        }
    }

    async fn start_resumed(
        &self,
        team: &Team,
        snapshot: &PausedSnapshot,
        lifetime: chrono::TimeDelta,
        auto_pause: bool,
    ) -> SandplaneResult<Sandbox> {
        let inner = &self.inner;
        let sandbox_id = snapshot.sandbox_id.as_str();

        let permit = inner.admission.acquire_creation_slot().await?;
        let reservation =
            inner
                .admission
                .reserve_team_slot(&team.id, sandbox_id, team.concurrent_instances)?;

        let started_at = utils::now_micros();
        let end_at = utils::saturating_add(started_at, lifetime);
        let create_request = CreateRequest::builder()
            .sandbox_id(sandbox_id)
            .team_id(team.id.clone())
            .template_id(snapshot.base_template_id.clone())
            .build_id(snapshot.build_id.clone())
            .cluster_id(snapshot.cluster_id.clone())
            .resources(snapshot.resources)
            .started_at(started_at)
            .end_at(end_at)
            .metadata(snapshot.metadata.clone())
            .build();

        let placement = inner
            .fabric
            .create_on_node(&create_request)
            .await
            .map_err(|e| {
                tracing::error!(
                    sandbox_id,
                    team_id = %team.id,
                    cluster_id = %snapshot.cluster_id,
                    build_id = %snapshot.build_id,
                    error = %e,
                    "failed to resume sandbox on node"
                );
                SandplaneError::Internal(format!("failed to resume sandbox: {e}"))
            })?;

        let sandbox = Sandbox {
            sandbox_id: sandbox_id.to_string(),
            team_id: team.id.clone(),
            template_id: snapshot.base_template_id.clone(),
            build_id: snapshot.build_id.clone(),
            alias: snapshot.alias.clone(),
            cluster_id: snapshot.cluster_id.clone(),
            node_id: placement.node_id,
            state: SandboxState::Running,
            resources: snapshot.resources,
            started_at,
            end_at,
            metadata: snapshot.metadata.clone(),
            env_vars: HashMap::new(),
            auto_pause,
            resumed_from: Some(snapshot.template_id.clone()),
        };

        inner.registry.insert(sandbox.clone())?;
        reservation.commit();
        drop(permit);

        tracing::info!(
            sandbox_id,
            team_id = %team.id,
            cluster_id = %sandbox.cluster_id,
            node_id = %sandbox.node_id,
            build_id = %sandbox.build_id,
            "sandbox resumed"
        );

        Ok(sandbox)
    }
}
