use std::{collections::HashMap, time::Duration};

use super::{service::check_owner, SandboxService};
use crate::{
    models::{SandboxState, Team},
    store, utils, SandplaneError, SandplaneResult,
};

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SandboxService {
    /// Moves a running sandbox's deadline to `now + duration`.
    ///
    /// `duration` is raised to the configured minimum and the deadline never passes the team's
    /// maximum sandbox length. Without `allow_shorter` a deadline already further out is kept.
    pub async fn keep_alive_for(
        &self,
        team: &Team,
        sandbox_id: &str,
        duration: Duration,
        allow_shorter: bool,
    ) -> SandplaneResult<()> {
        let inner = &self.inner;
        let not_running = || SandplaneError::NotFound(format!("sandbox {sandbox_id} is not running"));

        let mut sandbox = inner.registry.lock(sandbox_id).await.ok_or_else(not_running)?;
        check_owner(&sandbox.team_id, &team.id, sandbox_id)?;
        if sandbox.state != SandboxState::Running {
            return Err(not_running());
        }

        let duration = duration.max(inner.config.min_keep_alive());
        let end_at = utils::saturating_add(utils::now_micros(), utils::to_time_delta(duration))
            .min(utils::saturating_add(sandbox.started_at, team.max_length()));

        if !allow_shorter && end_at <= sandbox.end_at {
            return Ok(());
        }

        let previous = std::mem::replace(&mut sandbox.end_at, end_at);
        if let Err(e) = inner.fabric.update_on_node(&sandbox).await {
            sandbox.end_at = previous;
            tracing::error!(sandbox_id, error = %e, "failed to update sandbox deadline on node");
            return Err(SandplaneError::Internal(format!(
                "failed to update sandbox {sandbox_id}: {e}"
            )));
        }

        tracing::debug!(sandbox_id, end_at = %end_at, "sandbox deadline moved");
        Ok(())
    }

    /// Replaces the labels of a running or paused sandbox. A sandbox being paused or killed is a
    /// `Conflict`.
    pub async fn update_metadata(
        &self,
        team_id: &str,
        sandbox_id: &str,
        metadata: HashMap<String, String>,
    ) -> SandplaneResult<()> {
        let inner = &self.inner;

        if let Some(mut sandbox) = inner.registry.lock(sandbox_id).await {
            check_owner(&sandbox.team_id, team_id, sandbox_id)?;

            if sandbox.state != SandboxState::Running {
                return Err(SandplaneError::Conflict(format!(
                    "sandbox {sandbox_id} is {}",
                    sandbox.state
                )));
            }

            let previous = std::mem::replace(&mut sandbox.metadata, metadata);
            if let Err(e) = inner.fabric.update_on_node(&sandbox).await {
                sandbox.metadata = previous;
                tracing::error!(sandbox_id, error = %e, "failed to update sandbox metadata on node");
                return Err(SandplaneError::Internal(format!(
                    "failed to update sandbox {sandbox_id}: {e}"
                )));
            }

            return Ok(());
        }

        let updated =
            store::update_snapshot_metadata(&inner.pool, sandbox_id, team_id, &metadata).await?;
        if updated == 0 {
            return Err(SandplaneError::NotFound(format!(
                "sandbox {sandbox_id} not found"
            )));
        }

        Ok(())
    }
}
