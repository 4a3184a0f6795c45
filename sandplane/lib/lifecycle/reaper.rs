use std::sync::Arc;

use tokio::{sync::Semaphore, task::JoinSet, time::MissedTickBehavior};

use super::SandboxService;
use crate::{models::Sandbox, utils};

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SandboxService {
    /// Starts the background task that ends sandboxes whose deadline passed and drops the ones
    /// their nodes lost.
    ///
    /// The task stops when the service shuts down.
    pub fn spawn_reaper(&self) {
        let service = self.clone();
        let shutdown = self.inner.shutdown.clone();
        let period = self.inner.config.reap_interval();

        self.inner.tracker.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            tracing::info!(interval_ms = period.as_millis() as u64, "reaper started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        service.reap_expired().await;
                        service.sync_clusters().await;
                    }
                }
            }
            tracing::info!("reaper stopped");
        });
    }

    /// Pauses or kills every running sandbox past its deadline, a bounded number at a time.
    /// Returns how many were ended.
    ///
    /// Pauses are only started here; their captures finish in the background.
    pub async fn reap_expired(&self) -> usize {
        let expired = self.inner.registry.expired(utils::now_micros()).await;
        if expired.is_empty() {
            return 0;
        }

        let limiter = Arc::new(Semaphore::new(
            self.inner.config.bulk_kill_concurrency.max(1),
        ));

        let mut tasks = JoinSet::new();
        for sandbox in expired {
            let service = self.clone();
            let limiter = limiter.clone();
            tasks.spawn(async move {
                let Ok(_permit) = limiter.acquire_owned().await else {
                    return false;
                };
                service.end_expired(&sandbox).await
            });
        }

        let mut ended = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => ended += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(error = %e, "reaper task failed"),
            }
        }

        ended
    }

    async fn end_expired(&self, sandbox: &Sandbox) -> bool {
        let sandbox_id = sandbox.get_sandbox_id();
        let team_id = sandbox.get_team_id();

        let result = if sandbox.get_auto_pause() {
            self.begin_pause(sandbox_id).await
        } else {
            self.kill(team_id, sandbox_id).await.map(|()| true)
        };

        match result {
            Ok(true) => {
                tracing::info!(
                    sandbox_id,
                    team_id,
                    auto_pause = sandbox.get_auto_pause(),
                    "expired sandbox ended"
                );
                true
            }
            Ok(false) => {
                tracing::debug!(sandbox_id, "expired sandbox already leaving its node");
                false
            }
            Err(e) => {
                tracing::error!(sandbox_id, team_id, error = %e, "failed to end expired sandbox");
                false
            }
        }
    }
}
