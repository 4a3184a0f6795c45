//! The in-memory registry of live sandboxes.
//!
//! The registry tracks every sandbox that currently lives on a node. Each entry sits behind its
//! own lock, so mutating one sandbox never blocks another, and every read hands out a clone taken
//! under that lock: callers never observe a half-updated entry.

mod transition;

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    models::{Sandbox, SandboxState},
    SandplaneError, SandplaneResult,
};

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use transition::*;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The concurrency-safe store of live sandboxes.
#[derive(Debug, Default)]
pub struct SandboxRegistry {
    entries: RwLock<HashMap<String, Arc<RegistryEntry>>>,
}

/// The state machine action that takes a sandbox off its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalKind {
    /// Capture and persist, then remove.
    Pause,

    /// Remove and forget.
    Kill,
}

/// The result of asking the registry to begin a removal.
#[derive(Debug)]
pub enum RemovalStart {
    /// The caller owns the transition and must resolve it.
    Started {
        /// The sandbox as it was when the transition started.
        sandbox: Sandbox,

        /// The writer half, to be resolved when the node-side work finishes.
        transition: Transition,

        /// A waiter for the caller itself.
        waiter: TransitionWaiter,
    },

    /// A transition is already underway; the caller can only wait on it.
    InProgress {
        /// The state the sandbox is moving to.
        state: SandboxState,

        /// A waiter on the in-flight transition.
        waiter: TransitionWaiter,
    },
}

#[derive(Debug)]
struct RegistryEntry {
    sandbox: Arc<Mutex<Sandbox>>,
    transition: Mutex<Option<TransitionWaiter>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SandboxRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sandbox. Fails with `Conflict` if the identifier is already tracked.
    pub fn insert(&self, sandbox: Sandbox) -> SandplaneResult<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&sandbox.sandbox_id) {
            return Err(SandplaneError::Conflict(format!(
                "sandbox {} already exists",
                sandbox.sandbox_id
            )));
        }

        entries.insert(
            sandbox.sandbox_id.clone(),
            Arc::new(RegistryEntry {
                sandbox: Arc::new(Mutex::new(sandbox)),
                transition: Mutex::new(None),
            }),
        );

        Ok(())
    }

    /// Whether the identifier is tracked, in any state.
    pub fn contains(&self, sandbox_id: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(sandbox_id)
    }

    /// Returns a copy of the sandbox.
    pub async fn get(&self, sandbox_id: &str) -> Option<Sandbox> {
        let entry = self.entry(sandbox_id)?;
        let sandbox = entry.sandbox.lock().await;
        Some(sandbox.clone())
    }

    /// Takes the sandbox's exclusive lock, for read-modify-write sequences that span awaits.
    pub async fn lock(&self, sandbox_id: &str) -> Option<OwnedMutexGuard<Sandbox>> {
        let entry = self.entry(sandbox_id)?;
        Some(entry.sandbox.clone().lock_owned().await)
    }

    /// The sandbox's state and a waiter on its in-flight transition, if there is one.
    pub async fn transition_of(
        &self,
        sandbox_id: &str,
    ) -> Option<(SandboxState, Option<TransitionWaiter>)> {
        let entry = self.entry(sandbox_id)?;
        let sandbox = entry.sandbox.lock().await;
        let current = entry.transition.lock().await;
        Some((sandbox.state, current.clone()))
    }

    /// Drops the sandbox from the registry. Returns whether it was tracked.
    pub fn remove(&self, sandbox_id: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(sandbox_id)
            .is_some()
    }

    /// Copies of a team's sandboxes, optionally restricted to one state.
    pub async fn team_items(&self, team_id: &str, state: Option<SandboxState>) -> Vec<Sandbox> {
        self.collect(|sandbox| {
            sandbox.team_id == team_id && state.map_or(true, |state| sandbox.state == state)
        })
        .await
    }

    /// Copies of every sandbox, optionally restricted to one state.
    pub async fn items(&self, state: Option<SandboxState>) -> Vec<Sandbox> {
        self.collect(|sandbox| state.map_or(true, |state| sandbox.state == state))
            .await
    }

    /// Running sandboxes whose deadline has passed.
    pub async fn expired(&self, now: DateTime<Utc>) -> Vec<Sandbox> {
        self.collect(|sandbox| sandbox.state == SandboxState::Running && sandbox.is_expired(now))
            .await
    }

    /// Number of tracked sandboxes.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no sandbox is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves a sandbox out of RUNNING towards PAUSING or KILLING.
    ///
    /// Exactly one caller gets [`RemovalStart::Started`] per transition. Later callers asking for
    /// the same removal join the in-flight one. A kill may take over a pause whose capture failed;
    /// a pause is refused while a kill is underway.
    pub async fn start_removing(
        &self,
        sandbox_id: &str,
        kind: RemovalKind,
    ) -> SandplaneResult<RemovalStart> {
        let entry = self
            .entry(sandbox_id)
            .ok_or_else(|| SandplaneError::NotFound(format!("sandbox {sandbox_id} not found")))?;

        let mut sandbox = entry.sandbox.lock().await;
        let mut current = entry.transition.lock().await;

        let target = match kind {
            RemovalKind::Pause => SandboxState::Pausing,
            RemovalKind::Kill => SandboxState::Killing,
        };

        match (sandbox.state, kind) {
            (SandboxState::Running, _) => {}
            (SandboxState::Pausing, RemovalKind::Kill)
                if matches!(current.as_ref().and_then(TransitionWaiter::peek), Some(Err(_))) =>
            {
                tracing::warn!(sandbox_id, "killing sandbox whose pause failed");
            }
            (SandboxState::Killing, RemovalKind::Pause) => {
                return Err(SandplaneError::Conflict(format!(
                    "sandbox {sandbox_id} is being killed"
                )));
            }
            (state, _) => {
                let waiter = current.clone().ok_or_else(|| {
                    SandplaneError::Internal(format!(
                        "sandbox {sandbox_id} is {state} without a transition"
                    ))
                })?;
                return Ok(RemovalStart::InProgress { state, waiter });
            }
        }

        let (transition, waiter) = Transition::new();
        sandbox.state = target;
        *current = Some(waiter.clone());

        tracing::debug!(sandbox_id, state = %target, "state transition started");

        Ok(RemovalStart::Started {
            sandbox: sandbox.clone(),
            transition,
            waiter,
        })
    }

    fn entry(&self, sandbox_id: &str) -> Option<Arc<RegistryEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(sandbox_id)
            .cloned()
    }

    async fn collect(&self, keep: impl Fn(&Sandbox) -> bool) -> Vec<Sandbox> {
        let entries: Vec<Arc<RegistryEntry>> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            let sandbox = entry.sandbox.lock().await;
            if keep(&sandbox) {
                items.push(sandbox.clone());
            }
        }

        items
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::{models::ResourceSpec, utils};

    fn sandbox(id: &str, team: &str) -> Sandbox {
        let now = utils::now_micros();
        Sandbox::builder()
            .sandbox_id(id)
            .team_id(team)
            .template_id("base")
            .build_id("build-1")
            .cluster_id("local")
            .node_id("node-1")
            .resources(ResourceSpec::builder().vcpu(2).memory_mb(512).disk_mb(1024).build())
            .started_at(now)
            .end_at(now + TimeDelta::seconds(15))
            .build()
    }

    #[test_log::test(tokio::test)]
    async fn test_registry_insert_rejects_duplicates() -> anyhow::Result<()> {
        let registry = SandboxRegistry::new();
        registry.insert(sandbox("sbx_a", "team-a"))?;

        let err = registry.insert(sandbox("sbx_a", "team-a")).unwrap_err();
        assert!(matches!(err, SandplaneError::Conflict(_)));
        assert_eq!(registry.len(), 1);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_registry_team_items_are_scoped() -> anyhow::Result<()> {
        let registry = SandboxRegistry::new();
        registry.insert(sandbox("sbx_a", "team-a"))?;
        registry.insert(sandbox("sbx_b", "team-a"))?;
        registry.insert(sandbox("sbx_c", "team-b"))?;

        let items = registry.team_items("team-a", Some(SandboxState::Running)).await;
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|s| s.get_team_id() == "team-a"));
        assert!(registry.team_items("team-c", None).await.is_empty());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_registry_lock_guards_mutation() -> anyhow::Result<()> {
        let registry = SandboxRegistry::new();
        registry.insert(sandbox("sbx_a", "team-a"))?;

        {
            let mut guard = registry.lock("sbx_a").await.unwrap();
            guard.metadata.insert("env".into(), "prod".into());
        }

        let stored = registry.get("sbx_a").await.unwrap();
        assert_eq!(stored.get_metadata().get("env"), Some(&"prod".to_string()));
        assert!(registry.lock("sbx_missing").await.is_none());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_registry_second_pause_joins_first() -> anyhow::Result<()> {
        let registry = SandboxRegistry::new();
        registry.insert(sandbox("sbx_a", "team-a"))?;

        let first = registry.start_removing("sbx_a", RemovalKind::Pause).await?;
        let RemovalStart::Started { transition, .. } = first else {
            panic!("first pause should own the transition");
        };
        assert_eq!(
            registry.get("sbx_a").await.unwrap().get_state(),
            SandboxState::Pausing
        );

        let second = registry.start_removing("sbx_a", RemovalKind::Pause).await?;
        let RemovalStart::InProgress { state, mut waiter } = second else {
            panic!("second pause should join");
        };
        assert_eq!(state, SandboxState::Pausing);

        transition.resolve(Ok(()));
        assert_eq!(waiter.wait().await, TransitionOutcome::Completed);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_registry_kill_takes_over_failed_pause() -> anyhow::Result<()> {
        let registry = SandboxRegistry::new();
        registry.insert(sandbox("sbx_a", "team-a"))?;

        let RemovalStart::Started { transition, .. } =
            registry.start_removing("sbx_a", RemovalKind::Pause).await?
        else {
            panic!("pause should start");
        };

        // Joining a kill while the capture is in flight only waits.
        assert!(matches!(
            registry.start_removing("sbx_a", RemovalKind::Kill).await?,
            RemovalStart::InProgress { .. }
        ));

        transition.resolve(Err("disk full".into()));

        assert!(matches!(
            registry.start_removing("sbx_a", RemovalKind::Kill).await?,
            RemovalStart::Started { .. }
        ));
        assert_eq!(
            registry.get("sbx_a").await.unwrap().get_state(),
            SandboxState::Killing
        );

        let err = registry
            .start_removing("sbx_a", RemovalKind::Pause)
            .await
            .unwrap_err();
        assert!(matches!(err, SandplaneError::Conflict(_)));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_registry_expired_only_running() -> anyhow::Result<()> {
        let registry = SandboxRegistry::new();
        registry.insert(sandbox("sbx_a", "team-a"))?;

        let later = utils::now_micros() + TimeDelta::minutes(1);
        assert_eq!(registry.expired(later).await.len(), 1);
        assert!(registry.expired(utils::now_micros()).await.is_empty());

        registry.start_removing("sbx_a", RemovalKind::Kill).await?;
        assert!(registry.expired(later).await.is_empty());
        Ok(())
    }
}
