use std::sync::Arc;

use sqlx::{Pool, Sqlite};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    admission::AdmissionController,
    config::PlaneConfig,
    deletion::SnapshotDeleter,
    fabric::{LocalNodeFabric, NodeFabric},
    listing::{ListPage, ListQuery, ListingEngine},
    models::{ListedSandbox, Team},
    registry::SandboxRegistry,
    store::{self, SANDPLANE_DB_MIGRATOR},
    templates::{CachedTemplateResolver, TemplateResolver},
    SandplaneError, SandplaneResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The control plane's entry point for every sandbox operation.
///
/// Cloning is cheap; every clone drives the same registry, gates and stores.
#[derive(Clone)]
pub struct SandboxService {
    pub(super) inner: Arc<ServiceInner>,
}

pub(super) struct ServiceInner {
    pub(super) config: PlaneConfig,
    pub(super) pool: Pool<Sqlite>,
    pub(super) registry: Arc<SandboxRegistry>,
    pub(super) admission: AdmissionController,
    pub(super) fabric: Arc<dyn NodeFabric>,
    pub(super) templates: Arc<dyn TemplateResolver>,
    pub(super) listing: ListingEngine,
    pub(super) deleter: SnapshotDeleter,
    pub(super) tracker: TaskTracker,
    pub(super) shutdown: CancellationToken,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SandboxService {
    /// Creates a service over the given database and collaborators.
    pub fn new(
        config: PlaneConfig,
        pool: Pool<Sqlite>,
        fabric: Arc<dyn NodeFabric>,
        templates: Arc<dyn TemplateResolver>,
    ) -> Self {
        let registry = Arc::new(SandboxRegistry::new());
        let tracker = TaskTracker::new();
        let admission = AdmissionController::new(
            config.max_starting_sandboxes,
            config.creation_slot_timeout(),
        );
        let listing = ListingEngine::new(
            registry.clone(),
            pool.clone(),
            config.list_default_limit,
            config.list_max_limit,
        );
        let deleter = SnapshotDeleter::new(
            pool.clone(),
            fabric.clone(),
            templates.clone(),
            tracker.clone(),
        );

        Self {
            inner: Arc::new(ServiceInner {
                config,
                pool,
                registry,
                admission,
                fabric,
                templates,
                listing,
                deleter,
                tracker,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Opens the configured database, seeds it, and starts a service on the local node fabric.
    pub async fn open(config: PlaneConfig) -> SandplaneResult<Self> {
        let pool = store::init_db(config.database_path(), &SANDPLANE_DB_MIGRATOR).await?;
        store::seed(&pool, &config).await?;

        let templates = Arc::new(CachedTemplateResolver::new(
            pool.clone(),
            config.template_cache_ttl(),
        ));

        Ok(Self::new(
            config,
            pool,
            Arc::new(LocalNodeFabric::default()),
            templates,
        ))
    }

    /// The service configuration.
    pub fn get_config(&self) -> &PlaneConfig {
        &self.inner.config
    }

    /// The registry of live sandboxes.
    pub fn get_registry(&self) -> &Arc<SandboxRegistry> {
        &self.inner.registry
    }

    /// The admission gates.
    pub fn get_admission(&self) -> &AdmissionController {
        &self.inner.admission
    }

    /// The database pool.
    pub fn get_pool(&self) -> &Pool<Sqlite> {
        &self.inner.pool
    }

    /// Loads the calling team. An unknown team is `Unauthorized`.
    pub async fn load_team(&self, team_id: &str) -> SandplaneResult<Team> {
        store::get_team(&self.inner.pool, team_id)
            .await?
            .ok_or_else(|| SandplaneError::Unauthorized(format!("unknown team '{team_id}'")))
    }

    /// The cluster a team's sandboxes run in: the team's override, else the default.
    pub fn resolve_cluster(&self, team: &Team) -> String {
        team.cluster_id
            .clone()
            .unwrap_or_else(|| self.inner.config.default_cluster_id.clone())
    }

    /// Looks up one of the team's sandboxes, live or paused.
    pub async fn get(&self, team_id: &str, sandbox_id: &str) -> SandplaneResult<ListedSandbox> {
        if let Some(sandbox) = self.inner.registry.get(sandbox_id).await {
            check_owner(sandbox.get_team_id(), team_id, sandbox_id)?;
            return Ok(ListedSandbox::from(&sandbox));
        }

        store::get_snapshot(&self.inner.pool, sandbox_id, team_id)
            .await?
            .map(|snapshot| ListedSandbox::from(&snapshot))
            .ok_or_else(|| SandplaneError::NotFound(format!("sandbox {sandbox_id} not found")))
    }

    /// Lists the team's running and paused sandboxes.
    pub async fn list(&self, team_id: &str, query: &ListQuery) -> SandplaneResult<ListPage> {
        self.inner.listing.list(team_id, query).await
    }

    /// Deletes the team's paused snapshot of a sandbox. Returns whether one existed.
    pub async fn delete_snapshot(&self, team_id: &str, sandbox_id: &str) -> SandplaneResult<bool> {
        self.inner.deleter.delete_snapshot(sandbox_id, team_id).await
    }

    /// Stops the reaper and waits for pauses and artifact cleanups in flight.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        tracing::info!("sandbox service stopped");
    }

    /// A token cancelled when the service shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

pub(super) fn check_owner(owner: &str, team_id: &str, sandbox_id: &str) -> SandplaneResult<()> {
    if owner != team_id {
        tracing::warn!(sandbox_id, team_id, "sandbox belongs to another team");
        return Err(SandplaneError::Forbidden(format!(
            "sandbox {sandbox_id} does not belong to team '{team_id}'"
        )));
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl std::fmt::Debug for SandboxService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxService")
            .field("registry", &self.inner.registry)
            .field("admission", &self.inner.admission)
            .finish_non_exhaustive()
    }
}
