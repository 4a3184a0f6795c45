#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::FutureExt;
use sandplane::{
    config::{BuildSeed, PlaneConfig, TemplateSeed},
    fabric::{CreateRequest, NodeFabric, NodePlacement, RemovalOutcome, RemoveAction},
    lifecycle::{CreateSandboxRequest, SandboxService},
    models::{Sandbox, Team},
    store::{self, SANDPLANE_DB_MIGRATOR},
    templates::CachedTemplateResolver,
    SandplaneError, SandplaneResult,
};
use tempfile::TempDir;
use tokio::sync::watch;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

pub const TEAM_A: &str = "team-a";

pub const TEAM_B: &str = "team-b";

pub const MOCK_NODE_ID: &str = "mock-node";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A node fabric whose failures and capture timing are controlled by the test.
pub struct MockFabric {
    live: Mutex<HashMap<String, String>>,
    deleted_builds: Mutex<Vec<(String, String)>>,
    gate: watch::Sender<bool>,
    create_delay: Mutex<Duration>,
    pub fail_create: AtomicBool,
    pub fail_kill: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_capture: AtomicBool,
}

/// A service over a temporary database, seeded with two teams and a handful of templates.
pub struct Harness {
    pub service: SandboxService,
    pub fabric: Arc<MockFabric>,
    pub team: Team,
    pub other_team: Team,
    _dir: TempDir,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MockFabric {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            live: Mutex::new(HashMap::new()),
            deleted_builds: Mutex::new(Vec::new()),
            gate,
            create_delay: Mutex::new(Duration::ZERO),
            fail_create: AtomicBool::new(false),
            fail_kill: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            fail_capture: AtomicBool::new(false),
        }
    }

    /// Holds every capture until [`MockFabric::open_gate`] is called.
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock().unwrap() = delay;
    }

    /// Makes the node forget a sandbox, as if it crashed.
    pub fn forget(&self, sandbox_id: &str) {
        self.live.lock().unwrap().remove(sandbox_id);
    }

    pub fn is_live(&self, sandbox_id: &str) -> bool {
        self.live.lock().unwrap().contains_key(sandbox_id)
    }

    pub fn deleted_builds(&self) -> Vec<(String, String)> {
        self.deleted_builds.lock().unwrap().clone()
    }
}

impl Harness {
    pub async fn start(limit: u32) -> anyhow::Result<Self> {
        Self::start_with(limit, |config| config).await
    }

    pub async fn start_with(
        limit: u32,
        tweak: impl FnOnce(PlaneConfig) -> PlaneConfig,
    ) -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let config = tweak(base_config(&dir, limit));

        let pool = store::init_db(config.database_path(), &SANDPLANE_DB_MIGRATOR).await?;
        store::seed(&pool, &config).await?;

        let team = store::get_team(&pool, TEAM_A).await?.expect("team-a is seeded");
        let other_team = store::get_team(&pool, TEAM_B).await?.expect("team-b is seeded");

        let fabric = Arc::new(MockFabric::new());
        let templates = Arc::new(CachedTemplateResolver::new(
            pool.clone(),
            config.template_cache_ttl(),
        ));
        let service = SandboxService::new(config, pool, fabric.clone(), templates);

        Ok(Self {
            service,
            fabric,
            team,
            other_team,
            _dir: dir,
        })
    }

    /// Creates a sandbox from the `base` template for team A.
    pub async fn create(&self) -> SandplaneResult<Sandbox> {
        self.service
            .create(&self.team, CreateSandboxRequest::builder().template("base").build())
            .await
    }

    pub async fn create_with(&self, request: CreateSandboxRequest) -> SandplaneResult<Sandbox> {
        self.service.create(&self.team, request).await
    }

    /// Creates sandboxes one after the other with distinct start times, oldest first.
    pub async fn create_many(&self, count: usize) -> anyhow::Result<Vec<Sandbox>> {
        let mut sandboxes = Vec::with_capacity(count);
        for _ in 0..count {
            sandboxes.push(self.create().await?);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        Ok(sandboxes)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

pub fn base_config(dir: &TempDir, limit: u32) -> PlaneConfig {
    let build = |id: &str| {
        BuildSeed::builder()
            .id(id)
            .vcpu(2)
            .memory_mb(512)
            .disk_mb(1024)
            .build()
    };

    PlaneConfig::builder()
        .database_path(dir.path().join("sandplane.db"))
        .teams(vec![
            Team::builder()
                .id(TEAM_A)
                .concurrent_instances(limit)
                .max_length_hours(1)
                .build(),
            Team::builder()
                .id(TEAM_B)
                .concurrent_instances(10)
                .max_length_hours(24)
                .build(),
        ])
        .templates(vec![
            TemplateSeed::builder()
                .id("base")
                .team_id(TEAM_A)
                .aliases(vec!["python".to_string()])
                .builds(vec![build("build-base")])
                .build(),
            TemplateSeed::builder()
                .id("shared")
                .team_id(TEAM_B)
                .public(true)
                .builds(vec![build("build-shared")])
                .build(),
            TemplateSeed::builder()
                .id("private")
                .team_id(TEAM_B)
                .builds(vec![build("build-private")])
                .build(),
            TemplateSeed::builder()
                .id("remote")
                .team_id(TEAM_A)
                .builds(vec![BuildSeed::builder()
                    .id("build-remote")
                    .vcpu(1)
                    .memory_mb(256)
                    .disk_mb(512)
                    .cluster_id("eu-1")
                    .build()])
                .build(),
        ])
        .build()
}

/// Polls `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl NodeFabric for MockFabric {
    async fn create_on_node(&self, request: &CreateRequest) -> SandplaneResult<NodePlacement> {
        let delay = *self.create_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.fail_create.load(Ordering::SeqCst) {
            return Err(SandplaneError::Internal("node refused the sandbox".into()));
        }

        self.live.lock().unwrap().insert(
            request.get_sandbox_id().clone(),
            request.get_cluster_id().clone(),
        );
        Ok(NodePlacement::new(MOCK_NODE_ID))
    }

    async fn remove_from_node(
        &self,
        sandbox: &Sandbox,
        action: RemoveAction,
    ) -> SandplaneResult<RemovalOutcome> {
        if matches!(action, RemoveAction::Kill) && self.fail_kill.load(Ordering::SeqCst) {
            return Err(SandplaneError::Internal("node unreachable".into()));
        }

        self.live.lock().unwrap().remove(sandbox.get_sandbox_id());

        match action {
            RemoveAction::Kill => Ok(RemovalOutcome::Removed),
            RemoveAction::Pause { .. } => {
                let mut gate = self.gate.subscribe();
                let fail = self.fail_capture.load(Ordering::SeqCst);
                let capture = async move {
                    let _ = gate.wait_for(|open| *open).await;
                    if fail {
                        return Err(SandplaneError::Internal("snapshot upload failed".into()));
                    }
                    Ok(())
                };
                Ok(RemovalOutcome::Capturing(capture.boxed()))
            }
        }
    }

    async fn update_on_node(&self, _sandbox: &Sandbox) -> SandplaneResult<()> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(SandplaneError::Internal("node unreachable".into()));
        }
        Ok(())
    }

    async fn delete_build_artifacts(&self, cluster_id: &str, build_id: &str) -> SandplaneResult<()> {
        self.deleted_builds
            .lock()
            .unwrap()
            .push((cluster_id.to_string(), build_id.to_string()));
        Ok(())
    }

    async fn reported_sandboxes(
        &self,
        cluster_id: &str,
    ) -> SandplaneResult<Option<HashSet<String>>> {
        let live = self
            .live
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, cluster)| cluster.as_str() == cluster_id)
            .map(|(id, _)| id.clone())
            .collect();
        Ok(Some(live))
    }
}
