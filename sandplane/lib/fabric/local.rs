use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use futures::FutureExt;

use super::{CreateRequest, NodeFabric, NodePlacement, RemovalOutcome, RemoveAction};
use crate::{models::Sandbox, SandplaneError, SandplaneResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The node every sandbox of the local fabric lands on.
pub const LOCAL_NODE_ID: &str = "local-node";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A single simulated node serving every cluster.
///
/// It keeps track of live sandboxes and captured build artifacts so the control plane can be run
/// and exercised end to end on one machine.
#[derive(Debug, Clone)]
pub struct LocalNodeFabric {
    inner: Arc<Mutex<LocalNode>>,
    capture_delay: Duration,
}

#[derive(Debug, Default)]
struct LocalNode {
    /// Live sandboxes keyed by id, with the cluster they were placed in.
    sandboxes: HashMap<String, String>,

    /// Captured builds as `(cluster_id, build_id)`.
    artifacts: HashSet<(String, String)>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LocalNodeFabric {
    /// Creates a local node whose pauses complete after `capture_delay`.
    pub fn new(capture_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LocalNode::default())),
            capture_delay,
        }
    }

    /// Whether the build's artifacts are stored on the node.
    pub fn has_artifacts(&self, cluster_id: &str, build_id: &str) -> bool {
        self.node()
            .artifacts
            .contains(&(cluster_id.to_string(), build_id.to_string()))
    }

    /// Number of sandboxes live on the node.
    pub fn live_count(&self) -> usize {
        self.node().sandboxes.len()
    }

    fn node(&self) -> std::sync::MutexGuard<'_, LocalNode> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for LocalNodeFabric {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[async_trait]
impl NodeFabric for LocalNodeFabric {
    async fn create_on_node(&self, request: &CreateRequest) -> SandplaneResult<NodePlacement> {
        let mut node = self.node();
        if node.sandboxes.contains_key(&request.sandbox_id) {
            return Err(SandplaneError::Internal(format!(
                "sandbox {} already runs on {LOCAL_NODE_ID}",
                request.sandbox_id
            )));
        }

        node.sandboxes
            .insert(request.sandbox_id.clone(), request.cluster_id.clone());
        tracing::debug!(
            sandbox_id = %request.sandbox_id,
            cluster_id = %request.cluster_id,
            node_id = LOCAL_NODE_ID,
            "sandbox started on local node"
        );

        Ok(NodePlacement::new(LOCAL_NODE_ID))
    }

    async fn remove_from_node(
        &self,
        sandbox: &Sandbox,
        action: RemoveAction,
    ) -> SandplaneResult<RemovalOutcome> {
        if self.node().sandboxes.remove(sandbox.get_sandbox_id()).is_none() {
            return Err(SandplaneError::Internal(format!(
                "sandbox {} is not running on {LOCAL_NODE_ID}",
                sandbox.get_sandbox_id()
            )));
        }

        match action {
            RemoveAction::Kill => Ok(RemovalOutcome::Removed),
            RemoveAction::Pause { build_id } => {
                let inner = self.inner.clone();
                let delay = self.capture_delay;
                let cluster_id = sandbox.get_cluster_id().clone();

                let capture = async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    inner
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .artifacts
                        .insert((cluster_id, build_id));
                    Ok(())
                };

                Ok(RemovalOutcome::Capturing(capture.boxed()))
            }
        }
    }

    async fn update_on_node(&self, sandbox: &Sandbox) -> SandplaneResult<()> {
        if !self.node().sandboxes.contains_key(sandbox.get_sandbox_id()) {
            return Err(SandplaneError::Internal(format!(
                "sandbox {} is not running on {LOCAL_NODE_ID}",
                sandbox.get_sandbox_id()
            )));
        }

        Ok(())
    }

    async fn delete_build_artifacts(
        &self,
        cluster_id: &str,
        build_id: &str,
    ) -> SandplaneResult<()> {
        self.node()
            .artifacts
            .remove(&(cluster_id.to_string(), build_id.to_string()));
        Ok(())
    }

    async fn reported_sandboxes(
        &self,
        cluster_id: &str,
    ) -> SandplaneResult<Option<HashSet<String>>> {
        let live = self
            .node()
            .sandboxes
            .iter()
            .filter(|(_, cluster)| cluster.as_str() == cluster_id)
            .map(|(id, _)| id.clone())
            .collect();

        Ok(Some(live))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
