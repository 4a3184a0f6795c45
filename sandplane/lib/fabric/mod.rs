//! The seam between the control plane and the compute nodes.
//!
//! The control plane never runs a sandbox itself. It asks a [`NodeFabric`] to place, remove and
//! update sandboxes, and to garbage-collect the build artifacts paused sandboxes leave behind.

mod local;

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use getset::Getters;
use typed_builder::TypedBuilder;

use crate::{
    models::{ResourceSpec, Sandbox},
    SandplaneResult,
};

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use local::*;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Everything a node needs to start a sandbox.
#[derive(Debug, Clone, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct CreateRequest {
    /// The identifier the sandbox will carry.
    #[builder(setter(into))]
    pub(crate) sandbox_id: String,

    /// The owning team.
    #[builder(setter(into))]
    pub(crate) team_id: String,

    /// The template being instantiated.
    #[builder(setter(into))]
    pub(crate) template_id: String,

    /// The build being instantiated.
    #[builder(setter(into))]
    pub(crate) build_id: String,

    /// The cluster to place the sandbox in.
    #[builder(setter(into))]
    pub(crate) cluster_id: String,

    /// The compute resources.
    pub(crate) resources: ResourceSpec,

    /// When the sandbox starts.
    pub(crate) started_at: DateTime<Utc>,

    /// The initial deadline.
    pub(crate) end_at: DateTime<Utc>,

    /// Caller-defined labels.
    #[builder(default)]
    pub(crate) metadata: HashMap<String, String>,

    /// Environment variables for the guest.
    #[builder(default)]
    pub(crate) env_vars: HashMap<String, String>,
}

/// Where the fabric placed a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct NodePlacement {
    pub(crate) node_id: String,
}

/// What a node should do with a sandbox it is asked to remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveAction {
    /// Capture memory and disk into the given build, then stop.
    Pause {
        /// The build that receives the snapshot artifacts.
        build_id: String,
    },

    /// Stop and discard.
    Kill,
}

/// The immediate answer of a removal.
pub enum RemovalOutcome {
    /// The sandbox is gone from its node.
    Removed,

    /// The sandbox left the node's live set and its snapshot is still being captured. The future
    /// resolves when the capture finishes and keeps running if nobody awaits it.
    Capturing(BoxFuture<'static, SandplaneResult<()>>),
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// The compute nodes, as seen by the control plane.
#[async_trait]
pub trait NodeFabric: Send + Sync + 'static {
    /// Starts a sandbox on a node of the request's cluster.
    async fn create_on_node(&self, request: &CreateRequest) -> SandplaneResult<NodePlacement>;

    /// Takes a sandbox off its node.
    ///
    /// A pause may return [`RemovalOutcome::Capturing`]; a kill always returns
    /// [`RemovalOutcome::Removed`] on success.
    async fn remove_from_node(
        &self,
        sandbox: &Sandbox,
        action: RemoveAction,
    ) -> SandplaneResult<RemovalOutcome>;

    /// Pushes the sandbox's current deadline and metadata to its node.
    async fn update_on_node(&self, sandbox: &Sandbox) -> SandplaneResult<()>;

    /// Deletes the stored artifacts of a build. Deleting artifacts that are already gone succeeds.
    async fn delete_build_artifacts(&self, cluster_id: &str, build_id: &str)
        -> SandplaneResult<()>;

    /// The sandboxes the cluster's nodes report as live, or `None` if the cluster does not report
    /// its state.
    async fn reported_sandboxes(&self, cluster_id: &str)
        -> SandplaneResult<Option<HashSet<String>>>;
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl NodePlacement {
    /// Creates a placement on the given node.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Debug for RemovalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemovalOutcome::Removed => write!(f, "Removed"),
            RemovalOutcome::Capturing(_) => write!(f, "Capturing(..)"),
        }
    }
}
