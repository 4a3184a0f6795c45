use std::collections::HashMap;

use chrono::{DateTime, Utc};
use getset::{CopyGetters, Getters};
use serde::Serialize;
use typed_builder::TypedBuilder;

use super::{ListedSandbox, ResourceSpec, SandboxState};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The persisted record of a paused sandbox.
///
/// A snapshot keeps the identity of the sandbox it was taken from and is backed by its own
/// template and build rows, which the deletion protocol removes together with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TypedBuilder, Getters, CopyGetters)]
#[serde(rename_all = "camelCase")]
pub struct PausedSnapshot {
    /// The identity of the paused sandbox.
    #[builder(setter(into))]
    #[getset(get = "pub with_prefix")]
    pub(crate) sandbox_id: String,

    /// The owning team.
    #[builder(setter(into))]
    #[getset(get = "pub with_prefix")]
    pub(crate) team_id: String,

    /// The template row created for the snapshot.
    #[builder(setter(into))]
    #[getset(get = "pub with_prefix")]
    pub(crate) template_id: String,

    /// The template the sandbox was originally created from.
    #[builder(setter(into))]
    #[getset(get = "pub with_prefix")]
    pub(crate) base_template_id: String,

    /// The build holding the captured memory and disk.
    #[builder(setter(into))]
    #[getset(get = "pub with_prefix")]
    pub(crate) build_id: String,

    /// The cluster holding the build artifacts.
    #[builder(setter(into))]
    #[getset(get = "pub with_prefix")]
    pub(crate) cluster_id: String,

    /// The alias the sandbox was created under.
    #[builder(default)]
    #[getset(get = "pub with_prefix")]
    pub(crate) alias: Option<String>,

    /// Resources copied from the sandbox's build.
    #[getset(get_copy = "pub with_prefix")]
    pub(crate) resources: ResourceSpec,

    /// Caller-defined labels carried over from the sandbox.
    #[builder(default)]
    #[getset(get = "pub with_prefix")]
    pub(crate) metadata: HashMap<String, String>,

    /// When the original sandbox started.
    #[getset(get_copy = "pub with_prefix")]
    pub(crate) sandbox_started_at: DateTime<Utc>,

    /// When the pause completed.
    #[getset(get_copy = "pub with_prefix")]
    pub(crate) created_at: DateTime<Utc>,
}

/// The template and builds that back a snapshot, as needed to delete it.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct SnapshotLineage {
    /// The template row created for the snapshot.
    pub(crate) template_id: String,

    /// Every build under that template.
    pub(crate) build_ids: Vec<String>,

    /// The cluster holding the build artifacts.
    pub(crate) cluster_id: String,
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl From<&PausedSnapshot> for ListedSandbox {
    fn from(snapshot: &PausedSnapshot) -> Self {
        Self {
            sandbox_id: snapshot.sandbox_id.clone(),
            template_id: snapshot.base_template_id.clone(),
            alias: snapshot.alias.clone(),
            state: SandboxState::Paused,
            cpu_count: snapshot.resources.vcpu,
            memory_mb: snapshot.resources.memory_mb,
            disk_size_mb: snapshot.resources.disk_mb,
            started_at: snapshot.sandbox_started_at,
            end_at: snapshot.created_at,
            metadata: snapshot.metadata.clone(),
        }
    }
}
