use std::{collections::HashMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::SandplaneError;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Prefix that sets sandbox identifiers apart from other entity identifiers.
pub const SANDBOX_ID_PREFIX: &str = "sbx_";

const SANDBOX_ID_RANDOM_LEN: usize = 20;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Where a sandbox is in its life.
///
/// `Pending` only exists inside the synchronous create call and is never stored in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxState {
    /// Running on a node.
    Running,

    /// A pause was requested and the node is capturing the snapshot.
    Pausing,

    /// Persisted as a paused snapshot.
    Paused,

    /// A kill was requested.
    Killing,

    /// Gone.
    Terminated,
}

/// The compute resources of a sandbox; immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TypedBuilder, CopyGetters)]
#[serde(rename_all = "camelCase")]
#[getset(get_copy = "pub with_prefix")]
pub struct ResourceSpec {
    /// Number of virtual CPUs.
    pub(crate) vcpu: u32,

    /// Memory in MiB.
    pub(crate) memory_mb: u32,

    /// Disk in MiB.
    pub(crate) disk_mb: u32,
}

/// A sandbox tracked by the registry while it lives on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TypedBuilder, Getters, CopyGetters)]
#[serde(rename_all = "camelCase")]
pub struct Sandbox {
    /// The sandbox identifier.
    #[builder(setter(into))]
    #[getset(get = "pub with_prefix")]
    pub(crate) sandbox_id: String,

    /// The owning team.
    #[builder(setter(into))]
    #[getset(get = "pub with_prefix")]
    pub(crate) team_id: String,

    /// The template the sandbox was created from.
    #[builder(setter(into))]
    #[getset(get = "pub with_prefix")]
    pub(crate) template_id: String,

    /// The build the sandbox was created from.
    #[builder(setter(into))]
    #[getset(get = "pub with_prefix")]
    pub(crate) build_id: String,

    /// The alias the template was resolved from, frozen at creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option, into))]
    #[getset(get = "pub with_prefix")]
    pub(crate) alias: Option<String>,

    /// The cluster the sandbox runs in.
    #[builder(setter(into))]
    #[getset(get = "pub with_prefix")]
    pub(crate) cluster_id: String,

    /// The node the sandbox runs on.
    #[builder(setter(into))]
    #[getset(get = "pub with_prefix")]
    pub(crate) node_id: String,

    /// The current state.
    #[builder(default = SandboxState::Running)]
    #[getset(get_copy = "pub with_prefix")]
    pub(crate) state: SandboxState,

    /// The compute resources.
    #[getset(get_copy = "pub with_prefix")]
    pub(crate) resources: ResourceSpec,

    /// When the sandbox started.
    #[getset(get_copy = "pub with_prefix")]
    pub(crate) started_at: DateTime<Utc>,

    /// The soft deadline; moved by keep-alive.
    #[getset(get_copy = "pub with_prefix")]
    pub(crate) end_at: DateTime<Utc>,

    /// Caller-defined labels.
    #[builder(default)]
    #[getset(get = "pub with_prefix")]
    pub(crate) metadata: HashMap<String, String>,

    /// Environment variables handed to the node at creation.
    #[serde(skip)]
    #[builder(default)]
    #[getset(get = "pub with_prefix")]
    pub(crate) env_vars: HashMap<String, String>,

    /// Whether the reaper pauses instead of kills the sandbox at its deadline.
    #[builder(default)]
    #[getset(get_copy = "pub with_prefix")]
    pub(crate) auto_pause: bool,

    /// The template of the snapshot the sandbox was resumed from. Its build backs the running
    /// sandbox and is deleted once the sandbox is killed or paused again.
    #[serde(skip)]
    #[builder(default, setter(strip_option, into))]
    #[getset(get = "pub with_prefix")]
    pub(crate) resumed_from: Option<String>,
}

/// A row of the merged listing, either a registry entry or a paused snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedSandbox {
    /// The sandbox identifier.
    pub sandbox_id: String,

    /// The template the sandbox was created from.
    pub template_id: String,

    /// The alias the template was resolved from.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub alias: Option<String>,

    /// Either `running` or `paused`.
    pub state: SandboxState,

    /// Number of virtual CPUs.
    pub cpu_count: u32,

    /// Memory in MiB.
    pub memory_mb: u32,

    /// Disk in MiB.
    pub disk_size_mb: u32,

    /// When the sandbox started; the primary listing sort key.
    pub started_at: DateTime<Utc>,

    /// The deadline of a running sandbox or the pause time of a paused one.
    pub end_at: DateTime<Utc>,

    /// Caller-defined labels.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Sandbox {
    /// Generates a fresh sandbox identifier.
    pub fn generate_id() -> String {
        let random = Uuid::new_v4().simple().to_string();
        format!(
            "{SANDBOX_ID_PREFIX}{}",
            &random[..SANDBOX_ID_RANDOM_LEN.min(random.len())]
        )
    }

    /// Whether the sandbox's deadline has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.end_at <= now
    }

    /// Whether every `key=value` pair of `filter` is present in the sandbox metadata.
    pub fn matches_metadata(&self, filter: &HashMap<String, String>) -> bool {
        metadata_matches(&self.metadata, filter)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Exact match of every filter pair; an empty filter matches everything.
pub fn metadata_matches(
    metadata: &HashMap<String, String>,
    filter: &HashMap<String, String>,
) -> bool {
    filter
        .iter()
        .all(|(key, value)| metadata.get(key).is_some_and(|v| v == value))
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl From<&Sandbox> for ListedSandbox {
    fn from(sandbox: &Sandbox) -> Self {
        Self {
            sandbox_id: sandbox.sandbox_id.clone(),
            template_id: sandbox.template_id.clone(),
            alias: sandbox.alias.clone(),
            state: sandbox.state,
            cpu_count: sandbox.resources.vcpu,
            memory_mb: sandbox.resources.memory_mb,
            disk_size_mb: sandbox.resources.disk_mb,
            started_at: sandbox.started_at,
            end_at: sandbox.end_at,
            metadata: sandbox.metadata.clone(),
        }
    }
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            SandboxState::Running => "running",
            SandboxState::Pausing => "pausing",
            SandboxState::Paused => "paused",
            SandboxState::Killing => "killing",
            SandboxState::Terminated => "terminated",
        };
        write!(f, "{state}")
    }
}

impl FromStr for SandboxState {
    type Err = SandplaneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "running" => Ok(SandboxState::Running),
            "pausing" => Ok(SandboxState::Pausing),
            "paused" => Ok(SandboxState::Paused),
            "killing" => Ok(SandboxState::Killing),
            "terminated" => Ok(SandboxState::Terminated),
            other => Err(SandplaneError::InvalidArgument(format!(
                "unknown sandbox state: {other}"
            ))),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
