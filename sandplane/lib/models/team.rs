use chrono::TimeDelta;
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const DEFAULT_TEAM_MAX_VCPU: u32 = 8;

const DEFAULT_TEAM_MAX_RAM_MB: u32 = 8192;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A tenant of the control plane together with the limits of its tier.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder, Getters, CopyGetters,
)]
pub struct Team {
    /// The team identifier.
    #[builder(setter(into))]
    #[getset(get = "pub with_prefix")]
    pub(crate) id: String,

    /// A display name.
    #[serde(default)]
    #[builder(default, setter(into))]
    #[getset(get = "pub with_prefix")]
    pub(crate) name: String,

    /// How many sandboxes may run at the same time.
    #[getset(get_copy = "pub with_prefix")]
    pub(crate) concurrent_instances: u32,

    /// The longest lifetime a sandbox of this team may have.
    #[getset(get_copy = "pub with_prefix")]
    pub(crate) max_length_hours: u32,

    /// The largest vCPU count a sandbox may request.
    #[serde(default = "Team::default_max_vcpu")]
    #[builder(default = Team::default_max_vcpu())]
    #[getset(get_copy = "pub with_prefix")]
    pub(crate) max_vcpu: u32,

    /// The largest memory size a sandbox may request.
    #[serde(default = "Team::default_max_ram_mb")]
    #[builder(default = Team::default_max_ram_mb())]
    #[getset(get_copy = "pub with_prefix")]
    pub(crate) max_ram_mb: u32,

    /// The cluster the team's sandboxes run in, when it differs from the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option, into))]
    #[getset(get = "pub with_prefix")]
    pub(crate) cluster_id: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Team {
    /// The longest lifetime as a time delta.
    pub fn max_length(&self) -> TimeDelta {
        TimeDelta::hours(i64::from(self.max_length_hours))
    }

    fn default_max_vcpu() -> u32 {
        DEFAULT_TEAM_MAX_VCPU
    }

    fn default_max_ram_mb() -> u32 {
        DEFAULT_TEAM_MAX_RAM_MB
    }
}
