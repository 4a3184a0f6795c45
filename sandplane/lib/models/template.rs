use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use super::ResourceSpec;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A reusable build definition sandboxes are instantiated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Template {
    /// The template identifier.
    #[builder(setter(into))]
    pub(crate) id: String,

    /// The owning team.
    #[builder(setter(into))]
    pub(crate) team_id: String,

    /// Whether every team may instantiate the template.
    #[serde(default)]
    #[builder(default)]
    pub(crate) public: bool,
}

/// A concrete build of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Build {
    /// The build identifier.
    #[builder(setter(into))]
    pub(crate) id: String,

    /// The template the build belongs to.
    #[builder(setter(into))]
    pub(crate) template_id: String,

    /// The tag the build is published under.
    #[builder(setter(into))]
    pub(crate) tag: String,

    /// Resources a sandbox of this build receives.
    pub(crate) resources: ResourceSpec,

    /// The cluster holding the build's artifacts.
    #[builder(setter(into))]
    pub(crate) cluster_id: String,
}
