//! Resolution of caller-supplied template references.

mod cache;

use async_trait::async_trait;
use getset::Getters;

use crate::{
    models::{Build, Template},
    SandplaneResult,
};

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use cache::*;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A template together with the build a sandbox will be created from.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ResolvedTemplate {
    pub(crate) template: Template,
    pub(crate) build: Build,
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Turns template names into templates and builds a team may use.
#[async_trait]
pub trait TemplateResolver: Send + Sync + 'static {
    /// Resolves an alias or template id to a template id.
    async fn resolve_alias(&self, name: &str, team_id: &str) -> SandplaneResult<String>;

    /// Loads the template's build published under `tag`, checking that `team_id` may use it and
    /// that it is available in `cluster_id`.
    async fn get(
        &self,
        template_id: &str,
        tag: &str,
        team_id: &str,
        cluster_id: &str,
    ) -> SandplaneResult<ResolvedTemplate>;

    /// Forgets everything cached about a template.
    fn invalidate(&self, template_id: &str);
}
