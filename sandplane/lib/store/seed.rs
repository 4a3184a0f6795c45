use sqlx::{Pool, Sqlite};

use super::{upsert_team, upsert_template_seed};
use crate::{config::PlaneConfig, SandplaneResult};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Writes the teams and templates declared in the configuration.
pub async fn seed(pool: &Pool<Sqlite>, config: &PlaneConfig) -> SandplaneResult<()> {
    for team in config.get_teams() {
        upsert_team(pool, team).await?;
    }

    for template in config.get_templates() {
        upsert_template_seed(pool, template, config.get_default_cluster_id()).await?;
    }

    tracing::info!(
        teams = config.get_teams().len(),
        templates = config.get_templates().len(),
        "database seeded from config"
    );
    Ok(())
}
