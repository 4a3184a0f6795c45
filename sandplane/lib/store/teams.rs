use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite};

use crate::{models::Team, SandplaneResult};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Loads a team by identifier.
pub async fn get_team(pool: &Pool<Sqlite>, team_id: &str) -> SandplaneResult<Option<Team>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, concurrent_instances, max_length_hours, max_vcpu, max_ram_mb, cluster_id
        FROM teams
        WHERE id = ?
        "#,
    )
    .bind(team_id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| team_from_row(&row)).transpose()
}

/// Inserts a team or replaces its limits.
pub async fn upsert_team(pool: &Pool<Sqlite>, team: &Team) -> SandplaneResult<()> {
    sqlx::query(
        r#"
        INSERT INTO teams (
            id, name, concurrent_instances, max_length_hours, max_vcpu, max_ram_mb, cluster_id
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (id) DO UPDATE SET
            name = excluded.name,
            concurrent_instances = excluded.concurrent_instances,
            max_length_hours = excluded.max_length_hours,
            max_vcpu = excluded.max_vcpu,
            max_ram_mb = excluded.max_ram_mb,
            cluster_id = excluded.cluster_id
        "#,
    )
    .bind(&team.id)
    .bind(&team.name)
    .bind(i64::from(team.concurrent_instances))
    .bind(i64::from(team.max_length_hours))
    .bind(i64::from(team.max_vcpu))
    .bind(i64::from(team.max_ram_mb))
    .bind(&team.cluster_id)
    .execute(pool)
    .await?;

    Ok(())
}

fn team_from_row(row: &SqliteRow) -> SandplaneResult<Team> {
    Ok(Team {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        concurrent_instances: row.try_get::<i64, _>("concurrent_instances")? as u32,
        max_length_hours: row.try_get::<i64, _>("max_length_hours")? as u32,
        max_vcpu: row.try_get::<i64, _>("max_vcpu")? as u32,
        max_ram_mb: row.try_get::<i64, _>("max_ram_mb")? as u32,
        cluster_id: row.try_get("cluster_id")?,
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
