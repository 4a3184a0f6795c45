use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite};

use crate::{
    config::TemplateSeed,
    models::{Build, ResourceSpec, Template},
    utils, SandplaneResult,
};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Loads a template by identifier.
pub async fn get_template(
    pool: &Pool<Sqlite>,
    template_id: &str,
) -> SandplaneResult<Option<Template>> {
    let row = sqlx::query("SELECT id, team_id, public FROM templates WHERE id = ?")
        .bind(template_id)
        .fetch_optional(pool)
        .await?;

    row.map(|row| {
        Ok(Template {
            id: row.try_get("id")?,
            team_id: row.try_get("team_id")?,
            public: row.try_get("public")?,
        })
    })
    .transpose()
}

/// Loads the build published under `tag` for a template.
pub async fn get_build(
    pool: &Pool<Sqlite>,
    template_id: &str,
    tag: &str,
) -> SandplaneResult<Option<Build>> {
    let row = sqlx::query(
        r#"
        SELECT id, template_id, tag, vcpu, memory_mb, disk_mb, cluster_id
        FROM builds
        WHERE template_id = ? AND tag = ?
        "#,
    )
    .bind(template_id)
    .bind(tag)
    .fetch_optional(pool)
    .await?;

    row.map(|row| build_from_row(&row)).transpose()
}

/// Looks up the template an alias points to.
pub async fn get_template_id_by_alias(
    pool: &Pool<Sqlite>,
    alias: &str,
) -> SandplaneResult<Option<String>> {
    let template_id = sqlx::query_scalar("SELECT template_id FROM template_aliases WHERE alias = ?")
        .bind(alias)
        .fetch_optional(pool)
        .await?;

    Ok(template_id)
}

/// Writes a configured template, its aliases and builds, replacing earlier versions.
pub async fn upsert_template_seed(
    pool: &Pool<Sqlite>,
    seed: &TemplateSeed,
    default_cluster_id: &str,
) -> SandplaneResult<()> {
    let now = utils::now_micros().timestamp_micros();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO templates (id, team_id, public, created_at_us)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (id) DO UPDATE SET team_id = excluded.team_id, public = excluded.public
        "#,
    )
    .bind(&seed.id)
    .bind(&seed.team_id)
    .bind(seed.public)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for alias in &seed.aliases {
        sqlx::query(
            r#"
            INSERT INTO template_aliases (alias, template_id)
            VALUES (?, ?)
            ON CONFLICT (alias) DO UPDATE SET template_id = excluded.template_id
            "#,
        )
        .bind(alias)
        .bind(&seed.id)
        .execute(&mut *tx)
        .await?;
    }

    for build in &seed.builds {
        let cluster_id = build.cluster_id.as_deref().unwrap_or(default_cluster_id);
        sqlx::query(
            r#"
            INSERT INTO builds (
                id, template_id, tag, vcpu, memory_mb, disk_mb, cluster_id, created_at_us
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                template_id = excluded.template_id,
                tag = excluded.tag,
                vcpu = excluded.vcpu,
                memory_mb = excluded.memory_mb,
                disk_mb = excluded.disk_mb,
                cluster_id = excluded.cluster_id
            "#,
        )
        .bind(&build.id)
        .bind(&seed.id)
        .bind(&build.tag)
        .bind(i64::from(build.vcpu))
        .bind(i64::from(build.memory_mb))
        .bind(i64::from(build.disk_mb))
        .bind(cluster_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    tracing::info!(template_id = %seed.id, builds = seed.builds.len(), "template seeded");
    Ok(())
}

/// Deletes a template. Its aliases, builds and snapshot row go with it. Returns whether a row was
/// deleted.
pub async fn delete_template(pool: &Pool<Sqlite>, template_id: &str) -> SandplaneResult<bool> {
    let result = sqlx::query("DELETE FROM templates WHERE id = ?")
        .bind(template_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

fn build_from_row(row: &SqliteRow) -> SandplaneResult<Build> {
    Ok(Build {
        id: row.try_get("id")?,
        template_id: row.try_get("template_id")?,
        tag: row.try_get("tag")?,
        resources: ResourceSpec {
            vcpu: row.try_get::<i64, _>("vcpu")? as u32,
            memory_mb: row.try_get::<i64, _>("memory_mb")? as u32,
            disk_mb: row.try_get::<i64, _>("disk_mb")? as u32,
        },
        cluster_id: row.try_get("cluster_id")?,
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
