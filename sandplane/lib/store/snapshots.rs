use std::collections::HashMap;

use getset::Getters;
use sqlx::{
    sqlite::{SqliteConnection, SqliteRow},
    Pool, QueryBuilder, Row, Sqlite,
};
use typed_builder::TypedBuilder;

use crate::{
    config::DEFAULT_BUILD_TAG,
    listing::Cursor,
    models::{PausedSnapshot, ResourceSpec, SnapshotLineage},
    utils, SandplaneResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A team-scoped page request against the paused snapshots.
#[derive(Debug, Clone, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct SnapshotQuery {
    /// The owning team.
    #[builder(setter(into))]
    team_id: String,

    /// Exact-match labels every returned snapshot carries.
    #[builder(default)]
    metadata: HashMap<String, String>,

    /// Only snapshots strictly after this position in listing order.
    #[builder(default)]
    after: Option<Cursor>,

    /// Sandboxes to leave out.
    #[builder(default)]
    exclude_ids: Vec<String>,

    /// Maximum number of rows.
    limit: u32,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Persists a paused snapshot together with the template and build rows backing it.
pub async fn insert_snapshot(pool: &Pool<Sqlite>, snapshot: &PausedSnapshot) -> SandplaneResult<()> {
    let created_at = snapshot.created_at.timestamp_micros();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO templates (id, team_id, public, created_at_us)
        VALUES (?, ?, 0, ?)
        "#,
    )
    .bind(&snapshot.template_id)
    .bind(&snapshot.team_id)
    .bind(created_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO builds (
            id, template_id, tag, vcpu, memory_mb, disk_mb, cluster_id, created_at_us
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&snapshot.build_id)
    .bind(&snapshot.template_id)
    .bind(DEFAULT_BUILD_TAG)
    .bind(i64::from(snapshot.resources.vcpu))
    .bind(i64::from(snapshot.resources.memory_mb))
    .bind(i64::from(snapshot.resources.disk_mb))
    .bind(&snapshot.cluster_id)
    .bind(created_at)
    .execute(&mut *tx)
    .await?;

    insert_snapshot_row(&mut *tx, snapshot).await?;

    tx.commit().await?;
    Ok(())
}

/// Removes the team's snapshot of a sandbox so it can be resumed, keeping the template and build
/// rows behind it.
///
/// Only one of several concurrent callers gets the snapshot back; the rest see `None`.
pub async fn take_snapshot(
    pool: &Pool<Sqlite>,
    sandbox_id: &str,
    team_id: &str,
) -> SandplaneResult<Option<PausedSnapshot>> {
    let mut tx = pool.begin().await?;

    let Some(row) = sqlx::query("SELECT * FROM snapshots WHERE sandbox_id = ? AND team_id = ?")
        .bind(sandbox_id)
        .bind(team_id)
        .fetch_optional(&mut *tx)
        .await?
    else {
        return Ok(None);
    };
    let snapshot = snapshot_from_row(&row)?;

    let deleted = sqlx::query("DELETE FROM snapshots WHERE sandbox_id = ? AND team_id = ?")
        .bind(sandbox_id)
        .bind(team_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Ok(None);
    }

    tx.commit().await?;
    Ok(Some(snapshot))
}

/// Puts back a snapshot taken with [`take_snapshot`].
pub async fn restore_snapshot(
    pool: &Pool<Sqlite>,
    snapshot: &PausedSnapshot,
) -> SandplaneResult<()> {
    let mut conn = pool.acquire().await?;
    insert_snapshot_row(&mut *conn, snapshot).await
}

/// Loads the team's snapshot of a sandbox.
pub async fn get_snapshot(
    pool: &Pool<Sqlite>,
    sandbox_id: &str,
    team_id: &str,
) -> SandplaneResult<Option<PausedSnapshot>> {
    let row = sqlx::query(
        r#"
        SELECT * FROM snapshots
        WHERE sandbox_id = ? AND team_id = ?
        "#,
    )
    .bind(sandbox_id)
    .bind(team_id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| snapshot_from_row(&row)).transpose()
}

/// Returns a page of the team's snapshots, newest sandbox first and by id within the same start
/// time.
pub async fn list_snapshots(
    pool: &Pool<Sqlite>,
    query: &SnapshotQuery,
) -> SandplaneResult<Vec<PausedSnapshot>> {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM snapshots WHERE team_id = ");
    builder.push_bind(query.team_id.clone());

    if let Some(cursor) = &query.after {
        let started_at = cursor.get_timestamp().timestamp_micros();
        builder
            .push(" AND (sandbox_started_at_us < ")
            .push_bind(started_at)
            .push(" OR (sandbox_started_at_us = ")
            .push_bind(started_at)
            .push(" AND sandbox_id > ")
            .push_bind(cursor.get_sandbox_id().clone())
            .push("))");
    }

    for (key, value) in &query.metadata {
        builder
            .push(" AND EXISTS (SELECT 1 FROM json_each(snapshots.metadata) WHERE json_each.key = ")
            .push_bind(key.clone())
            .push(" AND json_each.value = ")
            .push_bind(value.clone())
            .push(")");
    }

    if !query.exclude_ids.is_empty() {
        builder.push(" AND sandbox_id NOT IN (");
        let mut ids = builder.separated(", ");
        for id in &query.exclude_ids {
            ids.push_bind(id.clone());
        }
        ids.push_unseparated(")");
    }

    builder
        .push(" ORDER BY sandbox_started_at_us DESC, sandbox_id ASC LIMIT ")
        .push_bind(i64::from(query.limit));

    let rows = builder.build().fetch_all(pool).await?;
    rows.iter().map(snapshot_from_row).collect()
}

/// Replaces the labels of the team's snapshot. Returns the number of rows updated.
pub async fn update_snapshot_metadata(
    pool: &Pool<Sqlite>,
    sandbox_id: &str,
    team_id: &str,
    metadata: &HashMap<String, String>,
) -> SandplaneResult<u64> {
    let result = sqlx::query("UPDATE snapshots SET metadata = ? WHERE sandbox_id = ? AND team_id = ?")
        .bind(serde_json::to_string(metadata)?)
        .bind(sandbox_id)
        .bind(team_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Finds the template and builds backing the team's snapshot of a sandbox.
pub async fn get_snapshot_lineage(
    pool: &Pool<Sqlite>,
    sandbox_id: &str,
    team_id: &str,
) -> SandplaneResult<Option<SnapshotLineage>> {
    let template_id: Option<String> =
        sqlx::query_scalar("SELECT template_id FROM snapshots WHERE sandbox_id = ? AND team_id = ?")
            .bind(sandbox_id)
            .bind(team_id)
            .fetch_optional(pool)
            .await?;

    match template_id {
        Some(template_id) => get_template_lineage(pool, &template_id).await,
        None => Ok(None),
    }
}

/// Finds the builds under a snapshot template. `None` when the template has no builds left.
pub async fn get_template_lineage(
    pool: &Pool<Sqlite>,
    template_id: &str,
) -> SandplaneResult<Option<SnapshotLineage>> {
    let rows = sqlx::query("SELECT id, cluster_id FROM builds WHERE template_id = ? ORDER BY id")
        .bind(template_id)
        .fetch_all(pool)
        .await?;

    let Some(first) = rows.first() else {
        return Ok(None);
    };

    Ok(Some(SnapshotLineage {
        template_id: template_id.to_string(),
        cluster_id: first.try_get("cluster_id")?,
        build_ids: rows
            .iter()
            .map(|row| row.try_get::<String, _>("id"))
            .collect::<Result<Vec<_>, _>>()?,
    }))
}

async fn insert_snapshot_row(
    conn: &mut SqliteConnection,
    snapshot: &PausedSnapshot,
) -> SandplaneResult<()> {
    let metadata = serde_json::to_string(&snapshot.metadata)?;

    sqlx::query(
        r#"
        INSERT INTO snapshots (
            sandbox_id, team_id, template_id, base_template_id, build_id, cluster_id, alias,
            vcpu, memory_mb, disk_mb, metadata, sandbox_started_at_us, created_at_us
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&snapshot.sandbox_id)
    .bind(&snapshot.team_id)
    .bind(&snapshot.template_id)
    .bind(&snapshot.base_template_id)
    .bind(&snapshot.build_id)
    .bind(&snapshot.cluster_id)
    .bind(&snapshot.alias)
    .bind(i64::from(snapshot.resources.vcpu))
    .bind(i64::from(snapshot.resources.memory_mb))
    .bind(i64::from(snapshot.resources.disk_mb))
    .bind(metadata)
    .bind(snapshot.sandbox_started_at.timestamp_micros())
    .bind(snapshot.created_at.timestamp_micros())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn snapshot_from_row(row: &SqliteRow) -> SandplaneResult<PausedSnapshot> {
    let metadata: String = row.try_get("metadata")?;
    Ok(PausedSnapshot {
        sandbox_id: row.try_get("sandbox_id")?,
        team_id: row.try_get("team_id")?,
        template_id: row.try_get("template_id")?,
        base_template_id: row.try_get("base_template_id")?,
        build_id: row.try_get("build_id")?,
        cluster_id: row.try_get("cluster_id")?,
        alias: row.try_get("alias")?,
        resources: ResourceSpec {
            vcpu: row.try_get::<i64, _>("vcpu")? as u32,
            memory_mb: row.try_get::<i64, _>("memory_mb")? as u32,
            disk_mb: row.try_get::<i64, _>("disk_mb")? as u32,
        },
        metadata: serde_json::from_str(&metadata)?,
        sandbox_started_at: utils::from_micros(row.try_get("sandbox_started_at_us")?),
        created_at: utils::from_micros(row.try_get("created_at_us")?),
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
