use std::path::Path;

use sqlx::{migrate::Migrator, sqlite::SqlitePoolOptions, Pool, Sqlite};
use tokio::fs;

use crate::SandplaneResult;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Migrator for the control plane database
pub static SANDPLANE_DB_MIGRATOR: Migrator = sqlx::migrate!("lib/store/migrations");

const MAX_DB_CONNECTIONS: u32 = 5;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Initializes the SQLite database at `db_path`, creating it if needed, and applies migrations.
///
/// ## Arguments
///
/// * `db_path` - Path where the SQLite database file should live
/// * `migrator` - SQLx migrator containing the schema migrations to run
pub async fn init_db(
    db_path: impl AsRef<Path>,
    migrator: &Migrator,
) -> SandplaneResult<Pool<Sqlite>> {
    let db_path = db_path.as_ref();

    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let pool = get_db_pool(db_path).await?;
    migrator.run(&pool).await?;

    tracing::debug!(path = %db_path.display(), "database ready");
    Ok(pool)
}

/// Opens a connection pool on the SQLite database at `db_path`.
pub async fn get_db_pool(db_path: impl AsRef<Path>) -> SandplaneResult<Pool<Sqlite>> {
    let db_path = db_path.as_ref();
    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_DB_CONNECTIONS)
        .connect(&format!("sqlite://{}?mode=rwc", db_path.display()))
        .await?;

    Ok(pool)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use sqlx::Row;
    use tempfile::tempdir;

    use super::*;

    #[test_log::test(tokio::test)]
    async fn test_init_db_creates_tables() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("nested").join("sandplane.db");

        let pool = init_db(&db_path, &SANDPLANE_DB_MIGRATOR).await?;

        let tables = sqlx::query("SELECT name FROM sqlite_master WHERE type='table'")
            .fetch_all(&pool)
            .await?;
        let table_names: Vec<String> = tables
            .iter()
            .map(|row| row.get::<String, _>("name"))
            .collect();

        for table in ["teams", "templates", "template_aliases", "builds", "snapshots"] {
            assert!(
                table_names.contains(&table.to_string()),
                "{table} table not found"
            );
        }

        // Running the migrations again is a no-op.
        init_db(&db_path, &SANDPLANE_DB_MIGRATOR).await?;
        Ok(())
    }
}
