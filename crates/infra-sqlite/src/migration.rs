// Migration Runner

use crate::job_store::map_sqlx_error;
use jobctl_core::error::Result;
use sqlx::SqlitePool;
use tracing::info;

const MIGRATIONS: &[(i64, &str, &str)] = &[
    (
        1,
        "Initial schema",
        include_str!("../migrations/001_initial_schema.sql"),
    ),
    (
        2,
        "Transition log",
        include_str!("../migrations/002_transition_log.sql"),
    ),
];

/// Run database migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY NOT NULL)")
        .execute(pool)
        .await
        .map_err(map_sqlx_error)?;

    let current_version: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
            .fetch_one(pool)
            .await
            .map_err(map_sqlx_error)?;

    info!("Current schema version: {}", current_version);

    // Apply migrations sequentially
    for (version, name, sql) in MIGRATIONS {
        if current_version < *version {
            info!("Applying migration {:03}: {}", version, name);
            apply_migration(pool, *version, sql).await?;
        }
    }

    info!("All migrations applied successfully");
    Ok(())
}

/// Apply a single migration SQL file and record its version
async fn apply_migration(pool: &SqlitePool, version: i64, sql: &str) -> Result<()> {
    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;

    // Split by semicolon and execute each statement
    for statement in sql.split(';') {
        // Remove comments and trim
        let clean_statement: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();

        if !clean_statement.is_empty() {
            sqlx::query(&clean_statement)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }
    }

    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

    tx.commit().await.map_err(map_sqlx_error)?;
    Ok(())
}
