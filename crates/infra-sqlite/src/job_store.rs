// SQLite JobStore Implementation

use async_trait::async_trait;
use jobctl_core::domain::{Job, JobAction, JobId, JobState, TransitionRecord};
use jobctl_core::error::{AppError, Result};
use jobctl_core::port::job_store::check_candidate;
use jobctl_core::port::{JobStore, SwapOutcome};
use sqlx::SqlitePool;
use tracing::debug;

// Helper to convert sqlx::Error to AppError with structured information
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            // Extract database-specific error code and message
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => AppError::Store(format!(
                        "Unique constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "787" | "3850" => AppError::Store(format!(
                        "Foreign key constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "5" | "517" => {
                        // SQLITE_BUSY / SQLITE_BUSY_SNAPSHOT
                        AppError::Store(format!("Database locked (SQLITE_BUSY): {}", db_err.message()))
                    }
                    "13" => AppError::Store(format!("Database full: {}", db_err.message())),
                    _ => AppError::Store(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Store(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Store("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => AppError::Store(format!("Column not found: {}", col)),
        // Connection, pool, protocol errors
        _ => AppError::Store(err.to_string()),
    }
}

pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// State and version currently stored for `id`
    async fn current(&self, id: &JobId) -> Result<Option<(String, i64)>> {
        sqlx::query_as::<_, (String, i64)>("SELECT state, version FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: &Job) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (id, label, state, version, last_action, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.label)
        .bind(job.state.as_str())
        .bind(job.version)
        .bind(job.last_action.map(|a| a.as_str()))
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                AppError::Conflict(format!("Job id {} already exists", job.id)),
            ),
            Err(e) => Err(map_sqlx_error(e)),
        }
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn compare_and_swap(
        &self,
        id: &JobId,
        expected_version: i64,
        candidate: &Job,
    ) -> Result<SwapOutcome> {
        let action = check_candidate(id, expected_version, candidate)?;
        let deleted = JobState::Deleted.as_str();

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // Writing first takes SQLite's write lock up front, so the guard below
        // and the UPDATE see the same row. The audit row doubles as the guard:
        // it is only inserted when the stored version matches and the row is not sealed.
        let guarded = sqlx::query(
            r#"
            INSERT INTO job_transitions (job_id, version, from_state, to_state, action, at)
            SELECT id, ?, state, ?, ?, ?
            FROM jobs
            WHERE id = ? AND version = ? AND state != ?
            "#,
        )
        .bind(candidate.version)
        .bind(candidate.state.as_str())
        .bind(action.as_str())
        .bind(candidate.updated_at)
        .bind(id)
        .bind(expected_version)
        .bind(deleted)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if guarded.rows_affected() == 0 {
            tx.rollback().await.map_err(map_sqlx_error)?;

            let outcome = match self.current(id).await? {
                None => SwapOutcome::NotFound,
                Some((state, _)) if state == deleted => SwapOutcome::Sealed,
                Some((_, current_version)) => SwapOutcome::VersionConflict { current_version },
            };
            debug!(job_id = %id, expected_version, ?outcome, "Compare-and-swap not applied");
            return Ok(outcome);
        }

        sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?, version = ?, last_action = ?, label = ?, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(candidate.state.as_str())
        .bind(candidate.version)
        .bind(action.as_str())
        .bind(&candidate.label)
        .bind(candidate.updated_at)
        .bind(id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(SwapOutcome::Committed)
    }

    async fn list(&self, state: Option<JobState>, limit: usize) -> Result<Vec<Job>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows: Vec<JobRow> = match state {
            Some(state) => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM jobs
                    WHERE state = ?
                    ORDER BY created_at ASC, id ASC
                    LIMIT ?
                    "#,
                )
                .bind(state.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as("SELECT * FROM jobs ORDER BY created_at ASC, id ASC LIMIT ?")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn history(&self, id: &JobId) -> Result<Vec<TransitionRecord>> {
        let rows: Vec<TransitionRow> = sqlx::query_as(
            r#"
            SELECT job_id, version, from_state, to_state, action, at
            FROM job_transitions
            WHERE job_id = ?
            ORDER BY version ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(TransitionRow::into_record).collect()
    }
}

fn parse_state(raw: &str) -> Result<JobState> {
    raw.parse()
        .map_err(|_| AppError::Store(format!("Corrupt row: unknown state {}", raw)))
}

fn parse_action(raw: &str) -> Result<JobAction> {
    raw.parse()
        .map_err(|_| AppError::Store(format!("Corrupt row: unknown action {}", raw)))
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    label: Option<String>,
    state: String,
    version: i64,
    last_action: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        Ok(Job {
            state: parse_state(&self.state)?,
            last_action: self.last_action.as_deref().map(parse_action).transpose()?,
            id: self.id,
            label: self.label,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransitionRow {
    job_id: String,
    version: i64,
    from_state: String,
    to_state: String,
    action: String,
    at: i64,
}

impl TransitionRow {
    fn into_record(self) -> Result<TransitionRecord> {
        Ok(TransitionRecord {
            from: parse_state(&self.from_state)?,
            to: parse_state(&self.to_state)?,
            action: parse_action(&self.action)?,
            job_id: self.job_id,
            version: self.version,
            at: self.at,
        })
    }
}
