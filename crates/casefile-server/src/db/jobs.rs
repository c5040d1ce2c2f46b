use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::ingest::framework::{
    Job, JobStatus, JobStore, PipelineError, PipelineResult, SourceRef, StageExecution,
};

const JOB_COLUMNS: &str = "job_id, source_location, content_hash, enqueued_at, current_stage, \
                           attempt_count, status, last_error, replay_of, version, updated_at";

#[derive(sqlx::FromRow)]
struct JobRow {
    job_id: Uuid,
    source_location: String,
    content_hash: String,
    enqueued_at: DateTime<Utc>,
    current_stage: String,
    attempt_count: i32,
    status: String,
    last_error: Option<String>,
    replay_of: Option<Uuid>,
    version: i64,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = PipelineError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            job_id: row.job_id,
            source_ref: SourceRef {
                location: row.source_location,
                content_hash: row.content_hash,
            },
            enqueued_at: row.enqueued_at,
            current_stage: row.current_stage.parse()?,
            attempt_count: row.attempt_count.max(0) as u32,
            status: row.status.parse()?,
            last_error: row.last_error,
            replay_of: row.replay_of,
            version: row.version,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    job_id: Uuid,
    stage_name: String,
    attempt_no: i32,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    outcome: String,
    output_ref: Option<String>,
    error_detail: Option<String>,
}

impl TryFrom<ExecutionRow> for StageExecution {
    type Error = PipelineError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        Ok(StageExecution {
            job_id: row.job_id,
            stage_name: row.stage_name.parse()?,
            attempt_no: row.attempt_no.max(0) as u32,
            started_at: row.started_at,
            ended_at: row.ended_at,
            outcome: row.outcome.parse()?,
            output_ref: row.output_ref,
            error_detail: row.error_detail,
        })
    }
}

/// Job records and execution history in Postgres
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_if_absent(&self, job: &Job) -> PipelineResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (job_id, source_location, content_hash, enqueued_at, current_stage,
                              attempt_count, status, last_error, replay_of, version, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (job_id) DO NOTHING
            "#,
        )
        .bind(job.job_id)
        .bind(&job.source_ref.location)
        .bind(&job.source_ref.content_hash)
        .bind(job.enqueued_at)
        .bind(job.current_stage.as_str())
        .bind(job.attempt_count as i32)
        .bind(job.status.as_str())
        .bind(&job.last_error)
        .bind(job.replay_of)
        .bind(job.version)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, job_id: Uuid) -> PipelineResult<Option<Job>> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = $1"))
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Job::try_from).transpose()
    }

    async fn commit(&self, job: &Job, execution: Option<&StageExecution>) -> PipelineResult<Job> {
        let mut tx = self.pool.begin().await?;

        let row: Option<JobRow> = sqlx::query_as(&format!(
            r#"
            UPDATE jobs
            SET current_stage = $3, attempt_count = $4, status = $5, last_error = $6,
                version = version + 1, updated_at = NOW()
            WHERE job_id = $1 AND version = $2
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job.job_id)
        .bind(job.version)
        .bind(job.current_stage.as_str())
        .bind(job.attempt_count as i32)
        .bind(job.status.as_str())
        .bind(&job.last_error)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT version FROM jobs WHERE job_id = $1")
                .bind(job.job_id)
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                Some(_) => PipelineError::VersionConflict {
                    job_id: job.job_id,
                    expected: job.version,
                },
                None => PipelineError::JobNotFound(job.job_id),
            });
        };

        if let Some(execution) = execution {
            sqlx::query(
                r#"
                INSERT INTO stage_executions (job_id, stage_name, attempt_no, started_at, ended_at,
                                              outcome, output_ref, error_detail)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(execution.job_id)
            .bind(execution.stage_name.as_str())
            .bind(execution.attempt_no as i32)
            .bind(execution.started_at)
            .bind(execution.ended_at)
            .bind(execution.outcome.as_str())
            .bind(&execution.output_ref)
            .bind(&execution.error_detail)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Job::try_from(row)
    }

    async fn executions(&self, job_id: Uuid) -> PipelineResult<Vec<StageExecution>> {
        let rows: Vec<ExecutionRow> = sqlx::query_as(
            r#"
            SELECT job_id, stage_name, attempt_no, started_at, ended_at, outcome, output_ref, error_detail
            FROM stage_executions
            WHERE job_id = $1
            ORDER BY id
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StageExecution::try_from).collect()
    }

    async fn list(&self, status: Option<JobStatus>, limit: usize) -> PipelineResult<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE ($1::text IS NULL OR status = $1::text)
            ORDER BY updated_at DESC, job_id
            LIMIT $2
            "#
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }
}
