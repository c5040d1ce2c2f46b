use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::ingest::framework::{DeadLetterEntry, DeadLetterSink, PipelineError, PipelineResult};

#[derive(sqlx::FromRow)]
struct DeadLetterRow {
    job_id: Uuid,
    stage_name: String,
    total_attempts: i32,
    last_error: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<DeadLetterRow> for DeadLetterEntry {
    type Error = PipelineError;

    fn try_from(row: DeadLetterRow) -> Result<Self, Self::Error> {
        Ok(DeadLetterEntry {
            job_id: row.job_id,
            stage_name: row.stage_name.parse()?,
            total_attempts: row.total_attempts.max(0) as u32,
            last_error: row.last_error,
            created_at: row.created_at,
        })
    }
}

/// Append-only dead-letter table; rows are inserted once and never updated
#[derive(Clone)]
pub struct PgDeadLetterSink {
    pool: PgPool,
}

impl PgDeadLetterSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeadLetterSink for PgDeadLetterSink {
    async fn append(&self, entry: &DeadLetterEntry) -> PipelineResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO dead_letters (job_id, stage_name, total_attempts, last_error, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (job_id) DO NOTHING
            "#,
        )
        .bind(entry.job_id)
        .bind(entry.stage_name.as_str())
        .bind(entry.total_attempts as i32)
        .bind(&entry.last_error)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list(&self, limit: usize) -> PipelineResult<Vec<DeadLetterEntry>> {
        let rows: Vec<DeadLetterRow> = sqlx::query_as(
            r#"
            SELECT job_id, stage_name, total_attempts, last_error, created_at
            FROM dead_letters
            ORDER BY created_at DESC, job_id
            LIMIT $1
            "#,
        )
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DeadLetterEntry::try_from).collect()
    }

    async fn get(&self, job_id: Uuid) -> PipelineResult<Option<DeadLetterEntry>> {
        let row: Option<DeadLetterRow> = sqlx::query_as(
            "SELECT job_id, stage_name, total_attempts, last_error, created_at FROM dead_letters WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DeadLetterEntry::try_from).transpose()
    }
}
