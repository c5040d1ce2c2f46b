//! Postgres-backed job queue
//!
//! One row per job. A message is deliverable when its `visible_at` has passed
//! and it holds no live lease; receivers pick it with `FOR UPDATE SKIP LOCKED`
//! so concurrent workers never block on each other. Lease checks use the
//! caller's clock, the same way the in-memory queue does.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::offset;
use crate::ingest::framework::{
    Lease, LeasedJob, PipelineError, PipelineResult, QueueBackend, QueueDepth, QueueMessage,
    SourceRef,
};

#[derive(sqlx::FromRow)]
struct LeasedRow {
    job_id: Uuid,
    source_location: String,
    content_hash: String,
    enqueued_at: DateTime<Utc>,
    delivery_count: i32,
    lease_token: Uuid,
    lease_expires_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct DepthRow {
    ready: i64,
    delayed: i64,
    leased: i64,
}

#[derive(Clone)]
pub struct PgQueueBackend {
    pool: PgPool,
}

impl PgQueueBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn lease_lost(job_id: Uuid) -> PipelineError {
    PipelineError::LeaseLost { job_id }
}

#[async_trait]
impl QueueBackend for PgQueueBackend {
    async fn publish(&self, message: QueueMessage) -> PipelineResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO job_queue (job_id, source_location, content_hash, enqueued_at, delivery_count, visible_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (job_id) DO NOTHING
            "#,
        )
        .bind(message.job_id)
        .bind(&message.source_ref.location)
        .bind(&message.source_ref.content_hash)
        .bind(message.enqueued_at)
        .bind(message.delivery_count as i32)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn receive(&self, lease_for: Duration) -> PipelineResult<Option<LeasedJob>> {
        let now = Utc::now();
        let row: Option<LeasedRow> = sqlx::query_as(
            r#"
            UPDATE job_queue
            SET delivery_count = delivery_count + 1,
                lease_token = $2,
                lease_expires_at = $3
            WHERE job_id = (
                SELECT job_id
                FROM job_queue
                WHERE visible_at <= $1
                  AND (lease_expires_at IS NULL OR lease_expires_at <= $1)
                ORDER BY visible_at, seq
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING job_id, source_location, content_hash, enqueued_at, delivery_count,
                      lease_token, lease_expires_at
            "#,
        )
        .bind(now)
        .bind(Uuid::new_v4())
        .bind(now + offset(lease_for))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            debug!(job_id = %row.job_id, delivery_count = row.delivery_count, "Message leased");
            LeasedJob {
                message: QueueMessage {
                    job_id: row.job_id,
                    source_ref: SourceRef {
                        location: row.source_location,
                        content_hash: row.content_hash,
                    },
                    enqueued_at: row.enqueued_at,
                    delivery_count: row.delivery_count.max(0) as u32,
                },
                lease: Lease {
                    job_id: row.job_id,
                    token: row.lease_token,
                    expires_at: row.lease_expires_at,
                },
            }
        }))
    }

    async fn extend(&self, lease: &Lease, lease_for: Duration) -> PipelineResult<Lease> {
        let now = Utc::now();
        let expires_at: Option<(DateTime<Utc>,)> = sqlx::query_as(
            r#"
            UPDATE job_queue
            SET lease_expires_at = $4
            WHERE job_id = $1 AND lease_token = $2 AND lease_expires_at > $3
            RETURNING lease_expires_at
            "#,
        )
        .bind(lease.job_id)
        .bind(lease.token)
        .bind(now)
        .bind(now + offset(lease_for))
        .fetch_optional(&self.pool)
        .await?;

        let (expires_at,) = expires_at.ok_or_else(|| lease_lost(lease.job_id))?;
        Ok(Lease {
            expires_at,
            ..lease.clone()
        })
    }

    async fn ack(&self, lease: &Lease) -> PipelineResult<()> {
        let result = sqlx::query(
            "DELETE FROM job_queue WHERE job_id = $1 AND lease_token = $2 AND lease_expires_at > $3",
        )
        .bind(lease.job_id)
        .bind(lease.token)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(lease_lost(lease.job_id));
        }
        Ok(())
    }

    async fn release(&self, lease: &Lease, delay: Duration, reset_deliveries: bool) -> PipelineResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE job_queue
            SET lease_token = NULL,
                lease_expires_at = NULL,
                visible_at = $4,
                delivery_count = CASE WHEN $5 THEN 0 ELSE delivery_count END
            WHERE job_id = $1 AND lease_token = $2 AND lease_expires_at > $3
            "#,
        )
        .bind(lease.job_id)
        .bind(lease.token)
        .bind(now)
        .bind(now + offset(delay))
        .bind(reset_deliveries)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(lease_lost(lease.job_id));
        }
        Ok(())
    }

    async fn remove(&self, job_id: Uuid) -> PipelineResult<()> {
        sqlx::query("DELETE FROM job_queue WHERE job_id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn depth(&self) -> PipelineResult<QueueDepth> {
        let row: DepthRow = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE lease_expires_at > $1) AS leased,
                COUNT(*) FILTER (WHERE (lease_expires_at IS NULL OR lease_expires_at <= $1)
                                   AND visible_at > $1) AS delayed,
                COUNT(*) FILTER (WHERE (lease_expires_at IS NULL OR lease_expires_at <= $1)
                                   AND visible_at <= $1) AS ready
            FROM job_queue
            "#,
        )
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueDepth {
            ready: row.ready.max(0) as u64,
            delayed: row.delayed.max(0) as u64,
            leased: row.leased.max(0) as u64,
        })
    }
}
