//! Staging area and canonical email tables

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::ingest::framework::{CanonicalStore, PipelineResult, StagingScope};
use crate::ingest::records::{AttachmentRecord, CanonicalRecord, EmailRecord, IndexDocument, BODY_PREVIEW_CHARS};

/// Rows per multi-row INSERT, well under the bind parameter limit
const INSERT_CHUNK: usize = 1000;

const RECORD_COLUMNS: &str = "record_id, archive_hash, source_path, message_id, in_reply_to, \
                              references_header, subject, sender_email, sender_name, recipients_to, \
                              recipients_cc, recipients_bcc, sent_at_epoch, body_text, body_html, body_hash";

const ATTACHMENT_COLUMNS: &str = "attachment_id, record_id, archive_hash, part_index, filename, content_type, \
                                  size_bytes, content_hash, is_inline, content_id, blob_key";

#[derive(Clone)]
pub struct PgCanonicalStore {
    pool: PgPool,
}

impl PgCanonicalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Remove both staging tables' rows for `scope`
async fn delete_staging(tx: &mut Transaction<'_, Postgres>, scope: StagingScope) -> PipelineResult<u64> {
    let attachments = sqlx::query("DELETE FROM attachment_staging WHERE job_id = $1 AND attempt_no = $2")
        .bind(scope.job_id)
        .bind(scope.attempt_no as i32)
        .execute(&mut **tx)
        .await?;
    let rows = sqlx::query("DELETE FROM email_staging WHERE job_id = $1 AND attempt_no = $2")
        .bind(scope.job_id)
        .bind(scope.attempt_no as i32)
        .execute(&mut **tx)
        .await?;
    Ok(rows.rows_affected() + attachments.rows_affected())
}

#[async_trait]
impl CanonicalStore for PgCanonicalStore {
    async fn replace_staging(&self, scope: StagingScope, rows: &[EmailRecord]) -> PipelineResult<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM email_staging WHERE job_id = $1 AND attempt_no = $2")
            .bind(scope.job_id)
            .bind(scope.attempt_no as i32)
            .execute(&mut *tx)
            .await?;

        let mut staged = 0;
        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO email_staging (job_id, attempt_no, {RECORD_COLUMNS}) "
            ));
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(scope.job_id)
                    .push_bind(scope.attempt_no as i32)
                    .push_bind(row.record_id)
                    .push_bind(&row.archive_hash)
                    .push_bind(&row.source_path)
                    .push_bind(&row.message_id)
                    .push_bind(&row.in_reply_to)
                    .push_bind(&row.references_header)
                    .push_bind(&row.subject)
                    .push_bind(&row.sender_email)
                    .push_bind(&row.sender_name)
                    .push_bind(&row.recipients_to)
                    .push_bind(&row.recipients_cc)
                    .push_bind(&row.recipients_bcc)
                    .push_bind(row.sent_at_epoch)
                    .push_bind(&row.body_text)
                    .push_bind(&row.body_html)
                    .push_bind(&row.body_hash);
            });
            // duplicate ids inside one export collapse to one staged row
            builder.push(" ON CONFLICT (job_id, attempt_no, record_id) DO NOTHING");
            staged += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(staged)
    }

    async fn staging_count(&self, scope: StagingScope) -> PipelineResult<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM email_staging WHERE job_id = $1 AND attempt_no = $2")
                .bind(scope.job_id)
                .bind(scope.attempt_no as i32)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }

    async fn staged_rows(&self, scope: StagingScope) -> PipelineResult<Vec<EmailRecord>> {
        let rows = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM email_staging WHERE job_id = $1 AND attempt_no = $2 ORDER BY record_id"
        ))
        .bind(scope.job_id)
        .bind(scope.attempt_no as i32)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn merge_staging(&self, scope: StagingScope) -> PipelineResult<u64> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(&format!(
            r#"
            INSERT INTO email_records ({RECORD_COLUMNS}, body_preview)
            SELECT {RECORD_COLUMNS}, LEFT(body_text, $3)
            FROM email_staging
            WHERE job_id = $1 AND attempt_no = $2
            ON CONFLICT (record_id) DO UPDATE SET
                archive_hash = EXCLUDED.archive_hash,
                source_path = EXCLUDED.source_path,
                message_id = EXCLUDED.message_id,
                in_reply_to = EXCLUDED.in_reply_to,
                references_header = EXCLUDED.references_header,
                subject = EXCLUDED.subject,
                sender_email = EXCLUDED.sender_email,
                sender_name = EXCLUDED.sender_name,
                recipients_to = EXCLUDED.recipients_to,
                recipients_cc = EXCLUDED.recipients_cc,
                recipients_bcc = EXCLUDED.recipients_bcc,
                sent_at_epoch = EXCLUDED.sent_at_epoch,
                body_text = EXCLUDED.body_text,
                body_html = EXCLUDED.body_html,
                body_hash = EXCLUDED.body_hash,
                body_preview = EXCLUDED.body_preview,
                updated_at = NOW()
            "#
        ))
        .bind(scope.job_id)
        .bind(scope.attempt_no as i32)
        .bind(BODY_PREVIEW_CHARS as i32)
        .execute(&mut *tx)
        .await?;

        sqlx::query(&format!(
            r#"
            INSERT INTO email_attachments ({ATTACHMENT_COLUMNS})
            SELECT {ATTACHMENT_COLUMNS}
            FROM attachment_staging
            WHERE job_id = $1 AND attempt_no = $2
            ON CONFLICT (attachment_id) DO UPDATE SET
                record_id = EXCLUDED.record_id,
                archive_hash = EXCLUDED.archive_hash,
                part_index = EXCLUDED.part_index,
                filename = EXCLUDED.filename,
                content_type = EXCLUDED.content_type,
                size_bytes = EXCLUDED.size_bytes,
                content_hash = EXCLUDED.content_hash,
                is_inline = EXCLUDED.is_inline,
                content_id = EXCLUDED.content_id,
                blob_key = EXCLUDED.blob_key
            "#
        ))
        .bind(scope.job_id)
        .bind(scope.attempt_no as i32)
        .execute(&mut *tx)
        .await?;

        delete_staging(&mut tx, scope).await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn clear_staging(&self, scope: StagingScope) -> PipelineResult<u64> {
        let mut tx = self.pool.begin().await?;
        let removed = delete_staging(&mut tx, scope).await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn replace_attachment_staging(
        &self,
        scope: StagingScope,
        rows: &[AttachmentRecord],
    ) -> PipelineResult<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM attachment_staging WHERE job_id = $1 AND attempt_no = $2")
            .bind(scope.job_id)
            .bind(scope.attempt_no as i32)
            .execute(&mut *tx)
            .await?;

        let mut staged = 0;
        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO attachment_staging (job_id, attempt_no, {ATTACHMENT_COLUMNS}) "
            ));
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(scope.job_id)
                    .push_bind(scope.attempt_no as i32)
                    .push_bind(row.attachment_id)
                    .push_bind(row.record_id)
                    .push_bind(&row.archive_hash)
                    .push_bind(row.part_index)
                    .push_bind(&row.filename)
                    .push_bind(&row.content_type)
                    .push_bind(row.size_bytes)
                    .push_bind(&row.content_hash)
                    .push_bind(row.is_inline)
                    .push_bind(&row.content_id)
                    .push_bind(&row.blob_key);
            });
            builder.push(" ON CONFLICT (job_id, attempt_no, attachment_id) DO NOTHING");
            staged += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(staged)
    }

    async fn attachment_staging_count(&self, scope: StagingScope) -> PipelineResult<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM attachment_staging WHERE job_id = $1 AND attempt_no = $2")
                .bind(scope.job_id)
                .bind(scope.attempt_no as i32)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }

    async fn attachments_for_archive(&self, archive_hash: &str) -> PipelineResult<Vec<AttachmentRecord>> {
        let rows = sqlx::query_as(&format!(
            r#"
            SELECT {ATTACHMENT_COLUMNS}
            FROM email_attachments
            WHERE archive_hash = $1
            ORDER BY record_id, part_index
            "#
        ))
        .bind(archive_hash)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn records_for_archive(&self, archive_hash: &str) -> PipelineResult<Vec<CanonicalRecord>> {
        let rows = sqlx::query_as(&format!(
            r#"
            SELECT {RECORD_COLUMNS}, body_preview, thread_id, duplicate_of
            FROM email_records
            WHERE archive_hash = $1
            ORDER BY record_id
            "#
        ))
        .bind(archive_hash)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn record_count(&self, archive_hash: &str) -> PipelineResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM email_records WHERE archive_hash = $1")
            .bind(archive_hash)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn apply_threads(&self, archive_hash: &str, assignments: &[(Uuid, Uuid)]) -> PipelineResult<u64> {
        let (record_ids, thread_ids): (Vec<Uuid>, Vec<Uuid>) = assignments.iter().copied().unzip();
        let result = sqlx::query(
            r#"
            UPDATE email_records AS r
            SET thread_id = a.thread_id, updated_at = NOW()
            FROM UNNEST($2::uuid[], $3::uuid[]) AS a(record_id, thread_id)
            WHERE r.record_id = a.record_id AND r.archive_hash = $1
            "#,
        )
        .bind(archive_hash)
        .bind(&record_ids)
        .bind(&thread_ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn apply_duplicates(
        &self,
        archive_hash: &str,
        assignments: &[(Uuid, Option<Uuid>)],
    ) -> PipelineResult<u64> {
        let all: Vec<Uuid> = assignments.iter().map(|(id, _)| *id).collect();
        let (dup_ids, kept_ids): (Vec<Uuid>, Vec<Uuid>) = assignments
            .iter()
            .filter_map(|(id, of)| of.map(|of| (*id, of)))
            .unzip();

        let mut tx = self.pool.begin().await?;

        let cleared = sqlx::query(
            r#"
            UPDATE email_records
            SET duplicate_of = NULL, updated_at = NOW()
            WHERE archive_hash = $1 AND record_id = ANY($2)
            "#,
        )
        .bind(archive_hash)
        .bind(&all)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE email_records AS r
            SET duplicate_of = a.duplicate_of, updated_at = NOW()
            FROM UNNEST($2::uuid[], $3::uuid[]) AS a(record_id, duplicate_of)
            WHERE r.record_id = a.record_id AND r.archive_hash = $1
            "#,
        )
        .bind(archive_hash)
        .bind(&dup_ids)
        .bind(&kept_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(cleared.rows_affected())
    }

    async fn replace_index(&self, archive_hash: &str, documents: &[IndexDocument]) -> PipelineResult<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM index_documents WHERE archive_hash = $1")
            .bind(archive_hash)
            .execute(&mut *tx)
            .await?;

        let mut written = 0;
        for chunk in documents.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO index_documents \
                 (record_id, archive_hash, thread_id, subject, sender, sent_at_epoch, preview, terms) ",
            );
            builder.push_values(chunk, |mut b, doc| {
                b.push_bind(doc.record_id)
                    .push_bind(&doc.archive_hash)
                    .push_bind(doc.thread_id)
                    .push_bind(&doc.subject)
                    .push_bind(&doc.sender)
                    .push_bind(doc.sent_at_epoch)
                    .push_bind(&doc.preview)
                    .push_bind(&doc.terms);
            });
            written += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn index_documents(&self, archive_hash: &str) -> PipelineResult<Vec<IndexDocument>> {
        let rows = sqlx::query_as(
            r#"
            SELECT record_id, archive_hash, thread_id, subject, sender, sent_at_epoch, preview, terms
            FROM index_documents
            WHERE archive_hash = $1
            ORDER BY record_id
            "#,
        )
        .bind(archive_hash)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
