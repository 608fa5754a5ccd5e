#![allow(dead_code)]

//! Raw queries for `jobs`, the Postgres-backed queue substituting for the
//! spec's nominal Redis-class queue (see DESIGN.md). Dequeue uses
//! `SELECT ... FOR UPDATE SKIP LOCKED`, the same discipline the teacher
//! applies to pool/asset row locks, generalized to job rows so concurrent
//! workers never double-claim one.

use super::models::Job;
use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr};
use serde_json::Value as Json;
use sqlx::postgres::PgPool;
use uuid::Uuid;

const JOB_COLUMNS: &str = "id, queue_name, payload, status, attempts, max_attempts, \
    run_after, last_error, created_at, updated_at";

pub async fn enqueue(pool: &PgPool, queue_name: &str, payload: Json, max_attempts: i32) -> Result<Job> {
    let sql = format!(
        "INSERT INTO jobs (queue_name, payload, max_attempts) VALUES ($1, $2, $3) \
         RETURNING {JOB_COLUMNS}"
    );
    sqlx::query_as::<_, Job>(&sql)
        .bind(queue_name)
        .bind(payload)
        .bind(max_attempts)
        .fetch_one(pool)
        .await
        .wrap_err("Failed to enqueue job")
}

/// Claim up to `batch_size` runnable jobs from `queue_name`, marking them
/// `running`. Uses `SKIP LOCKED` so two worker instances never claim the same
/// row; the teacher achieves the equivalent per-chain exclusivity by giving
/// each chain its own writer task rather than locking rows, since it only
/// ever runs one watcher/writer pair per chain.
pub async fn dequeue(pool: &PgPool, queue_name: &str, batch_size: i64) -> Result<Vec<Job>> {
    let sql = format!(
        "UPDATE jobs SET status = 'running', updated_at = now()
         WHERE id IN (
             SELECT id FROM jobs
             WHERE queue_name = $1 AND status = 'pending' AND run_after <= now()
             ORDER BY run_after
             LIMIT $2
             FOR UPDATE SKIP LOCKED
         )
         RETURNING {JOB_COLUMNS}"
    );
    sqlx::query_as::<_, Job>(&sql)
        .bind(queue_name)
        .bind(batch_size)
        .fetch_all(pool)
        .await
        .wrap_err("Failed to dequeue jobs")
}

pub async fn mark_done(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query(r#"UPDATE jobs SET status = 'done', updated_at = now() WHERE id = $1"#)
        .bind(id)
        .execute(pool)
        .await
        .wrap_err("Failed to mark job done")?;
    Ok(())
}

/// Reschedules a job for retry with exponential backoff, or marks it `dead`
/// once `max_attempts` is exhausted — mirrors the teacher's
/// `update_approval_for_retry`/`update_release_for_retry` pattern.
pub async fn mark_failed_for_retry(
    pool: &PgPool,
    id: Uuid,
    error_message: &str,
    next_run_after: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE jobs SET
             status = CASE WHEN attempts + 1 >= max_attempts THEN 'dead' ELSE 'pending' END,
             attempts = attempts + 1,
             last_error = $2,
             run_after = $3,
             updated_at = now()
           WHERE id = $1"#,
    )
    .bind(id)
    .bind(error_message)
    .bind(next_run_after)
    .execute(pool)
    .await
    .wrap_err("Failed to mark job failed for retry")?;
    Ok(())
}

pub async fn count_pending(pool: &PgPool, queue_name: &str) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"SELECT COUNT(*) FROM jobs WHERE queue_name = $1 AND status = 'pending'"#,
    )
    .bind(queue_name)
    .fetch_one(pool)
    .await
    .wrap_err("Failed to count pending jobs")?;
    Ok(row.0)
}

pub async fn list_dead(pool: &PgPool, queue_name: &str) -> Result<Vec<Job>> {
    let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE queue_name = $1 AND status = 'dead'");
    sqlx::query_as::<_, Job>(&sql)
        .bind(queue_name)
        .fetch_all(pool)
        .await
        .wrap_err("Failed to list dead jobs")
}
