//! Background job queue (§4.11): thin orchestration over `db::jobs`'
//! `SELECT ... FOR UPDATE SKIP LOCKED` queue — each named queue gets its own
//! poll loop with its own concurrency, following the same per-worker
//! poll-and-sleep shape the teacher uses for its watcher/writer managers.

use crate::db;
use crate::retry::RetryConfig;
use eyre::Result;
use serde_json::Value as Json;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

pub async fn enqueue(db: &PgPool, queue_name: &str, payload: Json, max_attempts: i32) -> Result<db::Job> {
    db::jobs::enqueue(db, queue_name, payload, max_attempts).await
}

/// Runs one named queue until `shutdown` fires, dequeuing up to
/// `batch_size` jobs at a time and handing each to `handler`. A handler
/// error marks the job for retry (backed off per `retry_config` and
/// `job.attempts`) or dead-letters it, past the job's own `max_attempts`,
/// rather than stopping the loop.
pub async fn run_queue<F, Fut>(
    db: PgPool,
    queue_name: &'static str,
    batch_size: i64,
    poll_interval: Duration,
    retry_config: RetryConfig,
    mut shutdown: tokio::sync::mpsc::Receiver<()>,
    handler: F,
) where
    F: Fn(db::Job) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!(queue = queue_name, "job queue worker shutting down");
                return;
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }

        let jobs = match db::jobs::dequeue(&db, queue_name, batch_size).await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(queue = queue_name, error = %e, "failed to dequeue jobs");
                continue;
            }
        };
        crate::metrics::set_job_queue_depth(queue_name, jobs.len() as i64);

        for job in jobs {
            let job_id: Uuid = job.id;
            let job_attempts = job.attempts;
            match handler(job).await {
                Ok(()) => {
                    crate::metrics::record_job_processed(queue_name, true);
                    if let Err(e) = db::jobs::mark_done(&db, job_id).await {
                        tracing::error!(queue = queue_name, %job_id, error = %e, "failed to mark job done");
                    }
                }
                Err(e) => {
                    crate::metrics::record_job_processed(queue_name, false);
                    let backoff = retry_config.backoff_for_attempt(job_attempts as u32);
                    tracing::warn!(queue = queue_name, %job_id, attempts = job_attempts, ?backoff, error = %e, "job handler failed, scheduling retry");
                    let next_run_after = chrono::Utc::now() + chrono::Duration::from_std(backoff).unwrap_or(chrono::Duration::seconds(30));
                    if let Err(e) = db::jobs::mark_failed_for_retry(&db, job_id, &e.to_string(), next_run_after).await {
                        tracing::error!(queue = queue_name, %job_id, error = %e, "failed to mark job failed");
                    }
                }
            }
        }
    }
}
