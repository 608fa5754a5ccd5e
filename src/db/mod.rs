#![allow(dead_code)]

use eyre::{Result, WrapErr};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub mod audit;
pub mod catalog;
pub mod deposits;
pub mod jobs;
pub mod ledger;
pub mod models;
pub mod notifications;
pub mod sessions;
pub mod stakes;
pub mod users;
pub mod withdrawals;

pub use models::*;

/// Create a database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .wrap_err("Failed to connect to database")
}

/// Run pending migrations (uses the migration files in migrations/)
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .wrap_err("Failed to run database migrations")?;
    Ok(())
}

const TRANSACTION_MAX_RETRIES: u32 = 3;

fn is_serialization_failure(e: &sqlx::Error) -> bool {
    matches!(e.as_database_error().and_then(|d| d.code()), Some(code) if code == "40001" || code == "40P01")
}

fn jittered_backoff(attempt: u32) -> Duration {
    let base_ms = 20u64.saturating_mul(1u64 << attempt.min(8));
    let jitter_ms = rand::Rng::gen_range(&mut rand::thread_rng(), 0..base_ms.max(1));
    Duration::from_millis(base_ms + jitter_ms)
}

/// Runs `f` inside a `SERIALIZABLE` transaction, retrying the whole
/// transaction (not just the commit) up to [`TRANSACTION_MAX_RETRIES`] times
/// with jittered backoff when Postgres reports a serialization failure or
/// deadlock (SQLSTATE `40001`/`40P01`) at commit time — the same
/// detect-and-reschedule shape the teacher's retry module applies to
/// broadcast failures, reused here for DB contention instead of RPC errors.
/// An error returned by `f` itself is a business-logic rejection and is
/// never retried.
pub async fn transaction<T, E, F>(pool: &PgPool, mut f: F) -> std::result::Result<T, E>
where
    E: From<sqlx::Error>,
    F: for<'c> FnMut(&'c mut sqlx::Transaction<'_, sqlx::Postgres>) -> Pin<Box<dyn Future<Output = std::result::Result<T, E>> + Send + 'c>>,
{
    let mut attempt = 0;
    loop {
        let mut tx = pool.begin().await.map_err(E::from)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE").execute(&mut *tx).await.map_err(E::from)?;

        let value = match f(&mut tx).await {
            Ok(value) => value,
            Err(e) => return Err(e),
        };

        match tx.commit().await {
            Ok(()) => return Ok(value),
            Err(e) if attempt < TRANSACTION_MAX_RETRIES && is_serialization_failure(&e) => {
                attempt += 1;
                let backoff = jittered_backoff(attempt);
                tracing::warn!(attempt, ?backoff, error = %e, "transaction serialization failure, retrying");
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(E::from(e)),
        }
    }
}
