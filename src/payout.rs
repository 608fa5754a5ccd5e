//! Payout executor (§4.9, §4.11): broadcasts approved withdrawals from the
//! chain's treasury wallet and sweeps sent transactions to confirmation.
//! Driven by the `process_payout`/`check_payout_status` job queues rather
//! than a direct status poll, reusing the teacher's [`crate::retry`]
//! backoff/error-classification helpers rather than inventing a second
//! retry policy for the same kind of problem.

use crate::chain::{ChainClient, ReceiptStatus};
use crate::config::MasterKey;
use crate::db;
use crate::retry::{classify_error, ErrorClass, RetryConfig};
use eyre::{eyre, Result, WrapErr};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const PROCESS_PAYOUT_QUEUE: &str = "process_payout";
pub const CHECK_PAYOUT_STATUS_QUEUE: &str = "check_payout_status";

/// §4.8: process_payout gets 3 attempts with exponential backoff.
const PROCESS_PAYOUT_MAX_ATTEMPTS: i32 = 3;
/// §4.9: check_payout_status gets up to 20 attempts (30s initial delay,
/// exponential backoff).
const CHECK_PAYOUT_STATUS_MAX_ATTEMPTS: i32 = 20;

fn process_payout_retry_config() -> RetryConfig {
    RetryConfig { max_retries: PROCESS_PAYOUT_MAX_ATTEMPTS as u32, ..RetryConfig::default() }
}

fn check_payout_status_retry_config() -> RetryConfig {
    RetryConfig {
        max_retries: CHECK_PAYOUT_STATUS_MAX_ATTEMPTS as u32,
        initial_backoff: Duration::from_secs(30),
        max_backoff: Duration::from_secs(30 * 60),
        ..RetryConfig::default()
    }
}

/// Enqueues the job that broadcasts an approved withdrawal's payout
/// transaction. Called once, right after a withdrawal clears review.
pub async fn enqueue_process_payout(db: &PgPool, withdrawal_id: Uuid) -> Result<db::Job> {
    crate::jobs::enqueue(db, PROCESS_PAYOUT_QUEUE, serde_json::json!({ "withdrawal_id": withdrawal_id }), PROCESS_PAYOUT_MAX_ATTEMPTS).await
}

/// Enqueues the job that polls a broadcast payout's receipt for confirmation
/// depth. A handler returning `Err` (still pending) is retried by
/// [`crate::jobs::run_queue`]'s normal backoff, so this amounts to a
/// self-rescheduling poll rather than a one-shot check.
async fn enqueue_check_payout_status(db: &PgPool, withdrawal_id: Uuid) -> Result<db::Job> {
    crate::jobs::enqueue(db, CHECK_PAYOUT_STATUS_QUEUE, serde_json::json!({ "withdrawal_id": withdrawal_id }), CHECK_PAYOUT_STATUS_MAX_ATTEMPTS).await
}

fn withdrawal_id_from_job(job: &db::Job) -> Result<Uuid> {
    job.payload
        .get("withdrawal_id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| eyre!("job {} payload missing withdrawal_id", job.id))
}

/// `process_payout` handler: broadcasts the payout transaction for one
/// approved withdrawal, then hands off to `check_payout_status` to track it
/// to confirmation.
async fn process_payout_job(
    db: &PgPool,
    master_key: &MasterKey,
    chain_clients: &HashMap<Uuid, Arc<dyn ChainClient>>,
    retry_config: &RetryConfig,
    job: db::Job,
) -> Result<()> {
    let withdrawal_id = withdrawal_id_from_job(&job)?;
    let Some(withdrawal) = db::withdrawals::find_withdrawal_request(db, withdrawal_id).await? else {
        tracing::warn!(%withdrawal_id, "process_payout job for missing withdrawal, dropping");
        return Ok(());
    };
    if withdrawal.status != "approved" {
        // Already broadcast (or moved on) by a prior attempt at this job — idempotent no-op.
        return Ok(());
    }

    broadcast_one(db, master_key, chain_clients, retry_config, &withdrawal).await?;
    enqueue_check_payout_status(db, withdrawal_id).await?;
    Ok(())
}

async fn broadcast_one(
    db: &PgPool,
    master_key: &MasterKey,
    chain_clients: &HashMap<Uuid, Arc<dyn ChainClient>>,
    retry_config: &RetryConfig,
    withdrawal: &db::WithdrawalRequest,
) -> Result<()> {
    let client = chain_clients
        .get(&withdrawal.chain_id)
        .ok_or_else(|| eyre!("no chain client configured for chain {}", withdrawal.chain_id))?;

    let wallet = db::withdrawals::find_active_treasury_wallet(db, withdrawal.chain_id)
        .await?
        .ok_or_else(|| eyre!("no active treasury wallet for chain {}", withdrawal.chain_id))?;
    let private_key = crate::crypto::decrypt(&master_key.0, crate::crypto::TREASURY_KEY_DOMAIN, &wallet.encrypted_private_key, &wallet.nonce)
        .wrap_err("failed to decrypt treasury private key")?;
    let private_key_hex = String::from_utf8(private_key).wrap_err("decrypted treasury private key was not valid utf-8")?;

    let asset = db::catalog::find_asset(db, withdrawal.asset_id)
        .await?
        .ok_or_else(|| eyre!("asset {} not found", withdrawal.asset_id))?;

    db::withdrawals::set_withdrawal_status(db, withdrawal.id, "processing").await?;

    let result = with_broadcast_retry(retry_config, || {
        client.send_payout(
            &private_key_hex,
            asset.contract_address.as_deref(),
            asset.decimals,
            &withdrawal.destination_address,
            &withdrawal.net_amount,
        )
    })
    .await;

    match result {
        Ok((tx_hash, nonce)) => {
            db::withdrawals::mark_payout_sent(db, withdrawal.id, &tx_hash, nonce as i64).await?;
            tracing::info!(withdrawal_id = %withdrawal.id, tx_hash = %tx_hash, "payout broadcast");
            crate::metrics::record_payout_broadcast(&withdrawal.chain_id.to_string(), true);
            Ok(())
        }
        Err(e) => {
            db::withdrawals::mark_payout_failed(db, withdrawal.id, &e.to_string()).await?;
            if classify_error(&e.to_string()) == ErrorClass::Permanent {
                db::withdrawals::set_withdrawal_status(db, withdrawal.id, "pending_review").await?;
            }
            crate::metrics::record_payout_broadcast(&withdrawal.chain_id.to_string(), false);
            Err(e)
        }
    }
}

async fn with_broadcast_retry<'a, F, Fut>(config: &RetryConfig, mut send: F) -> Result<(String, u64)>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(String, u64)>> + 'a,
{
    let mut attempt = 0;
    loop {
        match send().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let class = classify_error(&e.to_string());
                if class == ErrorClass::Permanent || class == ErrorClass::NonceTooLow || !config.should_retry(attempt) {
                    return Err(e);
                }
                let backoff = config.backoff_for_attempt(attempt);
                tracing::warn!(attempt, ?class, error = %e, "retrying payout broadcast after backoff");
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

/// `check_payout_status` handler: polls one payout's receipt. Returning
/// `Err` for a still-pending transaction leans on `run_queue`'s retry
/// backoff to reschedule the next poll, rather than this module tracking its
/// own interval.
async fn check_payout_status_job(
    db: &PgPool,
    chain_clients: &HashMap<Uuid, Arc<dyn ChainClient>>,
    confirmations_required: impl Fn(Uuid) -> i32,
    job: db::Job,
) -> Result<()> {
    let withdrawal_id = withdrawal_id_from_job(&job)?;
    let Some(withdrawal) = db::withdrawals::find_withdrawal_request(db, withdrawal_id).await? else {
        tracing::warn!(%withdrawal_id, "check_payout_status job for missing withdrawal, dropping");
        return Ok(());
    };
    let client = chain_clients
        .get(&withdrawal.chain_id)
        .ok_or_else(|| eyre!("no chain client configured for chain {}", withdrawal.chain_id))?;
    let Some(payout) = db::withdrawals::find_payout_tx(db, withdrawal_id).await? else {
        return Err(eyre!("withdrawal {withdrawal_id} approved but has no payout_tx row yet"));
    };
    let Some(tx_hash) = &payout.tx_hash else {
        return Err(eyre!("payout for withdrawal {withdrawal_id} has no tx_hash yet"));
    };

    let (status, confirmations) = client.receipt_status(tx_hash).await?;
    match status {
        ReceiptStatus::Success => {
            let confirmations = confirmations.unwrap_or(0) as i32;
            if confirmations >= confirmations_required(withdrawal.chain_id) {
                db::withdrawals::mark_payout_confirmed(db, withdrawal.id, confirmations, None).await?;
                crate::withdrawals::mark_paid(db, withdrawal.id).await?;
                Ok(())
            } else {
                Err(eyre!("payout for withdrawal {withdrawal_id} has {confirmations} confirmations, waiting for more"))
            }
        }
        ReceiptStatus::Reverted => {
            db::withdrawals::mark_payout_failed(db, withdrawal.id, "payout transaction reverted on-chain").await?;
            db::withdrawals::set_withdrawal_status(db, withdrawal.id, "pending_review").await?;
            Ok(())
        }
        ReceiptStatus::Pending => Err(eyre!("payout for withdrawal {withdrawal_id} is still pending")),
    }
}

/// Drives both payout job queues to completion, fanning a single shutdown
/// signal out to each queue's own [`crate::jobs::run_queue`] loop — the same
/// per-worker shape the teacher uses for its watcher/writer managers.
pub async fn run(
    db: PgPool,
    master_key: MasterKey,
    chain_clients: HashMap<Uuid, Arc<dyn ChainClient>>,
    chains: Vec<db::Chain>,
    poll_interval: Duration,
    mut shutdown: tokio::sync::mpsc::Receiver<()>,
) {
    let retry_config = RetryConfig::default();
    let confirmations_required: HashMap<Uuid, i32> = chains.iter().map(|c| (c.id, c.confirmations_required)).collect();

    let (process_tx, process_rx) = tokio::sync::mpsc::channel::<()>(1);
    let (check_tx, check_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(async move {
        let _ = shutdown.recv().await;
        let _ = process_tx.send(()).await;
        let _ = check_tx.send(()).await;
    });

    let process_db = db.clone();
    let process_key = master_key.clone();
    let process_clients = chain_clients.clone();
    let process_retry = retry_config.clone();
    let process_future = crate::jobs::run_queue(
        db.clone(),
        PROCESS_PAYOUT_QUEUE,
        20,
        poll_interval,
        process_payout_retry_config(),
        process_rx,
        move |job| {
            let db = process_db.clone();
            let key = process_key.clone();
            let clients = process_clients.clone();
            let retry = process_retry.clone();
            async move { process_payout_job(&db, &key, &clients, &retry, job).await }
        },
    );

    let check_db = db.clone();
    let check_clients = chain_clients.clone();
    let check_confirmations = confirmations_required.clone();
    let check_future = crate::jobs::run_queue(
        db.clone(),
        CHECK_PAYOUT_STATUS_QUEUE,
        20,
        poll_interval,
        check_payout_status_retry_config(),
        check_rx,
        move |job| {
            let db = check_db.clone();
            let clients = check_clients.clone();
            let confirmations_required = check_confirmations.clone();
            async move { check_payout_status_job(&db, &clients, |chain_id| confirmations_required.get(&chain_id).copied().unwrap_or(12), job).await }
        },
    );

    tokio::join!(process_future, check_future);
    tracing::info!("payout executor shut down");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with_payload(payload: serde_json::Value) -> db::Job {
        db::Job {
            id: Uuid::new_v4(),
            queue_name: PROCESS_PAYOUT_QUEUE.to_string(),
            payload,
            status: "running".to_string(),
            attempts: 0,
            max_attempts: 5,
            run_after: chrono::Utc::now(),
            last_error: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn withdrawal_id_extracted_from_job_payload() {
        let id = Uuid::new_v4();
        let job = job_with_payload(serde_json::json!({ "withdrawal_id": id }));
        assert_eq!(withdrawal_id_from_job(&job).unwrap(), id);
    }

    #[test]
    fn missing_withdrawal_id_is_an_error() {
        let job = job_with_payload(serde_json::json!({}));
        assert!(withdrawal_id_from_job(&job).is_err());
    }
}
