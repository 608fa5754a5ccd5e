#![allow(dead_code)]

//! Queries for `withdrawal_requests`, `payout_txs`, `treasury_wallets`,
//! `address_whitelist` (§4.8, §4.9, §4.10).

use super::models::{AddressWhitelistEntry, PayoutTx, TreasuryWallet, WithdrawalRequest};
use crate::types::Money;
use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr};
use serde_json::Value as Json;
use sqlx::postgres::PgPool;
use uuid::Uuid;

const WITHDRAWAL_COLUMNS: &str = "id, user_id, asset_id, chain_id, amount, fee, net_amount, \
    destination_address, status, user_notes, admin_notes, reviewed_by, reviewed_at, \
    manual_proof_url, idempotency_key, fraud_score, fraud_indicators, created_at, updated_at";

#[derive(Clone)]
pub struct NewWithdrawalRequest<'a> {
    pub user_id: Uuid,
    pub asset_id: Uuid,
    pub chain_id: Uuid,
    pub amount: Money,
    pub fee: Money,
    pub net_amount: Money,
    pub destination_address: &'a str,
    pub user_notes: Option<&'a str>,
    pub idempotency_key: &'a str,
    pub fraud_score: i32,
    pub fraud_indicators: Json,
}

pub async fn find_by_idempotency_key(pool: &PgPool, key: &str) -> Result<Option<WithdrawalRequest>> {
    let sql = format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests WHERE idempotency_key = $1");
    sqlx::query_as::<_, WithdrawalRequest>(&sql)
        .bind(key)
        .fetch_optional(pool)
        .await
        .wrap_err("Failed to look up withdrawal request by idempotency key")
}

pub async fn insert_withdrawal_request(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    req: &NewWithdrawalRequest<'_>,
) -> Result<WithdrawalRequest> {
    let sql = format!(
        "INSERT INTO withdrawal_requests (user_id, asset_id, chain_id, amount, fee, net_amount, \
         destination_address, user_notes, idempotency_key, fraud_score, fraud_indicators) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {WITHDRAWAL_COLUMNS}"
    );
    sqlx::query_as::<_, WithdrawalRequest>(&sql)
        .bind(req.user_id)
        .bind(req.asset_id)
        .bind(req.chain_id)
        .bind(&req.amount)
        .bind(&req.fee)
        .bind(&req.net_amount)
        .bind(req.destination_address)
        .bind(req.user_notes)
        .bind(req.idempotency_key)
        .bind(req.fraud_score)
        .bind(&req.fraud_indicators)
        .fetch_one(&mut **tx)
        .await
        .wrap_err("Failed to insert withdrawal request")
}

pub async fn find_withdrawal_request(pool: &PgPool, id: Uuid) -> Result<Option<WithdrawalRequest>> {
    let sql = format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests WHERE id = $1");
    sqlx::query_as::<_, WithdrawalRequest>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .wrap_err("Failed to look up withdrawal request")
}

pub async fn find_withdrawal_request_for_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
) -> Result<Option<WithdrawalRequest>> {
    let sql = format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests WHERE id = $1 FOR UPDATE");
    sqlx::query_as::<_, WithdrawalRequest>(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .wrap_err("Failed to look up withdrawal request for update")
}

pub async fn list_withdrawal_requests_by_status(pool: &PgPool, status: &str) -> Result<Vec<WithdrawalRequest>> {
    let sql = format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests WHERE status = $1 ORDER BY created_at");
    sqlx::query_as::<_, WithdrawalRequest>(&sql)
        .bind(status)
        .fetch_all(pool)
        .await
        .wrap_err("Failed to list withdrawal requests by status")
}

pub async fn list_withdrawal_requests_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<WithdrawalRequest>> {
    let sql = format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawal_requests WHERE user_id = $1 ORDER BY created_at DESC");
    sqlx::query_as::<_, WithdrawalRequest>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .wrap_err("Failed to list withdrawal requests for user")
}

pub async fn count_requests_today(pool: &PgPool, user_id: Uuid) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"SELECT COUNT(*) FROM withdrawal_requests
           WHERE user_id = $1 AND created_at >= date_trunc('day', now())"#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .wrap_err("Failed to count today's withdrawal requests")?;
    Ok(row.0)
}

/// Sum of USD value (at each asset's current price) of non-REJECTED
/// withdrawal requests in the rolling 24h window, for the DAILY_LIMIT
/// fraud rule (§4.10).
pub async fn sum_usd_withdrawn_last_24h(pool: &PgPool, user_id: Uuid) -> Result<Money> {
    let row: (Option<Money>,) = sqlx::query_as(
        r#"SELECT SUM(wr.amount * a.price_usd) FROM withdrawal_requests wr
           JOIN assets a ON a.id = wr.asset_id
           WHERE wr.user_id = $1 AND wr.status != 'rejected' AND wr.created_at >= now() - interval '24 hours'"#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .wrap_err("Failed to sum last-24h withdrawn USD value")?;
    Ok(row.0.unwrap_or_else(|| Money::from(0)))
}

pub async fn approve_withdrawal_request(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    reviewed_by: Uuid,
    admin_notes: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE withdrawal_requests
           SET status = 'approved', reviewed_by = $2, reviewed_at = now(), admin_notes = $3, updated_at = now()
           WHERE id = $1 AND status = 'pending_review'"#,
    )
    .bind(id)
    .bind(reviewed_by)
    .bind(admin_notes)
    .execute(&mut **tx)
    .await
    .wrap_err("Failed to approve withdrawal request")?;
    Ok(())
}

pub async fn reject_withdrawal_request(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    reviewed_by: Uuid,
    admin_notes: &str,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE withdrawal_requests
           SET status = 'rejected', reviewed_by = $2, reviewed_at = now(), admin_notes = $3, updated_at = now()
           WHERE id = $1 AND status = 'pending_review'"#,
    )
    .bind(id)
    .bind(reviewed_by)
    .bind(admin_notes)
    .execute(&mut **tx)
    .await
    .wrap_err("Failed to reject withdrawal request")?;
    Ok(())
}

pub async fn mark_withdrawal_paid(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE withdrawal_requests SET status = 'paid', updated_at = now()
           WHERE id = $1 AND status = 'processing'"#,
    )
    .bind(id)
    .execute(&mut **tx)
    .await
    .wrap_err("Failed to mark withdrawal request paid")?;
    Ok(())
}

/// Admin-driven PAID transition for payouts settled out of band (manual bank
/// transfer, etc), distinct from the on-chain payout executor's
/// `mark_withdrawal_paid`: accepts from APPROVED or PROCESSING and records
/// the admin's proof URL/notes alongside the status change.
pub async fn mark_withdrawal_paid_manual(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    manual_proof_url: Option<&str>,
    admin_notes: &str,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE withdrawal_requests
           SET status = 'paid', manual_proof_url = $2, admin_notes = $3, updated_at = now()
           WHERE id = $1 AND status IN ('approved', 'processing')"#,
    )
    .bind(id)
    .bind(manual_proof_url)
    .bind(admin_notes)
    .execute(&mut **tx)
    .await
    .wrap_err("Failed to mark withdrawal request paid manually")?;
    Ok(())
}

pub async fn set_withdrawal_status(pool: &PgPool, id: Uuid, status: &str) -> Result<()> {
    sqlx::query(r#"UPDATE withdrawal_requests SET status = $2, updated_at = now() WHERE id = $1"#)
        .bind(id)
        .bind(status)
        .execute(pool)
        .await
        .wrap_err("Failed to set withdrawal request status")?;
    Ok(())
}

pub async fn upsert_payout_tx_pending(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    withdrawal_request_id: Uuid,
) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO payout_txs (withdrawal_request_id) VALUES ($1)
           ON CONFLICT (withdrawal_request_id) DO NOTHING"#,
    )
    .bind(withdrawal_request_id)
    .execute(&mut **tx)
    .await
    .wrap_err("Failed to create pending payout tx row")?;
    Ok(())
}

pub async fn find_payout_tx(pool: &PgPool, withdrawal_request_id: Uuid) -> Result<Option<PayoutTx>> {
    sqlx::query_as::<_, PayoutTx>(
        r#"SELECT withdrawal_request_id, tx_hash, nonce, gas_used, status, confirmations,
                  error_message, sent_at, confirmed_at, attempts
           FROM payout_txs WHERE withdrawal_request_id = $1"#,
    )
    .bind(withdrawal_request_id)
    .fetch_optional(pool)
    .await
    .wrap_err("Failed to look up payout tx")
}

pub async fn mark_payout_sent(pool: &PgPool, withdrawal_request_id: Uuid, tx_hash: &str, nonce: i64) -> Result<()> {
    sqlx::query(
        r#"UPDATE payout_txs SET tx_hash = $2, nonce = $3, status = 'sent', sent_at = now(),
           attempts = attempts + 1 WHERE withdrawal_request_id = $1"#,
    )
    .bind(withdrawal_request_id)
    .bind(tx_hash)
    .bind(nonce)
    .execute(pool)
    .await
    .wrap_err("Failed to mark payout sent")?;
    Ok(())
}

pub async fn mark_payout_confirmed(pool: &PgPool, withdrawal_request_id: Uuid, confirmations: i32, gas_used: Option<&Money>) -> Result<()> {
    sqlx::query(
        r#"UPDATE payout_txs SET status = 'confirmed', confirmations = $2, confirmed_at = now(), gas_used = $3
           WHERE withdrawal_request_id = $1"#,
    )
    .bind(withdrawal_request_id)
    .bind(confirmations)
    .bind(gas_used)
    .execute(pool)
    .await
    .wrap_err("Failed to mark payout confirmed")?;
    Ok(())
}

pub async fn mark_payout_failed(pool: &PgPool, withdrawal_request_id: Uuid, error_message: &str) -> Result<()> {
    sqlx::query(
        r#"UPDATE payout_txs SET status = 'failed', error_message = $2, attempts = attempts + 1
           WHERE withdrawal_request_id = $1"#,
    )
    .bind(withdrawal_request_id)
    .bind(error_message)
    .execute(pool)
    .await
    .wrap_err("Failed to mark payout failed")?;
    Ok(())
}

pub async fn list_payout_txs_in_flight(pool: &PgPool, status: &str) -> Result<Vec<PayoutTx>> {
    sqlx::query_as::<_, PayoutTx>(
        r#"SELECT withdrawal_request_id, tx_hash, nonce, gas_used, status, confirmations,
                  error_message, sent_at, confirmed_at, attempts
           FROM payout_txs WHERE status = $1"#,
    )
    .bind(status)
    .fetch_all(pool)
    .await
    .wrap_err("Failed to list in-flight payout txs")
}

pub async fn find_active_treasury_wallet(pool: &PgPool, chain_id: Uuid) -> Result<Option<TreasuryWallet>> {
    sqlx::query_as::<_, TreasuryWallet>(
        r#"SELECT id, chain_id, address, label, encrypted_private_key, nonce, is_active
           FROM treasury_wallets WHERE chain_id = $1 AND is_active LIMIT 1"#,
    )
    .bind(chain_id)
    .fetch_optional(pool)
    .await
    .wrap_err("Failed to look up active treasury wallet")
}

pub async fn find_whitelist_entry(
    pool: &PgPool,
    user_id: Uuid,
    chain_id: Uuid,
    address: &str,
) -> Result<Option<AddressWhitelistEntry>> {
    sqlx::query_as::<_, AddressWhitelistEntry>(
        r#"SELECT user_id, chain_id, address, label, cooldown_ends_at
           FROM address_whitelist WHERE user_id = $1 AND chain_id = $2 AND address = $3"#,
    )
    .bind(user_id)
    .bind(chain_id)
    .bind(address)
    .fetch_optional(pool)
    .await
    .wrap_err("Failed to look up address whitelist entry")
}

pub async fn upsert_whitelist_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    chain_id: Uuid,
    address: &str,
    label: Option<&str>,
    cooldown_ends_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO address_whitelist (user_id, chain_id, address, label, cooldown_ends_at)
           VALUES ($1, $2, $3, $4, $5)
           ON CONFLICT (user_id, chain_id, address) DO UPDATE SET
               label = EXCLUDED.label, cooldown_ends_at = EXCLUDED.cooldown_ends_at"#,
    )
    .bind(user_id)
    .bind(chain_id)
    .bind(address)
    .bind(label)
    .bind(cooldown_ends_at)
    .execute(&mut **tx)
    .await
    .wrap_err("Failed to upsert address whitelist entry")?;
    Ok(())
}
