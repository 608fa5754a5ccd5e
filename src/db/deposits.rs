#![allow(dead_code)]

//! Queries for `deposit_addresses` and `deposits` (§4.6).

use super::models::{Deposit, DepositAddress, NewDeposit};
use eyre::{Result, WrapErr};
use sqlx::postgres::PgPool;
use tracing::error;
use uuid::Uuid;

const DEPOSIT_ADDRESS_COLUMNS: &str =
    "id, user_id, chain_id, address, derivation_path, derivation_index, created_at";
const DEPOSIT_COLUMNS: &str = "id, user_id, asset_id, chain_id, deposit_address_id, tx_hash, \
    log_index, from_address, amount, block_number, confirmations, status, confirmed_at, created_at";

pub async fn find_deposit_address(
    pool: &PgPool,
    user_id: Uuid,
    chain_id: Uuid,
) -> Result<Option<DepositAddress>> {
    let sql = format!("SELECT {DEPOSIT_ADDRESS_COLUMNS} FROM deposit_addresses WHERE user_id = $1 AND chain_id = $2");
    sqlx::query_as::<_, DepositAddress>(&sql)
        .bind(user_id)
        .bind(chain_id)
        .fetch_optional(pool)
        .await
        .wrap_err("Failed to look up deposit address")
}

/// Allocate the next HD derivation index for a chain, under a row lock on a
/// sentinel system_config row so concurrent allocations for different users
/// never collide. Mirrors the teacher's single-writer-per-chain discipline
/// applied to address assignment instead of nonce assignment.
pub async fn allocate_deposit_address(
    pool: &PgPool,
    user_id: Uuid,
    chain_id: Uuid,
    chain_slug: &str,
    derive_address: impl Fn(i64) -> String,
) -> Result<DepositAddress> {
    let key = format!("deposit_address_cursor:{chain_slug}");
    crate::db::transaction(pool, |tx| {
        let key = key.clone();
        let derive_address = &derive_address;
        Box::pin(async move {
            sqlx::query(
                r#"INSERT INTO system_config (key, value) VALUES ($1, '0'::jsonb)
                   ON CONFLICT (key) DO NOTHING"#,
            )
            .bind(&key)
            .execute(&mut **tx)
            .await
            .wrap_err("Failed to seed deposit address cursor")?;

            let row: (serde_json::Value,) =
                sqlx::query_as(r#"SELECT value FROM system_config WHERE key = $1 FOR UPDATE"#)
                    .bind(&key)
                    .fetch_one(&mut **tx)
                    .await
                    .wrap_err("Failed to lock deposit address cursor")?;
            let next_index = row.0.as_i64().unwrap_or(0) + 1;

            sqlx::query(r#"UPDATE system_config SET value = $2::jsonb WHERE key = $1"#)
                .bind(&key)
                .bind(serde_json::Value::from(next_index))
                .execute(&mut **tx)
                .await
                .wrap_err("Failed to advance deposit address cursor")?;

            let address = derive_address(next_index);

            let sql = format!(
                "INSERT INTO deposit_addresses (user_id, chain_id, address, derivation_index) \
                 VALUES ($1, $2, $3, $4) RETURNING {DEPOSIT_ADDRESS_COLUMNS}"
            );
            sqlx::query_as::<_, DepositAddress>(&sql)
                .bind(user_id)
                .bind(chain_id)
                .bind(&address)
                .bind(next_index)
                .fetch_one(&mut **tx)
                .await
                .wrap_err("Failed to insert deposit address")
        })
    })
    .await
}

pub async fn find_deposit_address_by_id(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<Option<DepositAddress>> {
    let sql = format!("SELECT {DEPOSIT_ADDRESS_COLUMNS} FROM deposit_addresses WHERE id = $1 AND user_id = $2");
    sqlx::query_as::<_, DepositAddress>(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .wrap_err("Failed to look up deposit address by id")
}

pub async fn deposit_exists(pool: &PgPool, chain_id: Uuid, tx_hash: &str, log_index: Option<i32>) -> Result<bool> {
    let row: (bool,) = sqlx::query_as(
        r#"SELECT EXISTS(
             SELECT 1 FROM deposits
             WHERE chain_id = $1 AND tx_hash = $2 AND COALESCE(log_index, -1) = COALESCE($3, -1)
           )"#,
    )
    .bind(chain_id)
    .bind(tx_hash)
    .bind(log_index)
    .fetch_one(pool)
    .await
    .wrap_err("Failed to check deposit existence")?;
    Ok(row.0)
}

pub async fn insert_deposit(pool: &PgPool, deposit: &NewDeposit) -> Result<Deposit> {
    let sql = format!(
        "INSERT INTO deposits (user_id, asset_id, chain_id, deposit_address_id, tx_hash, \
         log_index, from_address, amount, block_number) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {DEPOSIT_COLUMNS}"
    );
    sqlx::query_as::<_, Deposit>(&sql)
        .bind(deposit.user_id)
        .bind(deposit.asset_id)
        .bind(deposit.chain_id)
        .bind(deposit.deposit_address_id)
        .bind(&deposit.tx_hash)
        .bind(deposit.log_index)
        .bind(&deposit.from_address)
        .bind(&deposit.amount)
        .bind(deposit.block_number)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            error!(error = ?e, "SQL error inserting deposit");
            e
        })
        .wrap_err("Failed to insert deposit")
}

pub async fn list_awaiting_confirmation(pool: &PgPool, chain_id: Uuid) -> Result<Vec<Deposit>> {
    let sql = format!(
        "SELECT {DEPOSIT_COLUMNS} FROM deposits \
         WHERE chain_id = $1 AND status IN ('awaiting', 'confirming') ORDER BY created_at"
    );
    sqlx::query_as::<_, Deposit>(&sql)
        .bind(chain_id)
        .fetch_all(pool)
        .await
        .wrap_err("Failed to list deposits awaiting confirmation")
}

pub async fn update_deposit_confirmations(pool: &PgPool, id: Uuid, confirmations: i32) -> Result<()> {
    sqlx::query(
        r#"UPDATE deposits SET confirmations = $2,
           status = CASE WHEN status = 'awaiting' THEN 'confirming' ELSE status END
           WHERE id = $1"#,
    )
    .bind(id)
    .bind(confirmations)
    .execute(pool)
    .await
    .wrap_err("Failed to update deposit confirmation count")?;
    Ok(())
}

/// Marks a deposit CONFIRMED. Caller posts the matching one-shot ledger entry
/// in the same transaction — see `ledger::post_deposit_confirmed`.
pub async fn mark_deposit_confirmed(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    confirmations: i32,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE deposits SET status = 'confirmed', confirmations = $2, confirmed_at = now()
           WHERE id = $1 AND status != 'confirmed'"#,
    )
    .bind(id)
    .bind(confirmations)
    .execute(&mut **tx)
    .await
    .wrap_err("Failed to mark deposit confirmed")?;
    Ok(())
}

pub async fn find_deposit(pool: &PgPool, id: Uuid) -> Result<Option<Deposit>> {
    let sql = format!("SELECT {DEPOSIT_COLUMNS} FROM deposits WHERE id = $1");
    sqlx::query_as::<_, Deposit>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .wrap_err("Failed to look up deposit")
}

pub async fn list_deposits_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Deposit>> {
    let sql = format!("SELECT {DEPOSIT_COLUMNS} FROM deposits WHERE user_id = $1 ORDER BY created_at DESC");
    sqlx::query_as::<_, Deposit>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .wrap_err("Failed to list deposits for user")
}
