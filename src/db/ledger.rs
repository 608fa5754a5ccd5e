#![allow(dead_code)]

//! Raw queries for `ledger_entries` and `balance_cache` (§4.3, §4.4).
//! Invariant enforcement (one-shot checks, balance math) lives in
//! `crate::ledger` and `crate::balances`; this module only talks to rows.

use super::models::{BalanceCacheRow, LedgerEntryRow};
use crate::types::{Direction, Money};
use eyre::{Result, WrapErr};
use serde_json::Value as Json;
use sqlx::postgres::PgPool;
use uuid::Uuid;

pub struct NewLedgerEntry<'a> {
    pub user_id: Option<Uuid>,
    pub asset_id: Uuid,
    pub chain_id: Uuid,
    pub entry_type: &'a str,
    pub direction: Direction,
    pub amount: Money,
    pub balance_after: Option<Money>,
    pub reference_type: &'a str,
    pub reference_id: Uuid,
    pub metadata: Json,
}

/// Inserts a ledger entry. Relies on `idx_ledger_one_shot` to reject a
/// duplicate post for one-shot entry types — callers should treat a unique
/// violation here as "already posted", not as an error to propagate.
pub async fn insert_ledger_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    entry: NewLedgerEntry<'_>,
) -> Result<LedgerEntryRow> {
    sqlx::query_as::<_, LedgerEntryRow>(
        r#"
        INSERT INTO ledger_entries
            (user_id, asset_id, chain_id, entry_type, direction, amount, balance_after,
             reference_type, reference_id, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id, user_id, asset_id, chain_id, entry_type, direction, amount,
                  balance_after, reference_type, reference_id, metadata, created_at
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.asset_id)
    .bind(entry.chain_id)
    .bind(entry.entry_type)
    .bind(entry.direction.as_str())
    .bind(&entry.amount)
    .bind(&entry.balance_after)
    .bind(entry.reference_type)
    .bind(entry.reference_id)
    .bind(&entry.metadata)
    .fetch_one(&mut **tx)
    .await
    .wrap_err("Failed to insert ledger entry")
}

pub async fn ledger_entry_exists(
    pool: &PgPool,
    entry_type: &str,
    reference_type: &str,
    reference_id: Uuid,
) -> Result<bool> {
    let row: (bool,) = sqlx::query_as(
        r#"SELECT EXISTS(
             SELECT 1 FROM ledger_entries
             WHERE entry_type = $1 AND reference_type = $2 AND reference_id = $3
           )"#,
    )
    .bind(entry_type)
    .bind(reference_type)
    .bind(reference_id)
    .fetch_one(pool)
    .await
    .wrap_err("Failed to check ledger entry existence")?;
    Ok(row.0)
}

pub async fn list_entries_for_user(
    pool: &PgPool,
    user_id: Uuid,
    asset_id: Uuid,
    chain_id: Uuid,
) -> Result<Vec<LedgerEntryRow>> {
    sqlx::query_as::<_, LedgerEntryRow>(
        r#"SELECT id, user_id, asset_id, chain_id, entry_type, direction, amount,
                  balance_after, reference_type, reference_id, metadata, created_at
           FROM ledger_entries
           WHERE user_id = $1 AND asset_id = $2 AND chain_id = $3
           ORDER BY created_at"#,
    )
    .bind(user_id)
    .bind(asset_id)
    .bind(chain_id)
    .fetch_all(pool)
    .await
    .wrap_err("Failed to list ledger entries for user")
}

pub async fn list_all_entries_ordered(pool: &PgPool) -> Result<Vec<LedgerEntryRow>> {
    sqlx::query_as::<_, LedgerEntryRow>(
        r#"SELECT id, user_id, asset_id, chain_id, entry_type, direction, amount,
                  balance_after, reference_type, reference_id, metadata, created_at
           FROM ledger_entries
           ORDER BY user_id, asset_id, chain_id, created_at"#,
    )
    .fetch_all(pool)
    .await
    .wrap_err("Failed to list all ledger entries")
}

pub async fn get_balance_cache(
    pool: &PgPool,
    user_id: Uuid,
    asset_id: Uuid,
    chain_id: Uuid,
) -> Result<Option<BalanceCacheRow>> {
    sqlx::query_as::<_, BalanceCacheRow>(
        r#"SELECT user_id, asset_id, chain_id, available, staked, rewards_accrued,
                  withdrawals_pending, updated_at
           FROM balance_cache WHERE user_id = $1 AND asset_id = $2 AND chain_id = $3"#,
    )
    .bind(user_id)
    .bind(asset_id)
    .bind(chain_id)
    .fetch_optional(pool)
    .await
    .wrap_err("Failed to read balance cache")
}

pub async fn get_balance_cache_for_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    asset_id: Uuid,
    chain_id: Uuid,
) -> Result<BalanceCacheRow> {
    sqlx::query_as::<_, BalanceCacheRow>(
        r#"
        INSERT INTO balance_cache (user_id, asset_id, chain_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, asset_id, chain_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(asset_id)
    .bind(chain_id)
    .execute(&mut **tx)
    .await
    .wrap_err("Failed to seed balance cache row")?;

    sqlx::query_as::<_, BalanceCacheRow>(
        r#"SELECT user_id, asset_id, chain_id, available, staked, rewards_accrued,
                  withdrawals_pending, updated_at
           FROM balance_cache WHERE user_id = $1 AND asset_id = $2 AND chain_id = $3 FOR UPDATE"#,
    )
    .bind(user_id)
    .bind(asset_id)
    .bind(chain_id)
    .fetch_one(&mut **tx)
    .await
    .wrap_err("Failed to lock balance cache row")
}

pub async fn write_balance_cache(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    row: &BalanceCacheRow,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE balance_cache SET available = $4, staked = $5, rewards_accrued = $6,
           withdrawals_pending = $7, updated_at = now()
           WHERE user_id = $1 AND asset_id = $2 AND chain_id = $3"#,
    )
    .bind(row.user_id)
    .bind(row.asset_id)
    .bind(row.chain_id)
    .bind(&row.available)
    .bind(&row.staked)
    .bind(&row.rewards_accrued)
    .bind(&row.withdrawals_pending)
    .execute(&mut **tx)
    .await
    .wrap_err("Failed to write balance cache")?;
    Ok(())
}

pub async fn list_all_balance_caches(pool: &PgPool) -> Result<Vec<BalanceCacheRow>> {
    sqlx::query_as::<_, BalanceCacheRow>(
        r#"SELECT user_id, asset_id, chain_id, available, staked, rewards_accrued,
                  withdrawals_pending, updated_at
           FROM balance_cache"#,
    )
    .fetch_all(pool)
    .await
    .wrap_err("Failed to list balance caches")
}

pub async fn list_balance_caches_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<BalanceCacheRow>> {
    sqlx::query_as::<_, BalanceCacheRow>(
        r#"SELECT user_id, asset_id, chain_id, available, staked, rewards_accrued,
                  withdrawals_pending, updated_at
           FROM balance_cache WHERE user_id = $1"#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .wrap_err("Failed to list balance caches for user")
}
