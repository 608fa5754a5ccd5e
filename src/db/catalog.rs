#![allow(dead_code)]

//! Queries for `chains`, `assets`, `pools`, `apr_schedules`, `system_config`.

use super::models::{AprSchedule, Asset, Chain, Pool};
use crate::types::Money;
use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr};
use sqlx::postgres::PgPool;
use uuid::Uuid;

const CHAIN_COLUMNS: &str = "id, slug, chain_id, rpc_endpoint, explorer_url, confirmations_required, is_active";
const ASSET_COLUMNS: &str = "id, chain_id, symbol, decimals, contract_address, is_native, is_active, price_usd";
const POOL_COLUMNS: &str = "id, name, slug, asset_id, pool_type, lock_days, current_apr, min_stake, \
    max_stake, total_capacity, total_staked, cooldown_hours, is_active";

pub async fn find_chain_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Chain>> {
    let sql = format!("SELECT {CHAIN_COLUMNS} FROM chains WHERE slug = $1");
    sqlx::query_as::<_, Chain>(&sql)
        .bind(slug)
        .fetch_optional(pool)
        .await
        .wrap_err("Failed to look up chain by slug")
}

pub async fn list_active_chains(pool: &PgPool) -> Result<Vec<Chain>> {
    let sql = format!("SELECT {CHAIN_COLUMNS} FROM chains WHERE is_active");
    sqlx::query_as::<_, Chain>(&sql)
        .fetch_all(pool)
        .await
        .wrap_err("Failed to list active chains")
}

/// Ensure a chain row exists for this env-configured chain, updating its RPC
/// metadata in place. Lets operators add chains via env vars without a
/// separate admin-seeding step.
pub async fn upsert_chain(
    pool: &PgPool,
    slug: &str,
    chain_id: i64,
    rpc_endpoint: &str,
    confirmations_required: i32,
) -> Result<Chain> {
    let sql = format!(
        "INSERT INTO chains (slug, chain_id, rpc_endpoint, confirmations_required) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (slug) DO UPDATE SET rpc_endpoint = EXCLUDED.rpc_endpoint, \
             confirmations_required = EXCLUDED.confirmations_required \
         RETURNING {CHAIN_COLUMNS}"
    );
    sqlx::query_as::<_, Chain>(&sql)
        .bind(slug)
        .bind(chain_id)
        .bind(rpc_endpoint)
        .bind(confirmations_required)
        .fetch_one(pool)
        .await
        .wrap_err("Failed to upsert chain")
}

pub async fn find_asset(pool: &PgPool, id: Uuid) -> Result<Option<Asset>> {
    let sql = format!("SELECT {ASSET_COLUMNS} FROM assets WHERE id = $1");
    sqlx::query_as::<_, Asset>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .wrap_err("Failed to look up asset")
}

pub async fn find_pool(pool: &PgPool, id: Uuid) -> Result<Option<Pool>> {
    let sql = format!("SELECT {POOL_COLUMNS} FROM pools WHERE id = $1");
    sqlx::query_as::<_, Pool>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .wrap_err("Failed to look up pool")
}

pub async fn find_pool_for_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
) -> Result<Option<Pool>> {
    let sql = format!("SELECT {POOL_COLUMNS} FROM pools WHERE id = $1 FOR UPDATE");
    sqlx::query_as::<_, Pool>(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .wrap_err("Failed to look up pool for update")
}

pub async fn list_pools(pool: &PgPool, active_only: bool) -> Result<Vec<Pool>> {
    let sql = if active_only {
        format!("SELECT {POOL_COLUMNS} FROM pools WHERE is_active ORDER BY lock_days")
    } else {
        format!("SELECT {POOL_COLUMNS} FROM pools ORDER BY lock_days")
    };
    sqlx::query_as::<_, Pool>(&sql)
        .fetch_all(pool)
        .await
        .wrap_err("Failed to list pools")
}

pub async fn adjust_pool_total_staked(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    pool_id: Uuid,
    delta: &Money,
) -> Result<()> {
    sqlx::query(r#"UPDATE pools SET total_staked = total_staked + $2 WHERE id = $1"#)
        .bind(pool_id)
        .bind(delta)
        .execute(&mut **tx)
        .await
        .wrap_err("Failed to adjust pool total_staked")?;
    Ok(())
}

pub async fn set_pool_active(pool: &PgPool, id: Uuid, is_active: bool) -> Result<()> {
    sqlx::query(r#"UPDATE pools SET is_active = $2 WHERE id = $1"#)
        .bind(id)
        .bind(is_active)
        .execute(pool)
        .await
        .wrap_err("Failed to set pool active flag")?;
    Ok(())
}

/// The `AprSchedule` row effective at `at`, which per the resolved Open
/// Question is the source of truth for accrual math — `pools.current_apr`
/// is a denormalized display cache kept in sync, never read by the accrual
/// job.
pub async fn find_effective_apr_schedule(
    pool: &PgPool,
    pool_id: Uuid,
    at: DateTime<Utc>,
) -> Result<Option<AprSchedule>> {
    sqlx::query_as::<_, AprSchedule>(
        r#"SELECT id, pool_id, apr, effective_from, effective_to
           FROM apr_schedules
           WHERE pool_id = $1 AND effective_from <= $2 AND (effective_to IS NULL OR effective_to > $2)
           ORDER BY effective_from DESC LIMIT 1"#,
    )
    .bind(pool_id)
    .bind(at)
    .fetch_optional(pool)
    .await
    .wrap_err("Failed to look up effective APR schedule")
}

pub async fn insert_apr_schedule(
    pool: &PgPool,
    pool_id: Uuid,
    apr: &Money,
    effective_from: DateTime<Utc>,
) -> Result<AprSchedule> {
    let apr = apr.clone();
    crate::db::transaction(pool, move |tx| {
        let apr = apr.clone();
        Box::pin(async move {
            sqlx::query(
                r#"UPDATE apr_schedules SET effective_to = $2
                   WHERE pool_id = $1 AND effective_to IS NULL"#,
            )
            .bind(pool_id)
            .bind(effective_from)
            .execute(&mut **tx)
            .await
            .wrap_err("Failed to close previous APR schedule")?;

            let row = sqlx::query_as::<_, AprSchedule>(
                r#"INSERT INTO apr_schedules (pool_id, apr, effective_from)
                   VALUES ($1, $2, $3)
                   RETURNING id, pool_id, apr, effective_from, effective_to"#,
            )
            .bind(pool_id)
            .bind(&apr)
            .bind(effective_from)
            .fetch_one(&mut **tx)
            .await
            .wrap_err("Failed to insert APR schedule")?;

            sqlx::query(r#"UPDATE pools SET current_apr = $2 WHERE id = $1"#)
                .bind(pool_id)
                .bind(&apr)
                .execute(&mut **tx)
                .await
                .wrap_err("Failed to sync pool.current_apr display cache")?;

            Ok(row)
        })
    })
    .await
}

pub async fn get_system_config(pool: &PgPool, key: &str) -> Result<Option<serde_json::Value>> {
    let row: Option<(serde_json::Value,)> =
        sqlx::query_as(r#"SELECT value FROM system_config WHERE key = $1"#)
            .bind(key)
            .fetch_optional(pool)
            .await
            .wrap_err("Failed to read system config")?;
    Ok(row.map(|r| r.0))
}

pub async fn set_system_config(pool: &PgPool, key: &str, value: &serde_json::Value) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO system_config (key, value) VALUES ($1, $2)
           ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value"#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await
    .wrap_err("Failed to write system config")?;
    Ok(())
}
