#![allow(dead_code)]

//! Queries for `stake_positions` (§4.7).

use super::models::StakePosition;
use crate::types::Money;
use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr};
use uuid::Uuid;

const STAKE_COLUMNS: &str = "id, user_id, pool_id, amount, apr_at_open, rewards_accrued, \
    rewards_claimed, last_reward_calculation, status, locked_until, cooldown_ends_at, \
    unstaked_at, created_at";

pub async fn insert_stake_position(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    pool_id: Uuid,
    amount: &Money,
    apr_at_open: &Money,
    locked_until: Option<DateTime<Utc>>,
) -> Result<StakePosition> {
    let sql = format!(
        "INSERT INTO stake_positions (user_id, pool_id, amount, apr_at_open, locked_until) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {STAKE_COLUMNS}"
    );
    sqlx::query_as::<_, StakePosition>(&sql)
        .bind(user_id)
        .bind(pool_id)
        .bind(amount)
        .bind(apr_at_open)
        .bind(locked_until)
        .fetch_one(&mut **tx)
        .await
        .wrap_err("Failed to insert stake position")
}

pub async fn find_stake_position(pool: &sqlx::PgPool, id: Uuid) -> Result<Option<StakePosition>> {
    let sql = format!("SELECT {STAKE_COLUMNS} FROM stake_positions WHERE id = $1");
    sqlx::query_as::<_, StakePosition>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .wrap_err("Failed to look up stake position")
}

pub async fn find_stake_position_for_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
) -> Result<Option<StakePosition>> {
    let sql = format!("SELECT {STAKE_COLUMNS} FROM stake_positions WHERE id = $1 FOR UPDATE");
    sqlx::query_as::<_, StakePosition>(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .wrap_err("Failed to look up stake position for update")
}

pub async fn list_stake_positions_for_user(
    pool: &sqlx::PgPool,
    user_id: Uuid,
) -> Result<Vec<StakePosition>> {
    let sql = format!("SELECT {STAKE_COLUMNS} FROM stake_positions WHERE user_id = $1 ORDER BY created_at DESC");
    sqlx::query_as::<_, StakePosition>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .wrap_err("Failed to list stake positions for user")
}

/// ACTIVE or cooling-down (UNSTAKING) positions whose rewards haven't been
/// accrued recently — the accrual worker's unit of work. Rewards keep
/// accruing through cooldown, so UNSTAKING positions stay in scope until
/// the cooldown sweep finalizes them.
pub async fn list_active_for_accrual(pool: &sqlx::PgPool, limit: i64) -> Result<Vec<StakePosition>> {
    let sql = format!(
        "SELECT {STAKE_COLUMNS} FROM stake_positions \
         WHERE status IN ('active', 'unstaking') ORDER BY last_reward_calculation LIMIT $1"
    );
    sqlx::query_as::<_, StakePosition>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await
        .wrap_err("Failed to list stake positions due for accrual")
}

pub async fn accrue_rewards(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    reward: &Money,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE stake_positions
           SET rewards_accrued = rewards_accrued + $2, last_reward_calculation = $3
           WHERE id = $1"#,
    )
    .bind(id)
    .bind(reward)
    .bind(at)
    .execute(&mut **tx)
    .await
    .wrap_err("Failed to accrue stake position rewards")?;
    Ok(())
}

pub async fn claim_rewards(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    amount: &Money,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE stake_positions
           SET rewards_accrued = rewards_accrued - $2, rewards_claimed = rewards_claimed + $2
           WHERE id = $1"#,
    )
    .bind(id)
    .bind(amount)
    .execute(&mut **tx)
    .await
    .wrap_err("Failed to record stake position reward claim")?;
    Ok(())
}

pub async fn start_cooldown(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    cooldown_ends_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(r#"UPDATE stake_positions SET status = 'unstaking', cooldown_ends_at = $2 WHERE id = $1"#)
        .bind(id)
        .bind(cooldown_ends_at)
        .execute(&mut **tx)
        .await
        .wrap_err("Failed to start stake position cooldown")?;
    Ok(())
}

/// Finalizes a position: marks it COMPLETED and settles `rewards_accrued`
/// still outstanding into `rewards_claimed`, since `rewards_paid` (the
/// position's full accrued balance at finalize time) is credited to
/// `available` as part of the same payout rather than requiring a separate
/// claim.
pub async fn complete_unstake(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    at: DateTime<Utc>,
    rewards_paid: &Money,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE stake_positions
           SET status = 'completed', unstaked_at = $2,
               rewards_claimed = rewards_claimed + $3, rewards_accrued = rewards_accrued - $3
           WHERE id = $1"#,
    )
    .bind(id)
    .bind(at)
    .bind(rewards_paid)
    .execute(&mut **tx)
    .await
    .wrap_err("Failed to complete stake position unstake")?;
    Ok(())
}

pub async fn cancel_stake(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(r#"UPDATE stake_positions SET status = 'cancelled', unstaked_at = $2 WHERE id = $1"#)
        .bind(id)
        .bind(at)
        .execute(&mut **tx)
        .await
        .wrap_err("Failed to cancel stake position")?;
    Ok(())
}
