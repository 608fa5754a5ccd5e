//! Staking engine (§4.7): pool catalog reads, position lifecycle
//! (open/accrue/cooldown/unstake/claim/cancel), all wrapped in the
//! `ledger::post` + `balances::apply_delta` pair so a position transition
//! and its ledger entry commit atomically, the same discipline the teacher
//! applies to approval-then-status-update pairs.

use crate::balances::{self, Delta};
use crate::clock::Clock;
use crate::db;
use crate::error::{codes, ApiError, ApiResult};
use crate::ledger::{self, PostEntry};
use crate::types::{LedgerEntryType, Money};
use chrono::{DateTime, Utc};
use eyre::WrapErr;
use sqlx::PgPool;
use uuid::Uuid;

/// Seconds in a 365-day year; APR is always annualized on this basis (§4.7).
const SECONDS_PER_YEAR: i64 = 365 * 24 * 60 * 60;

pub async fn list_pools(pool: &PgPool, active_only: bool) -> ApiResult<Vec<db::Pool>> {
    db::catalog::list_pools(pool, active_only).await.map_err(ApiError::TransientExternal)
}

/// Opens a stake position: validates pool state/limits, debits `available`,
/// credits `staked`, posts STAKE_CREATED.
pub async fn open_stake(
    db: &PgPool,
    clock: &dyn Clock,
    user_id: Uuid,
    pool_id: Uuid,
    asset_id: Uuid,
    chain_id: Uuid,
    amount: Money,
) -> ApiResult<db::StakePosition> {
    let now = clock.now();
    let apr_schedule = db::catalog::find_effective_apr_schedule(db, pool_id, now).await.map_err(ApiError::TransientExternal)?;

    let (position, pool_slug) = db::transaction(db, |tx| {
        let amount = amount.clone();
        let apr_schedule = apr_schedule.clone();
        Box::pin(async move {
            let Some(pool_row) = db::catalog::find_pool_for_update(tx, pool_id).await? else {
                return Err(ApiError::NotFound("pool not found".into()));
            };

            if !pool_row.is_active {
                return Err(ApiError::DomainRejection { code: codes::POOL_INACTIVE, message: "pool is not accepting stakes".into() });
            }
            if amount < pool_row.min_stake {
                return Err(ApiError::DomainRejection { code: codes::STAKE_BELOW_MINIMUM, message: format!("minimum stake is {}", pool_row.min_stake) });
            }
            if let Some(max) = &pool_row.max_stake {
                if &amount > max {
                    return Err(ApiError::DomainRejection { code: codes::STAKE_ABOVE_MAXIMUM, message: format!("maximum stake is {max}") });
                }
            }
            if let Some(capacity) = &pool_row.total_capacity {
                if &(pool_row.total_staked.clone() + &amount) > capacity {
                    return Err(ApiError::DomainRejection { code: codes::POOL_CAPACITY_EXCEEDED, message: "pool capacity exceeded".into() });
                }
            }

            let balance = db::ledger::get_balance_cache_for_update(tx, user_id, asset_id, chain_id).await?;
            if balance.available < amount {
                return Err(ApiError::DomainRejection { code: codes::INSUFFICIENT_BALANCE, message: "insufficient available balance".into() });
            }

            let apr = apr_schedule.map(|s| s.apr).unwrap_or_else(|| pool_row.current_apr.clone());
            let locked_until = (pool_row.lock_days > 0).then(|| now + chrono::Duration::days(pool_row.lock_days as i64));

            let position = db::stakes::insert_stake_position(tx, user_id, pool_id, &amount, &apr, locked_until).await?;

            balances::apply_delta(tx, user_id, asset_id, chain_id, Delta { available: -amount.clone(), staked: amount.clone(), ..Default::default() }).await?;
            db::catalog::adjust_pool_total_staked(tx, pool_id, &amount).await?;

            ledger::post(
                tx,
                PostEntry {
                    user_id: Some(user_id),
                    asset_id,
                    chain_id,
                    entry_type: LedgerEntryType::StakeCreated,
                    direction_override: None,
                    amount,
                    balance_after: None,
                    reference_type: "stake_position",
                    reference_id: position.id,
                    metadata: serde_json::json!({ "pool_id": pool_id }),
                },
            )
            .await?;

            Ok((position, pool_row.slug))
        })
    })
    .await?;

    crate::metrics::record_stake_opened(&pool_slug);
    Ok(position)
}

/// Runs one pass of the reward-accrual worker over positions due for
/// recalculation, following the teacher's watcher-loop idiom of one poll
/// interval per call and `tokio::time::interval` driving the caller.
pub async fn accrue_due_rewards(db: &PgPool, clock: &dyn Clock, batch_size: i64) -> eyre::Result<usize> {
    let due = db::stakes::list_active_for_accrual(db, batch_size).await?;
    let now = clock.now();
    let mut accrued_count = 0;
    let mut failed_count = 0;

    for position in due {
        if let Err(e) = accrue_one(db, &position, now).await {
            tracing::error!(position_id = %position.id, error = %e, "failed to accrue rewards for position");
            failed_count += 1;
            continue;
        }
        accrued_count += 1;
    }
    crate::metrics::record_rewards_accrual_pass(accrued_count, failed_count);
    Ok(accrued_count)
}

async fn accrue_one(db: &PgPool, position: &db::StakePosition, now: DateTime<Utc>) -> eyre::Result<()> {
    let elapsed = (now - position.last_reward_calculation).num_seconds().max(0);
    if elapsed == 0 {
        return Ok(());
    }
    let reward = &position.amount * &position.apr_at_open / Money::from(100)
        * Money::from(elapsed)
        / Money::from(SECONDS_PER_YEAR);
    if reward <= Money::from(0) {
        return Ok(());
    }

    let stake_row = sqlx::query_as::<_, (Uuid, Uuid, Uuid)>(
        "SELECT sp.user_id, p.asset_id, a.chain_id FROM stake_positions sp \
         JOIN pools p ON p.id = sp.pool_id JOIN assets a ON a.id = p.asset_id WHERE sp.id = $1",
    )
    .bind(position.id)
    .fetch_one(db)
    .await
    .wrap_err("failed to resolve asset/chain for stake position")?;
    let (user_id, asset_id, chain_id) = stake_row;

    let position_id = position.id;
    db::transaction(db, |tx| {
        let reward = reward.clone();
        Box::pin(async move {
            db::stakes::accrue_rewards(tx, position_id, &reward, now).await?;
            balances::apply_delta(tx, user_id, asset_id, chain_id, Delta { rewards_accrued: reward.clone(), ..Default::default() }).await?;
            ledger::post(
                tx,
                PostEntry {
                    user_id: Some(user_id),
                    asset_id,
                    chain_id,
                    entry_type: LedgerEntryType::RewardAccrued,
                    direction_override: None,
                    amount: reward,
                    balance_after: None,
                    reference_type: "stake_accrual",
                    reference_id: Uuid::new_v4(),
                    metadata: serde_json::json!({ "position_id": position_id }),
                },
            )
            .await?;
            Ok(())
        })
    })
    .await
}

pub async fn claim_rewards(db: &PgPool, user_id: Uuid, position_id: Uuid) -> ApiResult<Money> {
    db::transaction(db, |tx| {
        Box::pin(async move {
            let Some(position) = db::stakes::find_stake_position_for_update(tx, position_id).await? else {
                return Err(ApiError::NotFound("stake position not found".into()));
            };
            if position.user_id != user_id {
                return Err(ApiError::Forbidden("not your stake position".into()));
            }
            if position.status != "active" {
                return Err(ApiError::DomainRejection { code: codes::POSITION_NOT_ACTIVE, message: "rewards can only be claimed from an active position".into() });
            }
            if position.rewards_accrued <= Money::from(0) {
                return Ok(Money::from(0));
            }

            let (asset_id, chain_id) = asset_chain_for_pool_tx(tx, position.pool_id).await?;
            let amount = position.rewards_accrued.clone();

            db::stakes::claim_rewards(tx, position_id, &amount).await?;
            balances::apply_delta(tx, user_id, asset_id, chain_id, Delta { rewards_accrued: -amount.clone(), available: amount.clone(), ..Default::default() }).await?;
            ledger::post(
                tx,
                PostEntry {
                    user_id: Some(user_id),
                    asset_id,
                    chain_id,
                    entry_type: LedgerEntryType::RewardClaimed,
                    direction_override: None,
                    amount: amount.clone(),
                    balance_after: None,
                    reference_type: "stake_position",
                    reference_id: position_id,
                    metadata: serde_json::json!({}),
                },
            )
            .await?;

            Ok(amount)
        })
    })
    .await
}

/// Starts the unstake cooldown, or — for flexible pools with no cooldown —
/// finalizes the position synchronously in the same call (§4.7:
/// `ACTIVE ──unstake(unlocked, no cooldown)──▶ COMPLETED`). Rejects
/// positions still within their lock period and positions that aren't
/// ACTIVE.
pub async fn request_unstake(db: &PgPool, clock: &dyn Clock, user_id: Uuid, position_id: Uuid) -> ApiResult<db::StakePosition> {
    let now = clock.now();

    let (position, pool_row) = db::transaction(db, |tx| {
        Box::pin(async move {
            let Some(position) = db::stakes::find_stake_position_for_update(tx, position_id).await? else {
                return Err(ApiError::NotFound("stake position not found".into()));
            };
            if position.user_id != user_id {
                return Err(ApiError::Forbidden("not your stake position".into()));
            }
            if position.status != "active" {
                return Err(ApiError::DomainRejection { code: codes::POSITION_NOT_ACTIVE, message: "position is not active".into() });
            }
            if let Some(locked_until) = position.locked_until {
                if now < locked_until {
                    return Err(ApiError::DomainRejection { code: codes::STAKE_LOCKED, message: format!("locked until {locked_until}") });
                }
            }

            let pool_row = db::catalog::find_pool_for_update(tx, position.pool_id).await?.ok_or(ApiError::Fatal)?;

            if pool_row.cooldown_hours == 0 {
                let (asset_id, chain_id) = asset_chain_for_pool_tx(tx, position.pool_id).await?;
                finalize_unstake(tx, &position, asset_id, chain_id, now).await?;
            } else {
                let cooldown_ends_at = now + chrono::Duration::hours(pool_row.cooldown_hours as i64);
                db::stakes::start_cooldown(tx, position_id, cooldown_ends_at).await?;
            }

            let updated = db::stakes::find_stake_position_for_update(tx, position_id).await?.ok_or(ApiError::Fatal)?;
            Ok((updated, pool_row))
        })
    })
    .await?;

    if pool_row.cooldown_hours == 0 {
        crate::metrics::record_cooldown_completed(&pool_row.slug);
    }
    Ok(position)
}

/// Marks a position COMPLETED and pays out principal plus whatever rewards
/// accrued (including through cooldown) in one ledger entry, shared by the
/// zero-cooldown finalize path in [`request_unstake`] and the cooldown
/// sweep below.
async fn finalize_unstake(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    position: &db::StakePosition,
    asset_id: Uuid,
    chain_id: Uuid,
    now: DateTime<Utc>,
) -> eyre::Result<Money> {
    let total_amount = position.amount.clone() + position.rewards_accrued.clone();

    db::stakes::complete_unstake(tx, position.id, now, &position.rewards_accrued).await?;
    db::catalog::adjust_pool_total_staked(tx, position.pool_id, &(-position.amount.clone())).await?;
    balances::apply_delta(
        tx,
        position.user_id,
        asset_id,
        chain_id,
        Delta {
            staked: -position.amount.clone(),
            rewards_accrued: -position.rewards_accrued.clone(),
            available: total_amount.clone(),
            ..Default::default()
        },
    )
    .await?;
    ledger::post(
        tx,
        PostEntry {
            user_id: Some(position.user_id),
            asset_id,
            chain_id,
            entry_type: LedgerEntryType::UnstakeCompleted,
            direction_override: None,
            amount: total_amount.clone(),
            balance_after: None,
            reference_type: "stake_position",
            reference_id: position.id,
            metadata: serde_json::json!({}),
        },
    )
    .await?;
    Ok(total_amount)
}

/// Completes unstakes whose cooldown has elapsed, crediting principal plus
/// accrued rewards back to `available` and posting UNSTAKE_COMPLETED. Run
/// by the same worker loop that drives `accrue_due_rewards`.
pub async fn sweep_completed_cooldowns(db: &PgPool, clock: &dyn Clock) -> eyre::Result<usize> {
    let now = clock.now();
    let ids: Vec<(Uuid,)> =
        sqlx::query_as("SELECT id FROM stake_positions WHERE status = 'unstaking' AND cooldown_ends_at <= $1")
            .bind(now)
            .fetch_all(db)
            .await?;

    let mut completed = 0;
    for (position_id,) in ids {
        let pool_slug: Option<String> = db::transaction(db, |tx| {
            Box::pin(async move {
                let position = db::stakes::find_stake_position_for_update(tx, position_id)
                    .await?
                    .ok_or_else(|| eyre::eyre!("stake position disappeared mid-sweep"))?;
                let (asset_id, chain_id) = asset_chain_for_pool_tx(tx, position.pool_id).await?;
                finalize_unstake(tx, &position, asset_id, chain_id, now).await?;
                let pool_row = db::catalog::find_pool_for_update(tx, position.pool_id).await?;
                Ok(pool_row.map(|p| p.slug))
            })
        })
        .await?;

        if let Some(slug) = pool_slug {
            crate::metrics::record_cooldown_completed(&slug);
        }
        completed += 1;
    }
    Ok(completed)
}

async fn asset_chain_for_pool_tx(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, pool_id: Uuid) -> eyre::Result<(Uuid, Uuid)> {
    let row: (Uuid, Uuid) = sqlx::query_as(
        "SELECT a.id, a.chain_id FROM pools p JOIN assets a ON a.id = p.asset_id WHERE p.id = $1",
    )
    .bind(pool_id)
    .fetch_one(&mut **tx)
    .await
    .wrap_err("failed to resolve asset/chain for pool")?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accrual_is_linear_in_elapsed_time() {
        let amount: Money = "1000".parse().unwrap();
        let apr: Money = "10".parse().unwrap();
        let one_day = amount.clone() * apr.clone() / Money::from(100) * Money::from(86_400) / Money::from(SECONDS_PER_YEAR);
        let two_days = amount * apr / Money::from(100) * Money::from(172_800) / Money::from(SECONDS_PER_YEAR);
        assert_eq!(two_days, one_day * Money::from(2));
    }
}
