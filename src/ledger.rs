//! Invariant-preserving wrapper around `db::ledger` (§4.3). Every credit or
//! debit the rest of the platform wants to record goes through `post`, never
//! through `db::ledger::insert_ledger_entry` directly, so the one-shot
//! dedup behavior documented there is enforced in exactly one place.

use crate::db;
use crate::types::{Direction, LedgerEntryType, Money};
use eyre::{Result, WrapErr};
use serde_json::Value as Json;
use sqlx::Postgres;
use uuid::Uuid;

pub struct PostEntry {
    pub user_id: Option<Uuid>,
    pub asset_id: Uuid,
    pub chain_id: Uuid,
    pub entry_type: LedgerEntryType,
    /// Required only for ADJUSTMENT, whose direction an admin chooses
    /// explicitly; every other entry type's direction is fixed and this
    /// field is ignored if supplied.
    pub direction_override: Option<Direction>,
    pub amount: Money,
    pub balance_after: Option<Money>,
    pub reference_type: &'static str,
    pub reference_id: Uuid,
    pub metadata: Json,
}

/// Outcome of a post attempt, letting callers distinguish a fresh write from
/// an idempotent replay without treating the latter as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    Posted,
    AlreadyPosted,
}

/// Posts a ledger entry within `tx`. One-shot entry types (every type except
/// ADJUSTMENT) rely on `idx_ledger_one_shot`; a unique-violation here means
/// this reference was already posted by a previous attempt (e.g. a retried
/// job) and is treated as success, not propagated as an error.
pub async fn post(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    entry: PostEntry,
) -> Result<PostOutcome> {
    let direction = entry
        .entry_type
        .fixed_direction()
        .or(entry.direction_override)
        .ok_or_else(|| eyre::eyre!("ADJUSTMENT entries require an explicit direction"))?;

    let result = db::ledger::insert_ledger_entry(
        tx,
        db::ledger::NewLedgerEntry {
            user_id: entry.user_id,
            asset_id: entry.asset_id,
            chain_id: entry.chain_id,
            entry_type: entry.entry_type.as_str(),
            direction,
            amount: entry.amount,
            balance_after: entry.balance_after,
            reference_type: entry.reference_type,
            reference_id: entry.reference_id,
            metadata: entry.metadata,
        },
    )
    .await;

    match result {
        Ok(_) => {
            crate::metrics::record_ledger_entry_posted(entry.entry_type.as_str());
            Ok(PostOutcome::Posted)
        }
        Err(e) => {
            if is_unique_violation(&e) {
                tracing::debug!(
                    entry_type = entry.entry_type.as_str(),
                    reference_id = %entry.reference_id,
                    "ledger entry already posted for this reference, treating as idempotent replay"
                );
                Ok(PostOutcome::AlreadyPosted)
            } else {
                Err(e).wrap_err("Failed to post ledger entry")
            }
        }
    }
}

fn is_unique_violation(err: &eyre::Error) -> bool {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<sqlx::Error>())
        .and_then(|sqlx_err| sqlx_err.as_database_error())
        .is_some_and(|db_err| db_err.code().as_deref() == Some("23505"))
}

/// Posts the DEPOSIT_CONFIRMED entry and updates the balance cache in the
/// same transaction, so a deposit is either fully reflected or not at all.
/// The reference id is the deposit row's own id, which is what makes
/// re-running a confirmation sweep against an already-confirmed deposit
/// idempotent.
pub async fn post_deposit_confirmed(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    user_id: Uuid,
    asset_id: Uuid,
    chain_id: Uuid,
    deposit_id: Uuid,
    amount: &Money,
) -> Result<PostOutcome> {
    let outcome = post(
        tx,
        PostEntry {
            user_id: Some(user_id),
            asset_id,
            chain_id,
            entry_type: LedgerEntryType::DepositConfirmed,
            direction_override: None,
            amount: amount.clone(),
            balance_after: None,
            reference_type: "deposit",
            reference_id: deposit_id,
            metadata: serde_json::json!({}),
        },
    )
    .await?;

    if outcome == PostOutcome::Posted {
        crate::balances::apply_delta(tx, user_id, asset_id, chain_id, crate::balances::Delta {
            available: amount.clone(),
            ..Default::default()
        })
        .await?;
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjustment_requires_explicit_direction() {
        let entry = PostEntry {
            user_id: None,
            asset_id: Uuid::nil(),
            chain_id: Uuid::nil(),
            entry_type: LedgerEntryType::Adjustment,
            direction_override: None,
            amount: "1".parse().unwrap(),
            balance_after: None,
            reference_type: "adjustment",
            reference_id: Uuid::nil(),
            metadata: serde_json::json!({}),
        };
        assert!(entry
            .entry_type
            .fixed_direction()
            .or(entry.direction_override)
            .is_none());
    }
}
