//! Withdrawal workflow (§4.8–§4.10): submission, fraud scoring, admin
//! approve/reject, and the PAID transition the payout executor drives.
//! State machine: `pending_review -> approved -> processing -> paid`, or
//! `pending_review -> rejected` at any point before `approved`. Every
//! transition that touches money goes through `ledger::post` +
//! `balances::apply_delta` in the same transaction as the status change.

use crate::balances::{self, Delta};
use crate::clock::Clock;
use crate::config::SecurityConfig;
use crate::db;
use crate::error::{codes, ApiError, ApiResult};
use crate::ledger::{self, PostEntry};
use crate::types::{LedgerEntryType, Money};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Scoring weights from §4.10's fraud-scoring table.
const SCORE_NEW_ADDRESS: i32 = 30;
const SCORE_NEW_ADDRESS_COOLING_DOWN: i32 = 50;
const SCORE_HIGH_AMOUNT: i32 = 20;
const SCORE_HIGH_AMOUNT_VERY_LARGE: i32 = 40;
const SCORE_DAILY_LIMIT: i32 = 50;
const SCORE_VELOCITY: i32 = 40;
const SCORE_VELOCITY_NEAR: i32 = 20;
const SCORE_NEW_ACCOUNT: i32 = 25;
const SCORE_UNVERIFIED_EMAIL: i32 = 15;
/// `fraud_score >= 70` auto-flags for manual review even when an admin
/// would otherwise fast-path the request.
const AUTO_FLAG_THRESHOLD: i32 = 70;
/// A new account is one younger than this.
const NEW_ACCOUNT_AGE: chrono::Duration = chrono::Duration::days(7);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FraudSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize)]
pub struct FraudIndicator {
    #[serde(rename = "type")]
    pub indicator_type: &'static str,
    pub severity: FraudSeverity,
    pub description: String,
    pub score: i32,
}

pub struct FraudAssessment {
    pub score: i32,
    pub indicators: Vec<FraudIndicator>,
}

#[allow(clippy::too_many_arguments)]
fn assess_fraud(
    security: &SecurityConfig,
    now: DateTime<Utc>,
    amount_usd: &Money,
    whitelist_entry: Option<&db::AddressWhitelistEntry>,
    requests_today: i64,
    usd_withdrawn_last_24h: &Money,
    user: &db::User,
) -> FraudAssessment {
    let mut score = 0;
    let mut indicators = Vec::new();
    let mut add = |indicator_type, severity, description: String, weight: i32| {
        score += weight;
        indicators.push(FraudIndicator { indicator_type, severity, description, score: weight });
    };

    match whitelist_entry {
        None => add(
            "NEW_ADDRESS",
            FraudSeverity::Medium,
            "destination address is not on the user's whitelist".into(),
            SCORE_NEW_ADDRESS,
        ),
        Some(entry) if entry.cooldown_ends_at > now => add(
            "NEW_ADDRESS",
            FraudSeverity::High,
            format!("destination address is whitelisted but still cooling down until {}", entry.cooldown_ends_at),
            SCORE_NEW_ADDRESS_COOLING_DOWN,
        ),
        Some(_) => {}
    }

    if amount_usd > &security.large_withdrawal_threshold_usd {
        add(
            "HIGH_AMOUNT",
            FraudSeverity::Medium,
            format!("withdrawal value {amount_usd} USD exceeds the large-withdrawal threshold"),
            SCORE_HIGH_AMOUNT,
        );
    }
    if amount_usd > &user.daily_withdrawal_limit_usd {
        add(
            "HIGH_AMOUNT",
            FraudSeverity::High,
            format!("withdrawal value {amount_usd} USD exceeds the user's daily withdrawal limit on its own"),
            SCORE_HIGH_AMOUNT_VERY_LARGE,
        );
    }

    if usd_withdrawn_last_24h + amount_usd > user.daily_withdrawal_limit_usd {
        add(
            "DAILY_LIMIT",
            FraudSeverity::High,
            "cumulative 24h withdrawal value exceeds the user's daily withdrawal limit".into(),
            SCORE_DAILY_LIMIT,
        );
    }

    if requests_today as u32 >= security.max_daily_withdrawal_requests {
        add(
            "VELOCITY",
            FraudSeverity::High,
            format!("{requests_today} withdrawal requests today meets the daily request limit"),
            SCORE_VELOCITY,
        );
    } else if (requests_today as f64) >= 0.7 * security.max_daily_withdrawal_requests as f64 {
        add(
            "VELOCITY",
            FraudSeverity::Medium,
            format!("{requests_today} withdrawal requests today is approaching the daily request limit"),
            SCORE_VELOCITY_NEAR,
        );
    }

    if now - user.created_at < NEW_ACCOUNT_AGE {
        add("NEW_ACCOUNT", FraudSeverity::Medium, "account was created less than 7 days ago".into(), SCORE_NEW_ACCOUNT);
    }

    if !user.email_verified {
        add("UNVERIFIED_EMAIL", FraudSeverity::Low, "user's email address is not verified".into(), SCORE_UNVERIFIED_EMAIL);
    }

    FraudAssessment { score, indicators }
}

pub struct SubmitWithdrawal {
    pub user_id: Uuid,
    pub asset_id: Uuid,
    pub chain_id: Uuid,
    pub amount: Money,
    pub price_usd: Money,
    pub destination_address: String,
    pub user_notes: Option<String>,
    pub idempotency_key: String,
}

pub async fn submit(
    db: &sqlx::PgPool,
    clock: &dyn Clock,
    security: &SecurityConfig,
    req: SubmitWithdrawal,
) -> ApiResult<db::WithdrawalRequest> {
    if let Some(existing) = db::withdrawals::find_by_idempotency_key(db, &req.idempotency_key)
        .await
        .map_err(ApiError::TransientExternal)?
    {
        return Ok(existing);
    }

    let fee = (&req.amount * Money::from(security.withdrawal_fee_rate_bps)) / Money::from(10_000);
    let fee = fee.max(security.min_withdrawal_fee.clone());
    if req.amount <= fee {
        return Err(ApiError::DomainRejection {
            code: codes::WITHDRAWAL_AMOUNT_TOO_SMALL,
            message: "withdrawal amount does not cover the fee".into(),
        });
    }
    let net_amount = &req.amount - &fee;

    let Some(user) = db::users::find_user_by_id(db, req.user_id).await.map_err(ApiError::TransientExternal)? else {
        return Err(ApiError::NotFound("user not found".into()));
    };
    let whitelisted = db::withdrawals::find_whitelist_entry(db, req.user_id, req.chain_id, &req.destination_address)
        .await
        .map_err(ApiError::TransientExternal)?;
    let requests_today = db::withdrawals::count_requests_today(db, req.user_id).await.map_err(ApiError::TransientExternal)?;
    let usd_withdrawn_last_24h =
        db::withdrawals::sum_usd_withdrawn_last_24h(db, req.user_id).await.map_err(ApiError::TransientExternal)?;

    let amount_usd = &req.amount * &req.price_usd;
    let assessment = assess_fraud(security, clock.now(), &amount_usd, whitelisted.as_ref(), requests_today, &usd_withdrawn_last_24h, &user);
    let cooldown_ends_at = clock.now() + chrono::Duration::hours(security.address_whitelist_cooldown_hours);

    let new_request = db::withdrawals::NewWithdrawalRequest {
        user_id: req.user_id,
        asset_id: req.asset_id,
        chain_id: req.chain_id,
        amount: req.amount.clone(),
        fee,
        net_amount,
        destination_address: &req.destination_address,
        user_notes: req.user_notes.as_deref(),
        idempotency_key: &req.idempotency_key,
        fraud_score: assessment.score,
        fraud_indicators: serde_json::json!(assessment.indicators),
    };

    // Locks the balance row, validates and debits it, inserts the request
    // row, and posts the ledger entry all in one transaction — a withdrawal
    // request never exists without its reservation already taken.
    let withdrawal = db::transaction(db, |tx| {
        let new_request = new_request.clone();
        let amount = req.amount.clone();
        let destination_address = req.destination_address.clone();
        Box::pin(async move {
            let balance = db::ledger::get_balance_cache_for_update(tx, req.user_id, req.asset_id, req.chain_id).await?;
            if balance.available < amount {
                return Err(ApiError::DomainRejection { code: codes::INSUFFICIENT_BALANCE, message: "insufficient available balance".into() });
            }

            let withdrawal = db::withdrawals::insert_withdrawal_request(tx, &new_request).await?;

            balances::apply_delta(tx, req.user_id, req.asset_id, req.chain_id, Delta {
                available: -amount.clone(),
                withdrawals_pending: amount.clone(),
                ..Default::default()
            })
            .await?;

            ledger::post(
                tx,
                PostEntry {
                    user_id: Some(req.user_id),
                    asset_id: req.asset_id,
                    chain_id: req.chain_id,
                    entry_type: LedgerEntryType::WithdrawalRequested,
                    direction_override: None,
                    amount,
                    balance_after: None,
                    reference_type: "withdrawal_request",
                    reference_id: withdrawal.id,
                    metadata: serde_json::json!({}),
                },
            )
            .await?;

            db::withdrawals::upsert_whitelist_entry(tx, req.user_id, req.chain_id, &destination_address, None, cooldown_ends_at).await?;

            Ok(withdrawal)
        })
    })
    .await?;

    crate::metrics::record_withdrawal_submitted(&withdrawal.chain_id.to_string());
    if assessment.score >= AUTO_FLAG_THRESHOLD {
        tracing::warn!(withdrawal_id = %withdrawal.id, score = assessment.score, "withdrawal auto-flagged for manual review");
        crate::metrics::record_withdrawal_auto_flagged(&withdrawal.chain_id.to_string());
    }

    Ok(withdrawal)
}

pub async fn approve(db: &sqlx::PgPool, id: Uuid, reviewed_by: Uuid, admin_notes: Option<&str>) -> ApiResult<()> {
    let admin_notes = admin_notes.map(str::to_owned);
    db::transaction(db, |tx| {
        let admin_notes = admin_notes.clone();
        Box::pin(async move {
            let Some(withdrawal) = db::withdrawals::find_withdrawal_request_for_update(tx, id).await? else {
                return Err(ApiError::NotFound("withdrawal request not found".into()));
            };
            if withdrawal.status != "pending_review" {
                return Err(ApiError::DomainRejection { code: codes::INVALID_STATE_TRANSITION, message: format!("cannot approve from status {}", withdrawal.status) });
            }
            db::withdrawals::approve_withdrawal_request(tx, id, reviewed_by, admin_notes.as_deref()).await?;
            db::withdrawals::upsert_payout_tx_pending(tx, id).await?;
            Ok(())
        })
    })
    .await?;
    if let Err(e) = crate::payout::enqueue_process_payout(db, id).await {
        tracing::error!(withdrawal_id = %id, error = %e, "failed to enqueue payout job after approval");
    }
    crate::metrics::record_withdrawal_reviewed("approved");
    Ok(())
}

/// Rejects a pending request, releasing its reservation back to `available`.
pub async fn reject(db: &sqlx::PgPool, id: Uuid, reviewed_by: Uuid, admin_notes: &str) -> ApiResult<()> {
    let admin_notes = admin_notes.to_owned();
    db::transaction(db, |tx| {
        let admin_notes = admin_notes.clone();
        Box::pin(async move {
            let Some(withdrawal) = db::withdrawals::find_withdrawal_request_for_update(tx, id).await? else {
                return Err(ApiError::NotFound("withdrawal request not found".into()));
            };
            if withdrawal.status != "pending_review" {
                return Err(ApiError::DomainRejection { code: codes::INVALID_STATE_TRANSITION, message: format!("cannot reject from status {}", withdrawal.status) });
            }

            db::withdrawals::reject_withdrawal_request(tx, id, reviewed_by, &admin_notes).await?;
            let outcome = ledger::post(
                tx,
                PostEntry {
                    user_id: Some(withdrawal.user_id),
                    asset_id: withdrawal.asset_id,
                    chain_id: withdrawal.chain_id,
                    entry_type: LedgerEntryType::WithdrawalRejected,
                    direction_override: None,
                    amount: withdrawal.amount.clone(),
                    balance_after: None,
                    reference_type: "withdrawal_request",
                    reference_id: id,
                    metadata: serde_json::json!({}),
                },
            )
            .await?;

            if outcome == ledger::PostOutcome::Posted {
                balances::apply_delta(tx, withdrawal.user_id, withdrawal.asset_id, withdrawal.chain_id, Delta {
                    available: withdrawal.amount.clone(),
                    withdrawals_pending: -withdrawal.amount,
                    ..Default::default()
                })
                .await?;
            }

            Ok(())
        })
    })
    .await?;
    crate::metrics::record_withdrawal_reviewed("rejected");
    Ok(())
}

/// Completes a withdrawal after its on-chain payout confirms: releases the
/// reservation (never crediting `available`, since the funds genuinely
/// left custody) and posts WITHDRAWAL_PAID at the full reserved amount —
/// the non-zero-amount resolution spec.md calls out explicitly (§9).
pub async fn mark_paid(db: &sqlx::PgPool, id: Uuid) -> eyre::Result<()> {
    db::transaction(db, |tx| {
        Box::pin(async move {
            let withdrawal = db::withdrawals::find_withdrawal_request_for_update(tx, id)
                .await?
                .ok_or_else(|| eyre::eyre!("withdrawal request {id} disappeared before mark_paid"))?;

            db::withdrawals::mark_withdrawal_paid(tx, id).await?;
            let outcome = ledger::post(
                tx,
                PostEntry {
                    user_id: Some(withdrawal.user_id),
                    asset_id: withdrawal.asset_id,
                    chain_id: withdrawal.chain_id,
                    entry_type: LedgerEntryType::WithdrawalPaid,
                    direction_override: None,
                    amount: withdrawal.amount.clone(),
                    balance_after: None,
                    reference_type: "withdrawal_request",
                    reference_id: id,
                    metadata: serde_json::json!({}),
                },
            )
            .await?;

            if outcome == ledger::PostOutcome::Posted {
                balances::apply_delta(tx, withdrawal.user_id, withdrawal.asset_id, withdrawal.chain_id, Delta {
                    withdrawals_pending: -withdrawal.amount,
                    ..Default::default()
                })
                .await?;
            }

            Ok(())
        })
    })
    .await
}

/// Admin-driven PAID transition for payouts settled outside the on-chain
/// payout executor (manual bank transfer, etc). Requires the request to
/// already be APPROVED or PROCESSING.
pub async fn mark_paid_manual(db: &sqlx::PgPool, id: Uuid, proof_url: Option<&str>, admin_notes: &str) -> ApiResult<()> {
    let proof_url = proof_url.map(str::to_owned);
    let admin_notes = admin_notes.to_owned();
    db::transaction(db, |tx| {
        let proof_url = proof_url.clone();
        let admin_notes = admin_notes.clone();
        Box::pin(async move {
            let Some(withdrawal) = db::withdrawals::find_withdrawal_request_for_update(tx, id).await? else {
                return Err(ApiError::NotFound("withdrawal request not found".into()));
            };
            if withdrawal.status != "approved" && withdrawal.status != "processing" {
                return Err(ApiError::DomainRejection { code: codes::INVALID_STATE_TRANSITION, message: format!("cannot mark paid from status {}", withdrawal.status) });
            }

            db::withdrawals::mark_withdrawal_paid_manual(tx, id, proof_url.as_deref(), &admin_notes).await?;
            let outcome = ledger::post(
                tx,
                PostEntry {
                    user_id: Some(withdrawal.user_id),
                    asset_id: withdrawal.asset_id,
                    chain_id: withdrawal.chain_id,
                    entry_type: LedgerEntryType::WithdrawalPaid,
                    direction_override: None,
                    amount: withdrawal.amount.clone(),
                    balance_after: None,
                    reference_type: "withdrawal_request",
                    reference_id: id,
                    metadata: serde_json::json!({ "manual": true }),
                },
            )
            .await?;

            if outcome == ledger::PostOutcome::Posted {
                balances::apply_delta(tx, withdrawal.user_id, withdrawal.asset_id, withdrawal.chain_id, Delta {
                    withdrawals_pending: -withdrawal.amount,
                    ..Default::default()
                })
                .await?;
            }

            Ok(())
        })
    })
    .await?;
    crate::metrics::record_withdrawal_reviewed("paid_manual");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn security() -> SecurityConfig {
        SecurityConfig {
            min_withdrawal_fee: "1".parse().unwrap(),
            withdrawal_fee_rate_bps: 10,
            large_withdrawal_threshold_usd: "10000".parse().unwrap(),
            max_daily_withdrawal_requests: 5,
            address_whitelist_cooldown_hours: 24,
        }
    }

    fn old_trusted_user() -> db::User {
        db::User {
            id: Uuid::new_v4(),
            email: "trusted@example.com".into(),
            password_hash: String::new(),
            role: "user".into(),
            email_verified: true,
            two_factor_enabled: false,
            kyc_status: "verified".into(),
            failed_login_attempts: 0,
            is_locked: false,
            locked_until: None,
            created_at: Utc::now() - chrono::Duration::days(365),
            updated_at: Utc::now(),
            last_login_at: None,
            is_active: true,
            daily_withdrawal_limit_usd: "50000".parse().unwrap(),
        }
    }

    #[test]
    fn new_destination_and_large_amount_stack_indicators() {
        let security = security();
        let user = old_trusted_user();
        let amount: Money = "20000".parse().unwrap();
        let assessment = assess_fraud(&security, Utc::now(), &amount, None, 1, &Money::from(0), &user);
        assert_eq!(assessment.score, SCORE_NEW_ADDRESS + SCORE_HIGH_AMOUNT);
        assert!(assessment.indicators.iter().any(|i| i.indicator_type == "NEW_ADDRESS" && i.severity == FraudSeverity::Medium));
        assert!(assessment.indicators.iter().any(|i| i.indicator_type == "HIGH_AMOUNT" && i.severity == FraudSeverity::Medium));
    }

    #[test]
    fn whitelisted_but_still_cooling_down_scores_high_severity() {
        let security = security();
        let user = old_trusted_user();
        let amount: Money = "10".parse().unwrap();
        let entry = db::AddressWhitelistEntry {
            user_id: user.id,
            chain_id: Uuid::new_v4(),
            address: "0xabc".into(),
            label: None,
            cooldown_ends_at: Utc::now() + chrono::Duration::hours(1),
        };
        let assessment = assess_fraud(&security, Utc::now(), &amount, Some(&entry), 0, &Money::from(0), &user);
        assert_eq!(assessment.score, SCORE_NEW_ADDRESS_COOLING_DOWN);
        assert_eq!(assessment.indicators[0].severity, FraudSeverity::High);
    }

    #[test]
    fn clean_request_from_trusted_address_scores_zero() {
        let security = security();
        let user = old_trusted_user();
        let amount: Money = "10".parse().unwrap();
        let entry = db::AddressWhitelistEntry {
            user_id: user.id,
            chain_id: Uuid::new_v4(),
            address: "0xabc".into(),
            label: None,
            cooldown_ends_at: Utc::now() - chrono::Duration::hours(1),
        };
        let assessment = assess_fraud(&security, Utc::now(), &amount, Some(&entry), 0, &Money::from(0), &user);
        assert_eq!(assessment.score, 0);
        assert!(assessment.indicators.is_empty());
    }

    #[test]
    fn new_account_and_unverified_email_add_indicators() {
        let security = security();
        let mut user = old_trusted_user();
        user.created_at = Utc::now() - chrono::Duration::days(1);
        user.email_verified = false;
        let amount: Money = "10".parse().unwrap();
        let entry = db::AddressWhitelistEntry {
            user_id: user.id,
            chain_id: Uuid::new_v4(),
            address: "0xabc".into(),
            label: None,
            cooldown_ends_at: Utc::now() - chrono::Duration::hours(1),
        };
        let assessment = assess_fraud(&security, Utc::now(), &amount, Some(&entry), 0, &Money::from(0), &user);
        assert_eq!(assessment.score, SCORE_NEW_ACCOUNT + SCORE_UNVERIFIED_EMAIL);
    }
}
