#![allow(dead_code)]

//! Row types for every table in migrations/. Amounts are `BigDecimal`
//! throughout — the schema stores `NUMERIC(38,18)` and sqlx's bigdecimal
//! feature maps it directly, so unlike the teacher's EVM/Terra deposit rows
//! (which carried amounts as `String` to dodge a sqlx/bigdecimal version
//! conflict) we never round-trip through text.

use crate::types::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub email_verified: bool,
    pub two_factor_enabled: bool,
    pub kyc_status: String,
    pub failed_login_attempts: i32,
    pub is_locked: bool,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub daily_withdrawal_limit_usd: Money,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub refresh_token_hash: String,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub last_active_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct TwoFactorSecret {
    pub user_id: Uuid,
    pub encrypted_secret: Vec<u8>,
    pub nonce: Vec<u8>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct RecoveryCode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code_hash: String,
    pub used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Chain {
    pub id: Uuid,
    pub slug: String,
    pub chain_id: i64,
    pub rpc_endpoint: String,
    pub explorer_url: Option<String>,
    pub confirmations_required: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub chain_id: Uuid,
    pub symbol: String,
    pub decimals: i32,
    pub contract_address: Option<String>,
    pub is_native: bool,
    pub is_active: bool,
    pub price_usd: Money,
}

/// `current_apr` and `apr` elsewhere are whole-percentage decimals (e.g.
/// `12.5000` means 12.5% APR), matching the schema's `NUMERIC(10,4)` columns.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Pool {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub asset_id: Uuid,
    pub pool_type: String,
    pub lock_days: i32,
    pub current_apr: Money,
    pub min_stake: Money,
    pub max_stake: Option<Money>,
    pub total_capacity: Option<Money>,
    pub total_staked: Money,
    pub cooldown_hours: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AprSchedule {
    pub id: Uuid,
    pub pool_id: Uuid,
    pub apr: Money,
    pub effective_from: DateTime<Utc>,
    pub effective_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SystemConfigRow {
    pub key: String,
    pub value: Json,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DepositAddress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub chain_id: Uuid,
    pub address: String,
    pub derivation_path: Option<String>,
    pub derivation_index: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Deposit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub asset_id: Uuid,
    pub chain_id: Uuid,
    pub deposit_address_id: Uuid,
    pub tx_hash: String,
    pub log_index: Option<i32>,
    pub from_address: String,
    pub amount: Money,
    pub block_number: i64,
    pub confirmations: i32,
    pub status: String,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDeposit {
    pub user_id: Uuid,
    pub asset_id: Uuid,
    pub chain_id: Uuid,
    pub deposit_address_id: Uuid,
    pub tx_hash: String,
    pub log_index: Option<i32>,
    pub from_address: String,
    pub amount: Money,
    pub block_number: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StakePosition {
    pub id: Uuid,
    pub user_id: Uuid,
    pub pool_id: Uuid,
    pub amount: Money,
    pub apr_at_open: Money,
    pub rewards_accrued: Money,
    pub rewards_claimed: Money,
    pub last_reward_calculation: DateTime<Utc>,
    pub status: String,
    pub locked_until: Option<DateTime<Utc>>,
    pub cooldown_ends_at: Option<DateTime<Utc>>,
    pub unstaked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub asset_id: Uuid,
    pub chain_id: Uuid,
    pub amount: Money,
    pub fee: Money,
    pub net_amount: Money,
    pub destination_address: String,
    pub status: String,
    pub user_notes: Option<String>,
    pub admin_notes: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub manual_proof_url: Option<String>,
    pub idempotency_key: String,
    pub fraud_score: i32,
    pub fraud_indicators: Json,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PayoutTx {
    pub withdrawal_request_id: Uuid,
    pub tx_hash: Option<String>,
    pub nonce: Option<i64>,
    pub gas_used: Option<Money>,
    pub status: String,
    pub confirmations: i32,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub attempts: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct TreasuryWallet {
    pub id: Uuid,
    pub chain_id: Uuid,
    pub address: String,
    pub label: Option<String>,
    pub encrypted_private_key: Vec<u8>,
    pub nonce: Vec<u8>,
    pub is_active: bool,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AddressWhitelistEntry {
    pub user_id: Uuid,
    pub chain_id: Uuid,
    pub address: String,
    pub label: Option<String>,
    pub cooldown_ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LedgerEntryRow {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub asset_id: Uuid,
    pub chain_id: Uuid,
    pub entry_type: String,
    pub direction: String,
    pub amount: Money,
    pub balance_after: Option<Money>,
    pub reference_type: String,
    pub reference_id: Uuid,
    pub metadata: Json,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, Default)]
pub struct BalanceCacheRow {
    pub user_id: Uuid,
    pub asset_id: Uuid,
    pub chain_id: Uuid,
    pub available: Money,
    pub staked: Money,
    pub rewards_accrued: Money,
    pub withdrawals_pending: Money,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AuditLogRow {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub actor_email: Option<String>,
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub before: Option<Json>,
    pub after: Option<Json>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notif_type: String,
    pub title: String,
    pub message: String,
    pub data: Json,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub queue_name: String,
    pub payload: Json,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_after: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
