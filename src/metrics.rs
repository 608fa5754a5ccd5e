//! Prometheus metrics for the custodial staking backend.
//!
//! Served at `/metrics` by the Axum handler in `api.rs` — one process, one
//! port, no separate raw-socket listener to keep alive at shutdown.

#![allow(dead_code)]

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec, CounterVec,
    Gauge, GaugeVec, HistogramVec,
};

lazy_static! {
    // Deposit ingestion
    pub static ref DEPOSITS_DETECTED: CounterVec = register_counter_vec!(
        "custodial_deposits_detected_total",
        "Total number of on-chain deposit events detected",
        &["chain"]
    ).unwrap();

    pub static ref DEPOSITS_CONFIRMED: CounterVec = register_counter_vec!(
        "custodial_deposits_confirmed_total",
        "Total number of deposits that reached the confirmation threshold",
        &["chain"]
    ).unwrap();

    pub static ref DEPOSITS_AWAITING_CONFIRMATION: GaugeVec = register_gauge_vec!(
        "custodial_deposits_awaiting_confirmation",
        "Deposits currently awaiting or accumulating confirmations",
        &["chain"]
    ).unwrap();

    // Staking engine
    pub static ref STAKES_OPENED: CounterVec = register_counter_vec!(
        "custodial_stakes_opened_total",
        "Total number of stake positions opened",
        &["pool"]
    ).unwrap();

    pub static ref REWARDS_ACCRUED: CounterVec = register_counter_vec!(
        "custodial_rewards_accrued_total",
        "Stake positions processed by a reward accrual pass",
        &["outcome"]
    ).unwrap();

    pub static ref COOLDOWNS_COMPLETED: CounterVec = register_counter_vec!(
        "custodial_cooldowns_completed_total",
        "Total number of unstake cooldowns swept to completion",
        &["pool"]
    ).unwrap();

    // Withdrawal workflow
    pub static ref WITHDRAWALS_SUBMITTED: CounterVec = register_counter_vec!(
        "custodial_withdrawals_submitted_total",
        "Total number of withdrawal requests submitted",
        &["chain"]
    ).unwrap();

    pub static ref WITHDRAWALS_REVIEWED: CounterVec = register_counter_vec!(
        "custodial_withdrawals_reviewed_total",
        "Total number of admin review decisions",
        &["decision"]
    ).unwrap();

    pub static ref WITHDRAWALS_AUTO_FLAGGED: CounterVec = register_counter_vec!(
        "custodial_withdrawals_auto_flagged_total",
        "Withdrawal requests whose fraud score crossed the auto-flag threshold",
        &["chain"]
    ).unwrap();

    pub static ref PAYOUTS_BROADCAST: CounterVec = register_counter_vec!(
        "custodial_payouts_broadcast_total",
        "Total number of payout broadcast attempts",
        &["chain", "status"]
    ).unwrap();

    pub static ref PAYOUTS_PENDING: GaugeVec = register_gauge_vec!(
        "custodial_payouts_pending",
        "Approved withdrawals waiting on the payout executor",
        &["chain"]
    ).unwrap();

    // Ledger / balance integrity
    pub static ref LEDGER_ENTRIES_POSTED: CounterVec = register_counter_vec!(
        "custodial_ledger_entries_posted_total",
        "Total number of ledger entries posted",
        &["entry_type"]
    ).unwrap();

    pub static ref BALANCE_RECONCILE_DRIFT: Gauge = register_gauge!(
        "custodial_balance_reconcile_drift",
        "Rows where the last reconciliation pass found balance_cache diverged from the ledger replay"
    ).unwrap();

    // Auth
    pub static ref LOGIN_ATTEMPTS: CounterVec = register_counter_vec!(
        "custodial_login_attempts_total",
        "Total number of login attempts",
        &["outcome"]
    ).unwrap();

    pub static ref ACCOUNTS_LOCKED: Gauge = register_gauge!(
        "custodial_accounts_locked_total",
        "Total number of accounts locked out from repeated failed logins"
    ).unwrap();

    // Background job queue
    pub static ref JOB_QUEUE_DEPTH: GaugeVec = register_gauge_vec!(
        "custodial_job_queue_depth",
        "Pending jobs per queue",
        &["queue"]
    ).unwrap();

    pub static ref JOBS_PROCESSED: CounterVec = register_counter_vec!(
        "custodial_jobs_processed_total",
        "Total number of jobs dequeued and processed",
        &["queue", "outcome"]
    ).unwrap();

    // Request latency, labeled by route so a slow admin endpoint doesn't get
    // lost in the noise of high-volume user-facing ones.
    pub static ref REQUEST_LATENCY: HistogramVec = register_histogram_vec!(
        "custodial_request_latency_seconds",
        "HTTP request latency",
        &["route", "status"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    ).unwrap();

    pub static ref UP: Gauge = register_gauge!(
        "custodial_up",
        "Whether the backend process is up and serving traffic"
    ).unwrap();
}

pub fn record_deposit_detected(chain: &str) {
    DEPOSITS_DETECTED.with_label_values(&[chain]).inc();
}

pub fn record_deposit_confirmed(chain: &str) {
    DEPOSITS_CONFIRMED.with_label_values(&[chain]).inc();
}

pub fn set_deposits_awaiting_confirmation(chain: &str, count: i64) {
    DEPOSITS_AWAITING_CONFIRMATION.with_label_values(&[chain]).set(count as f64);
}

pub fn record_stake_opened(pool_slug: &str) {
    STAKES_OPENED.with_label_values(&[pool_slug]).inc();
}

pub fn record_rewards_accrual_pass(positions_updated: usize, positions_failed: usize) {
    REWARDS_ACCRUED.with_label_values(&["succeeded"]).inc_by(positions_updated as f64);
    REWARDS_ACCRUED.with_label_values(&["failed"]).inc_by(positions_failed as f64);
}

pub fn record_cooldown_completed(pool_slug: &str) {
    COOLDOWNS_COMPLETED.with_label_values(&[pool_slug]).inc();
}

pub fn record_withdrawal_submitted(chain: &str) {
    WITHDRAWALS_SUBMITTED.with_label_values(&[chain]).inc();
}

pub fn record_withdrawal_reviewed(decision: &str) {
    WITHDRAWALS_REVIEWED.with_label_values(&[decision]).inc();
}

pub fn record_withdrawal_auto_flagged(chain: &str) {
    WITHDRAWALS_AUTO_FLAGGED.with_label_values(&[chain]).inc();
}

pub fn record_payout_broadcast(chain: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    PAYOUTS_BROADCAST.with_label_values(&[chain, status]).inc();
}

pub fn set_payouts_pending(chain: &str, count: i64) {
    PAYOUTS_PENDING.with_label_values(&[chain]).set(count as f64);
}

pub fn record_ledger_entry_posted(entry_type: &str) {
    LEDGER_ENTRIES_POSTED.with_label_values(&[entry_type]).inc();
}

pub fn set_balance_reconcile_drift(drifted_rows: usize) {
    BALANCE_RECONCILE_DRIFT.set(drifted_rows as f64);
}

pub fn record_login_attempt(outcome: &str) {
    LOGIN_ATTEMPTS.with_label_values(&[outcome]).inc();
}

pub fn record_account_locked() {
    ACCOUNTS_LOCKED.inc();
}

pub fn set_job_queue_depth(queue: &str, depth: i64) {
    JOB_QUEUE_DEPTH.with_label_values(&[queue]).set(depth as f64);
}

pub fn record_job_processed(queue: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    JOBS_PROCESSED.with_label_values(&[queue, outcome]).inc();
}

pub fn record_request(route: &str, status: u16, seconds: f64) {
    REQUEST_LATENCY.with_label_values(&[route, &status.to_string()]).observe(seconds);
}
