#![allow(dead_code)]

//! Shared newtypes used across the ledger, auth, and chain layers.

use bigdecimal::BigDecimal;
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// All monetary amounts are arbitrary-precision fixed point; never f64.
pub type Money = BigDecimal;

/// EVM address (20 bytes), always rendered and persisted lowercased per spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvmAddress(pub [u8; 20]);

impl EvmAddress {
    /// Parse from a hex string (with or without 0x prefix); does not enforce
    /// checksumming since the platform stores and compares addresses lowercased.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex).map_err(|e| eyre!("invalid hex address: {e}"))?;
        if bytes.len() != 20 {
            return Err(eyre!("address must be 20 bytes, got {}", bytes.len()));
        }
        let mut result = [0u8; 20];
        result.copy_from_slice(&bytes);
        Ok(EvmAddress(result))
    }

    /// Validate against the spec's `^0x[a-fA-F0-9]{40}$` shape without allocating.
    pub fn is_well_formed(raw: &str) -> bool {
        raw.len() == 42
            && raw.starts_with("0x")
            && raw[2..].chars().all(|c| c.is_ascii_hexdigit())
    }

    pub fn as_lowercase_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_lowercase_hex())
    }
}

/// Role ordering per spec §4.5: `USER < SUPPORT < ADMIN < SUPER_ADMIN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum Role {
    User,
    Support,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Support => "support",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "support" => Some(Role::Support),
            "admin" => Some(Role::Admin),
            "super_admin" | "superadmin" => Some(Role::SuperAdmin),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ledger entry direction (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "credit",
            Direction::Debit => "debit",
        }
    }
}

/// Ledger entry types and their fixed direction, per the §4.3 table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEntryType {
    DepositConfirmed,
    StakeCreated,
    UnstakeCompleted,
    RewardAccrued,
    RewardClaimed,
    WithdrawalRequested,
    WithdrawalRejected,
    WithdrawalPaid,
    Adjustment,
    StakeCancelled,
}

impl LedgerEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryType::DepositConfirmed => "deposit_confirmed",
            LedgerEntryType::StakeCreated => "stake_created",
            LedgerEntryType::UnstakeCompleted => "unstake_completed",
            LedgerEntryType::RewardAccrued => "reward_accrued",
            LedgerEntryType::RewardClaimed => "reward_claimed",
            LedgerEntryType::WithdrawalRequested => "withdrawal_requested",
            LedgerEntryType::WithdrawalRejected => "withdrawal_rejected",
            LedgerEntryType::WithdrawalPaid => "withdrawal_paid",
            LedgerEntryType::Adjustment => "adjustment",
            LedgerEntryType::StakeCancelled => "stake_cancelled",
        }
    }

    /// Fixed CREDIT/DEBIT direction for every type except ADJUSTMENT, which
    /// an admin chooses explicitly at the call site.
    pub fn fixed_direction(&self) -> Option<Direction> {
        use LedgerEntryType::*;
        match self {
            DepositConfirmed | UnstakeCompleted | RewardAccrued | RewardClaimed
            | WithdrawalRejected | StakeCancelled => Some(Direction::Credit),
            StakeCreated | WithdrawalRequested | WithdrawalPaid => Some(Direction::Debit),
            Adjustment => None,
        }
    }
}

impl fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(Role::User < Role::Support);
        assert!(Role::Support < Role::Admin);
        assert!(Role::Admin < Role::SuperAdmin);
    }

    #[test]
    fn test_role_is_admin() {
        assert!(!Role::User.is_admin());
        assert!(!Role::Support.is_admin());
        assert!(Role::Admin.is_admin());
        assert!(Role::SuperAdmin.is_admin());
    }

    #[test]
    fn test_evm_address_from_hex() {
        let addr = EvmAddress::from_hex("0xdead000000000000000000000000000000000000").unwrap();
        assert_eq!(addr.0[0], 0xde);
        assert_eq!(addr.0[1], 0xad);
    }

    #[test]
    fn test_evm_address_from_hex_without_prefix() {
        let addr = EvmAddress::from_hex("dead000000000000000000000000000000000000").unwrap();
        assert_eq!(addr.0[0], 0xde);
    }

    #[test]
    fn test_evm_address_invalid_length() {
        assert!(EvmAddress::from_hex("0xdead").is_err());
    }

    #[test]
    fn test_evm_address_is_well_formed() {
        assert!(EvmAddress::is_well_formed(
            "0x0000000000000000000000000000000000000001"
        ));
        assert!(!EvmAddress::is_well_formed("0x123"));
        assert!(!EvmAddress::is_well_formed(
            "0x000000000000000000000000000000000000000g"
        ));
    }

    #[test]
    fn test_evm_address_displays_lowercase() {
        let addr = EvmAddress::from_hex("0xDEAD000000000000000000000000000000000000").unwrap();
        assert_eq!(
            addr.to_string(),
            "0xdead000000000000000000000000000000000000"
        );
    }

    #[test]
    fn test_ledger_entry_type_fixed_direction() {
        assert_eq!(
            LedgerEntryType::DepositConfirmed.fixed_direction(),
            Some(Direction::Credit)
        );
        assert_eq!(
            LedgerEntryType::StakeCreated.fixed_direction(),
            Some(Direction::Debit)
        );
        assert_eq!(LedgerEntryType::Adjustment.fixed_direction(), None);
    }
}
