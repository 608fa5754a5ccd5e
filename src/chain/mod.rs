//! Chain abstraction (§4.2): one EVM JSON-RPC chain per `Chain` row, behind a
//! trait so the scanner, accrual worker, and payout executor don't each
//! re-derive their own provider plumbing. The teacher mixes an `alloy`
//! provider (log queries) with hand-rolled `reqwest` JSON-RPC (receipts);
//! `AlloyChainClient` keeps both, since they serve different needs here too.

pub mod evm;

pub use evm::AlloyChainClient;

use async_trait::async_trait;
use eyre::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub tx_hash: String,
    pub log_index: i32,
    pub block_number: u64,
    pub from: String,
    pub to: String,
    pub amount: bigdecimal::BigDecimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Pending,
    Success,
    Reverted,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn current_block(&self) -> Result<u64>;

    /// ERC-20 `Transfer` logs for `contract` between `from_block` and
    /// `to_block` inclusive, filtered to transfers addressed `to` one of
    /// `watched` — native-asset deposit observation is a reserved extension
    /// point, not implemented here (§9). `decimals` is the asset's on-chain
    /// decimal places; returned amounts are human units (raw log value
    /// divided by `10^decimals`), not raw token-smallest-unit integers.
    async fn scan_transfers(
        &self,
        contract: &str,
        decimals: i32,
        from_block: u64,
        to_block: u64,
        watched: &std::collections::HashSet<String>,
    ) -> Result<Vec<TransferEvent>>;

    async fn receipt_status(&self, tx_hash: &str) -> Result<(ReceiptStatus, Option<u64>)>;

    /// Sends a plain value transfer (native asset) or ERC-20 `transfer`
    /// (when `contract` is `Some`) from the treasury signer, returning the
    /// broadcast tx hash and the nonce it was sent with. `amount` is in
    /// human units and is scaled up by `10^decimals` before being placed
    /// on the wire.
    async fn send_payout(
        &self,
        private_key_hex: &str,
        contract: Option<&str>,
        decimals: i32,
        to: &str,
        amount: &bigdecimal::BigDecimal,
    ) -> Result<(String, u64)>;
}
