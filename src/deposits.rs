//! Deposit scanner (§4.6): the generalization of the teacher's
//! `watchers::evm::EvmWatcher` from a bridge-specific `DepositRequest` event
//! to plain ERC-20 `Transfer` events addressed to a chain's allocated
//! `deposit_addresses`. Cursor bookkeeping, poll loop, and finality-block
//! math are kept close to the original: a `system_config` row substitutes
//! for the teacher's dedicated last-block column, and `finality_blocks`
//! plays the same role as `EvmWatcher::finality_blocks`.

use crate::chain::ChainClient;
use crate::clock::Clock;
use crate::db;
use eyre::{Result, WrapErr};
use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

pub struct DepositScanner {
    chain_row_id: Uuid,
    chain_slug: String,
    confirmations_required: u32,
    client: Arc<dyn ChainClient>,
    db: PgPool,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

fn cursor_key(chain_slug: &str) -> String {
    format!("deposit_scan_cursor:{chain_slug}")
}

impl DepositScanner {
    pub fn new(
        chain_row_id: Uuid,
        chain_slug: String,
        confirmations_required: u32,
        client: Arc<dyn ChainClient>,
        db: PgPool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            chain_row_id,
            chain_slug,
            confirmations_required,
            client,
            db,
            clock,
            poll_interval: Duration::from_millis(1000),
        }
    }

    pub async fn run(mut self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        loop {
            tokio::select! {
                result = self.tick() => {
                    if let Err(e) = result {
                        tracing::error!(chain = %self.chain_slug, error = %e, "deposit scanner tick failed, will retry");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!(chain = %self.chain_slug, "deposit scanner shutting down");
                    return Ok(());
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn tick(&mut self) -> Result<()> {
        self.scan_new_transfers().await?;
        self.sweep_confirmations().await?;
        Ok(())
    }

    /// Scans `[last_scanned + 1, current_block - confirmations_required]`
    /// for ERC-20 `Transfer`s into this chain's deposit addresses, the same
    /// "finalized tip" window the teacher's `get_finalized_block` computes.
    async fn scan_new_transfers(&mut self) -> Result<()> {
        let current_block = self.client.current_block().await?;
        let finalized = current_block.saturating_sub(self.confirmations_required as u64);

        let key = cursor_key(&self.chain_slug);
        let cursor = db::catalog::get_system_config(&self.db, &key).await?;
        let last_scanned = cursor.and_then(|v| v.as_u64()).unwrap_or(finalized.saturating_sub(1));

        if last_scanned >= finalized {
            return Ok(());
        }

        let assets = self.active_erc20_assets().await?;
        let watched = self.watched_addresses().await?;
        if watched.is_empty() {
            db::catalog::set_system_config(&self.db, &key, &serde_json::Value::from(finalized)).await?;
            return Ok(());
        }

        for asset in &assets {
            let Some(contract) = &asset.contract_address else { continue };
            let transfers = self
                .client
                .scan_transfers(contract, asset.decimals, last_scanned + 1, finalized, &watched)
                .await
                .wrap_err_with(|| format!("failed to scan transfers for asset {}", asset.symbol))?;

            for transfer in transfers {
                if let Err(e) = self.record_transfer(asset, &transfer).await {
                    tracing::error!(
                        tx_hash = %transfer.tx_hash,
                        error = %e,
                        "failed to record incoming transfer, will be re-scanned next tick since cursor hasn't advanced past it yet"
                    );
                }
            }
        }

        db::catalog::set_system_config(&self.db, &key, &serde_json::Value::from(finalized)).await?;
        Ok(())
    }

    async fn record_transfer(&self, asset: &db::Asset, transfer: &crate::chain::TransferEvent) -> Result<()> {
        if db::deposits::deposit_exists(&self.db, self.chain_row_id, &transfer.tx_hash, Some(transfer.log_index)).await? {
            return Ok(());
        }
        let Some(deposit_address) = self.deposit_address_for(&transfer.to).await? else {
            return Ok(());
        };

        db::deposits::insert_deposit(
            &self.db,
            &db::NewDeposit {
                user_id: deposit_address.user_id,
                asset_id: asset.id,
                chain_id: self.chain_row_id,
                deposit_address_id: deposit_address.id,
                tx_hash: transfer.tx_hash.clone(),
                log_index: Some(transfer.log_index),
                from_address: transfer.from.clone(),
                amount: transfer.amount.clone(),
                block_number: transfer.block_number as i64,
            },
        )
        .await?;
        crate::metrics::record_deposit_detected(&self.chain_slug);
        Ok(())
    }

    /// Advances confirmation counts on deposits already seen, promoting them
    /// to CONFIRMED (and posting the matching ledger entry) once they clear
    /// `confirmations_required` — mirrors `confirmation::evm::EvmConfirmation`'s
    /// receipt-polling loop, generalized from approval txs to deposits.
    async fn sweep_confirmations(&self) -> Result<()> {
        let pending = db::deposits::list_awaiting_confirmation(&self.db, self.chain_row_id).await?;
        crate::metrics::set_deposits_awaiting_confirmation(&self.chain_slug, pending.len() as i64);
        let current_block = self.client.current_block().await?;

        for deposit in pending {
            let confirmations = current_block.saturating_sub(deposit.block_number as u64) as i32;
            if confirmations < self.confirmations_required as i32 {
                db::deposits::update_deposit_confirmations(&self.db, deposit.id, confirmations).await?;
                continue;
            }

            let (deposit_id, user_id, asset_id, chain_id, amount) =
                (deposit.id, deposit.user_id, deposit.asset_id, deposit.chain_id, deposit.amount.clone());
            db::transaction(&self.db, |tx| {
                let amount = amount.clone();
                Box::pin(async move {
                    db::deposits::mark_deposit_confirmed(tx, deposit_id, confirmations).await?;
                    crate::ledger::post_deposit_confirmed(tx, user_id, asset_id, chain_id, deposit_id, &amount).await
                })
            })
            .await?;
            crate::metrics::record_deposit_confirmed(&self.chain_slug);

            tracing::info!(
                deposit_id = %deposit.id,
                user_id = %deposit.user_id,
                amount = %deposit.amount,
                at = %self.clock.now(),
                "deposit confirmed"
            );
        }
        Ok(())
    }

    async fn active_erc20_assets(&self) -> Result<Vec<db::Asset>> {
        let row: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM assets WHERE chain_id = $1 AND is_active AND NOT is_native")
            .bind(self.chain_row_id)
            .fetch_all(&self.db)
            .await
            .wrap_err("failed to list active assets")?;
        let mut assets = Vec::with_capacity(row.len());
        for (id,) in row {
            if let Some(asset) = db::catalog::find_asset(&self.db, id).await? {
                assets.push(asset);
            }
        }
        Ok(assets)
    }

    async fn watched_addresses(&self) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT address FROM deposit_addresses WHERE chain_id = $1")
            .bind(self.chain_row_id)
            .fetch_all(&self.db)
            .await
            .wrap_err("failed to list deposit addresses")?;
        Ok(rows.into_iter().map(|(a,)| a).collect())
    }

    async fn deposit_address_for(&self, address: &str) -> Result<Option<db::DepositAddress>> {
        let row: Option<(Uuid, Uuid)> =
            sqlx::query_as("SELECT id, user_id FROM deposit_addresses WHERE chain_id = $1 AND address = $2")
                .bind(self.chain_row_id)
                .bind(address)
                .fetch_optional(&self.db)
                .await
                .wrap_err("failed to look up deposit address")?;
        let Some((id, user_id)) = row else { return Ok(None) };
        db::deposits::find_deposit_address_by_id(&self.db, id, user_id).await
    }
}
