//! # Ingestion Loop
//!
//! Drives per-block processing off the listener's block-number channel:
//! fetch the block with transactions and its sync/swap logs, correlate,
//! then enrich each validated pair in log order. A failure in one block or
//! one swap is logged and skipped; the loop itself only stops on shutdown.

use crate::chain::ChainClient;
use crate::correlator::SwapCorrelator;
use crate::enricher::SwapEnricher;
use crate::errors::ChainError;
use ethers::types::H256;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct Ingestor {
    chain: Arc<dyn ChainClient>,
    correlator: SwapCorrelator,
    enricher: SwapEnricher,
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor").finish()
    }
}

impl Ingestor {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        correlator: SwapCorrelator,
        enricher: SwapEnricher,
    ) -> Self {
        Self {
            chain,
            correlator,
            enricher,
        }
    }

    /// Consumes block numbers until the channel closes or shutdown.
    pub async fn run(&self, mut block_rx: mpsc::Receiver<u64>, cancel: CancellationToken) {
        loop {
            select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(target: "ingest", "shutdown signal received");
                    return;
                }
                number = block_rx.recv() => {
                    let Some(number) = number else {
                        info!(target: "ingest", "block channel closed");
                        return;
                    };
                    match self.process_block(number).await {
                        Ok(swaps) if swaps > 0 => {
                            info!(target: "ingest", block = number, swaps, "block processed");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(target: "ingest", block = number, error = %e, "block processing failed; skipping");
                        }
                    }
                }
            }
        }
    }

    /// Processes one block to completion. Safe to call again for the same
    /// block: swap persistence is idempotent on `(tx_hash, log_idx)`.
    pub async fn process_block(&self, number: u64) -> Result<usize, ChainError> {
        let Some(block) = self.chain.block_with_transactions(number).await? else {
            warn!(target: "ingest", block = number, "block not found");
            return Ok(0);
        };
        let logs = self.chain.sync_swap_logs(number).await?;
        let sets = self.correlator.correlate(&logs).await;
        if sets.is_empty() {
            return Ok(0);
        }

        let transactions_by_hash: HashMap<H256, &ethers::types::Transaction> = block
            .transactions
            .iter()
            .map(|tx| (tx.hash, tx))
            .collect();

        let mut enriched = 0usize;
        for set in &sets {
            let transaction = set
                .swap
                .transaction_hash
                .and_then(|hash| transactions_by_hash.get(&hash).copied());
            match self.enricher.enrich(set, &block, transaction).await {
                Ok(Some(_)) => enriched += 1,
                Ok(None) => {}
                Err(e) => {
                    // Data problems (zero reserves, decode failures) are loud
                    // but never abort the rest of the block.
                    error!(target: "ingest", block = number, error = %e, "swap enrichment failed");
                }
            }
        }

        Ok(enriched)
    }
}
