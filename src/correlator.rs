//! # Swap Correlator
//!
//! Scans one block's ordered sync/swap logs for the adjacency pattern a
//! pool emits on every trade: its reserve-update log immediately followed,
//! in the same transaction, by the trade log. Candidates failing any
//! validation rule are dropped quietly; one corrupt or foreign-protocol
//! log must never abort the rest of the block.

use crate::abi::{SWAP_TOPIC, SYNC_TOPIC};
use crate::resolver::MetadataResolver;
use ethers::types::{Address, Log};
use std::sync::Arc;
use tracing::debug;

/// A validated reserve-update/trade log pair for a single swap.
#[derive(Debug, Clone)]
pub struct CorrelatedPair {
    pub sync: Log,
    pub swap: Log,
}

#[derive(Debug)]
pub struct SwapCorrelator {
    resolver: Arc<MetadataResolver>,
    factory: Address,
}

fn is_sync(log: &Log) -> bool {
    log.topics.first() == Some(&*SYNC_TOPIC)
}

fn is_swap(log: &Log) -> bool {
    log.topics.first() == Some(&*SWAP_TOPIC)
}

impl SwapCorrelator {
    pub fn new(resolver: Arc<MetadataResolver>, factory: Address) -> Self {
        Self { resolver, factory }
    }

    /// Produces the block's validated log pairs in block order. Input logs
    /// must be ordered by log index; reorg-removed logs are filtered here.
    pub async fn correlate(&self, logs: &[Log]) -> Vec<CorrelatedPair> {
        let mut sets = Vec::new();
        let mut pending_sync: Option<&Log> = None;

        for log in logs.iter().filter(|l| l.removed != Some(true)) {
            if is_sync(log) {
                // A sync with no adjacent swap is discarded, not an error.
                // Two reserve-updates with no trade between them belong to
                // a composite liquidity event; neither is attributable to a
                // single trade, so both are dropped.
                pending_sync = match pending_sync {
                    Some(_) => None,
                    None => Some(log),
                };
            } else if is_swap(log) {
                if let Some(sync) = pending_sync.take() {
                    if self.is_valid_set(sync, log).await {
                        sets.push(CorrelatedPair {
                            sync: sync.clone(),
                            swap: log.clone(),
                        });
                    }
                }
            }
        }

        sets
    }

    /// All rules must hold: same transaction, strict log-index adjacency,
    /// same emitting pool, and the pool belongs to the expected factory.
    async fn is_valid_set(&self, sync: &Log, swap: &Log) -> bool {
        let (Some(sync_tx), Some(swap_tx)) = (sync.transaction_hash, swap.transaction_hash)
        else {
            return false;
        };
        if sync_tx != swap_tx {
            return false;
        }

        let (Some(sync_idx), Some(swap_idx)) = (sync.log_index, swap.log_index) else {
            return false;
        };
        if swap_idx != sync_idx + ethers::types::U256::one() {
            debug!(
                target: "correlator",
                tx = %format!("{swap_tx:#x}"),
                sync_idx = sync_idx.as_u64(),
                swap_idx = swap_idx.as_u64(),
                "non-adjacent sync/swap logs; dropping candidate"
            );
            return false;
        }

        if sync.address != swap.address {
            return false;
        }

        let pair = match self.resolver.resolve_pair(swap.address).await {
            Ok(Some(pair)) => pair,
            Ok(None) => return false,
            Err(e) => {
                debug!(target: "correlator", error = %e, "pair resolution failed; dropping candidate");
                return false;
            }
        };

        if pair.factory_addr != self.factory {
            debug!(
                target: "correlator",
                pair = %format!("{:#x}", pair.addr),
                factory = %format!("{:#x}", pair.factory_addr),
                "pool from foreign factory; dropping candidate"
            );
            return false;
        }

        true
    }
}
