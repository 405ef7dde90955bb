//! # Swap Enricher
//!
//! Turns a validated sync/swap log pair, its block and its transaction into
//! a fully priced [`Swap`] record and writes it idempotently. All USD and
//! price intermediates are arbitrary-precision decimals; the natural key
//! `(tx_hash, log_idx)` makes redelivered blocks harmless.

use crate::abi::{SwapFilter, SyncFilter};
use crate::correlator::CorrelatedPair;
use crate::errors::EnrichError;
use crate::math;
use crate::oracle::PriceOracle;
use crate::resolver::MetadataResolver;
use crate::store::SwapStore;
use crate::types::{Side, Swap};
use ethers::abi::RawLog;
use ethers::contract::EthLogDecode;
use ethers::types::{Block, Log, Transaction, U256};
use ethers::utils::format_units;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SwapEnricher {
    resolver: Arc<MetadataResolver>,
    oracle: Arc<PriceOracle>,
    store: Arc<dyn SwapStore>,
}

impl std::fmt::Debug for SwapEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapEnricher").finish()
    }
}

fn raw(log: &Log) -> RawLog {
    RawLog {
        topics: log.topics.clone(),
        data: log.data.to_vec(),
    }
}

/// Gwei-denominated decimal form of a raw wei amount.
fn to_gwei(value: U256) -> Result<Decimal, EnrichError> {
    let text = format_units(value, "gwei").map_err(|e| EnrichError::Decode(e.to_string()))?;
    Decimal::from_str(&text).map_err(|e| EnrichError::Decode(e.to_string()))
}

impl SwapEnricher {
    pub fn new(
        resolver: Arc<MetadataResolver>,
        oracle: Arc<PriceOracle>,
        store: Arc<dyn SwapStore>,
    ) -> Self {
        Self {
            resolver,
            oracle,
            store,
        }
    }

    /// Enriches and persists one validated log pair. `Ok(None)` means the
    /// swap was skipped (unresolvable metadata, missing transaction); the
    /// caller continues with the next pair either way.
    pub async fn enrich(
        &self,
        set: &CorrelatedPair,
        block: &Block<Transaction>,
        transaction: Option<&Transaction>,
    ) -> Result<Option<Swap>, EnrichError> {
        let Some(transaction) = transaction else {
            warn!(target: "enricher", "trade log has no matching transaction in block; skipping");
            return Ok(None);
        };

        let sync_event = SyncFilter::decode_log(&raw(&set.sync))
            .map_err(|e| EnrichError::Decode(e.to_string()))?;
        let swap_event = SwapFilter::decode_log(&raw(&set.swap))
            .map_err(|e| EnrichError::Decode(e.to_string()))?;

        let pair_addr = set.swap.address;
        let pair = match self.resolver.resolve_pair(pair_addr).await {
            Ok(Some(pair)) => pair,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(target: "enricher", error = %e, "pair unresolvable; skipping swap");
                return Ok(None);
            }
        };

        let (token, lp_token) = match (
            self.resolver.resolve_token(pair.token_addr).await,
            self.resolver.resolve_token(pair.lp_addr).await,
        ) {
            (Ok(token), Ok(lp_token)) => (token, lp_token),
            (Err(e), _) | (_, Err(e)) => {
                warn!(target: "enricher", error = %e, "token unresolvable; skipping swap");
                return Ok(None);
            }
        };

        let (token_pos, lp_pos) = math::token_positions(token.addr, lp_token.addr);
        let reserves = [
            U256::from(sync_event.reserve_0),
            U256::from(sync_event.reserve_1),
        ];
        let token_reserve = math::to_decimal(reserves[token_pos], token.decimals)?;
        let lp_reserve = math::to_decimal(reserves[lp_pos], lp_token.decimals)?;
        if token_reserve.is_zero() {
            return Err(EnrichError::Math(crate::errors::MathError::ZeroReserve));
        }

        let lp_price_usd = self.oracle.quote_of(lp_token.addr).await?;
        let token_price_usd = lp_reserve / token_reserve * lp_price_usd;
        let lp_reserve_usd = lp_reserve * lp_price_usd;

        let amounts_in = [swap_event.amount_0_in, swap_event.amount_1_in];
        let amounts_out = [swap_event.amount_0_out, swap_event.amount_1_out];
        let token_amount_in = math::to_decimal(amounts_in[token_pos], token.decimals)?;
        let token_amount_out = math::to_decimal(amounts_out[token_pos], token.decimals)?;
        let lp_amount_in = math::to_decimal(amounts_in[lp_pos], lp_token.decimals)?;
        let lp_amount_out = math::to_decimal(amounts_out[lp_pos], lp_token.decimals)?;

        // Reference-side outbound zero means the priced token flowed out of
        // the pool to the trader: a BUY of the token. Otherwise a SELL.
        let side = if lp_amount_out.is_zero() {
            Side::Buy
        } else {
            Side::Sell
        };

        let tx_hash = set
            .swap
            .transaction_hash
            .ok_or_else(|| EnrichError::Decode("trade log missing transaction hash".into()))?;
        let log_idx = set
            .swap
            .log_index
            .ok_or_else(|| EnrichError::Decode("trade log missing log index".into()))?
            .as_u64();
        let block_number = block
            .number
            .ok_or_else(|| EnrichError::Decode("block missing number".into()))?
            .as_u64();

        let swap = Swap {
            block_number,
            tx_hash,
            log_idx,

            pair_addr: pair.addr,
            token_addr: token.addr,
            lp_addr: lp_token.addr,

            gas_price: to_gwei(transaction.gas_price.unwrap_or_default())?,
            gas_limit: to_gwei(transaction.gas)?,

            tx_from: transaction.from,
            tx_to: transaction.to,
            swap_sender: swap_event.sender,
            swap_to: swap_event.to,

            side,

            lp_reserve_usd,

            token_in_usd: token_amount_in * token_price_usd,
            token_out_usd: token_amount_out * token_price_usd,
            lp_in_usd: lp_amount_in * lp_price_usd,
            lp_out_usd: lp_amount_out * lp_price_usd,

            token_price_usd,
            lp_price_usd,

            timestamp: block.timestamp.as_u64(),
        };

        let inserted = self.store.insert_swap(&swap).await?;
        if inserted {
            debug!(
                target: "enricher",
                tx = %format!("{tx_hash:#x}"),
                log_idx,
                side = %swap.side,
                price = %swap.token_price_usd,
                "persisted swap"
            );
        } else {
            debug!(
                target: "enricher",
                tx = %format!("{tx_hash:#x}"),
                log_idx,
                "duplicate swap; already persisted"
            );
        }

        Ok(Some(swap))
    }
}
