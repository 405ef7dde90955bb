//! # Price Oracle
//!
//! Maintains current USD quotes for the fixed reference-token set. The
//! pegged stablecoin is quoted at 1.0 by configuration; every other
//! reference token is priced against the stablecoin through its factory
//! pool. Quotes refresh on a timer for the lifetime of the process.
//!
//! Startup is gated: one synchronous refresh must leave every reference
//! quote populated before ingestion may begin, because an unpriced
//! reference token would make every downstream swap price meaningless.

use crate::chain::ChainClient;
use crate::errors::OracleError;
use crate::math;
use crate::resolver::MetadataResolver;
use ethers::types::Address;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::RwLock;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct PriceOracle {
    chain: Arc<dyn ChainClient>,
    resolver: Arc<MetadataResolver>,
    reference_tokens: Vec<Address>,
    pegged_stable: Address,
    refresh_interval: Duration,
    quotes: RwLock<HashMap<Address, Decimal>>,
}

impl std::fmt::Debug for PriceOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceOracle")
            .field("reference_tokens", &self.reference_tokens.len())
            .field("pegged_stable", &self.pegged_stable)
            .finish()
    }
}

impl PriceOracle {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        resolver: Arc<MetadataResolver>,
        reference_tokens: Vec<Address>,
        pegged_stable: Address,
        refresh_interval: Duration,
    ) -> Self {
        let mut quotes = HashMap::new();
        quotes.insert(pegged_stable, Decimal::ONE);
        Self {
            chain,
            resolver,
            reference_tokens,
            pegged_stable,
            refresh_interval,
            quotes: RwLock::new(quotes),
        }
    }

    /// Recomputes the quote of every non-pegged reference token. A failure
    /// for one token keeps its previous quote and never blocks the others.
    pub async fn refresh(&self) {
        for &addr in &self.reference_tokens {
            if addr == self.pegged_stable {
                continue;
            }
            match self.compute_quote(addr).await {
                Ok(quote) => {
                    debug!(target: "oracle", token = %format!("{addr:#x}"), %quote, "reference quote updated");
                    self.quotes.write().await.insert(addr, quote);
                }
                Err(e) => {
                    warn!(target: "oracle", token = %format!("{addr:#x}"), error = %e, "reference quote refresh failed");
                }
            }
        }
    }

    /// USD price of one reference token via its pool against the pegged
    /// stablecoin, read from live reserves.
    async fn compute_quote(&self, addr: Address) -> Result<Decimal, OracleError> {
        let token = self.resolver.resolve_token(addr).await?;
        let stable = self.resolver.resolve_token(self.pegged_stable).await?;
        let pair = self
            .resolver
            .resolve_pair_by_tokens(addr, self.pegged_stable)
            .await?
            .ok_or(OracleError::NoReferencePair(addr))?;

        let (reserve0, reserve1) = self.chain.reserves(pair.addr).await?;
        let (token_pos, _stable_pos) = math::token_positions(token.addr, stable.addr);
        let (token_reserve, stable_reserve, token_dec, stable_dec) = if token_pos == 0 {
            (reserve0, reserve1, token.decimals, stable.decimals)
        } else {
            (reserve1, reserve0, token.decimals, stable.decimals)
        };

        // price of the token in stablecoin units = stable_reserve / token_reserve
        let (price_in_stable, _) = math::ratios(token_reserve, stable_reserve, token_dec, stable_dec)?;
        Ok(price_in_stable)
    }

    /// Last computed quote for a reference token.
    pub async fn quote_of(&self, addr: Address) -> Result<Decimal, OracleError> {
        self.quotes
            .read()
            .await
            .get(&addr)
            .copied()
            .ok_or(OracleError::QuoteUnavailable(addr))
    }

    /// Hard startup gate: every configured reference token must carry a
    /// quote, otherwise ingestion must not start.
    pub async fn ensure_populated(&self) -> Result<(), OracleError> {
        let quotes = self.quotes.read().await;
        for &addr in &self.reference_tokens {
            if !quotes.contains_key(&addr) {
                return Err(OracleError::QuoteUnavailable(addr));
            }
        }
        info!(target: "oracle", tokens = self.reference_tokens.len(), "all reference quotes populated");
        Ok(())
    }

    /// Timer-driven background refresh until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; the startup refresh already ran.
        ticker.tick().await;
        loop {
            select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(target: "oracle", "refresh loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.refresh().await;
                }
            }
        }
    }
}
