//! # Metadata Resolver
//!
//! Cache-aside resolution of token and pair records: in-memory cache, then
//! the relational store (preloaded at startup), then live on-chain calls,
//! persisting newly discovered records write-through. Concurrent resolutions
//! of the same unseen address coalesce into a single on-chain call.
//!
//! Pools whose two underlying tokens include no reference-set member are
//! classified invalid and negatively cached, so a busy foreign pool never
//! costs more than one round of on-chain calls.

use crate::chain::ChainClient;
use crate::errors::{ChainError, ResolveError};
use crate::store::SwapStore;
use crate::types::{Pair, Token};
use chrono::Utc;
use ethers::types::Address;
use moka::future::Cache;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

const CACHE_CAPACITY: u64 = 1_000_000;

#[derive(Debug, Clone)]
enum PairEntry {
    Valid(Pair),
    /// No reference token on either side, or not a pool at all.
    Invalid,
}

pub struct MetadataResolver {
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn SwapStore>,
    reference: Arc<HashSet<Address>>,
    factory: Address,
    tokens: Cache<Address, Token>,
    pairs: Cache<Address, PairEntry>,
}

impl std::fmt::Debug for MetadataResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataResolver")
            .field("reference", &self.reference.len())
            .field("tokens_cached", &self.tokens.entry_count())
            .field("pairs_cached", &self.pairs.entry_count())
            .finish()
    }
}

impl MetadataResolver {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn SwapStore>,
        reference_tokens: &[Address],
        factory: Address,
    ) -> Self {
        Self {
            chain,
            store,
            reference: Arc::new(reference_tokens.iter().copied().collect()),
            factory,
            tokens: Cache::builder().max_capacity(CACHE_CAPACITY).build(),
            pairs: Cache::builder().max_capacity(CACHE_CAPACITY).build(),
        }
    }

    /// Preloads both caches from the store. The store is the system of
    /// record; the caches are a read-through/write-through accelerator.
    pub async fn warm(&self) -> Result<(), ResolveError> {
        let tokens = self.store.load_tokens().await?;
        let pairs = self.store.load_pairs().await?;
        let (token_count, pair_count) = (tokens.len(), pairs.len());
        for token in tokens {
            self.tokens.insert(token.addr, token).await;
        }
        for pair in pairs {
            self.pairs.insert(pair.addr, PairEntry::Valid(pair)).await;
        }
        info!(
            target: "resolver",
            tokens = token_count,
            pairs = pair_count,
            "warmed metadata caches from store"
        );
        Ok(())
    }

    /// Resolves a token by address, discovering and persisting it on first
    /// sight. An address that does not answer the ERC-20 interface yields
    /// `ResolveError::Unresolvable`.
    pub async fn resolve_token(&self, addr: Address) -> Result<Token, ResolveError> {
        let chain = self.chain.clone();
        let store = self.store.clone();
        self.tokens
            .try_get_with(addr, async move {
                let (name, symbol, decimals) = match chain.token_metadata(addr).await {
                    Ok(meta) => meta,
                    Err(ChainError::Call { reason, .. }) => {
                        debug!(target: "resolver", addr = %format!("{addr:#x}"), %reason, "token metadata call failed");
                        return Err(ResolveError::Unresolvable(addr));
                    }
                    Err(e) => return Err(ResolveError::Chain(e)),
                };
                let token = Token {
                    addr,
                    decimals,
                    name,
                    symbol,
                    first_seen: Utc::now(),
                };
                store.insert_token(&token).await?;
                debug!(
                    target: "resolver",
                    addr = %format!("{addr:#x}"),
                    symbol = %token.symbol,
                    decimals = token.decimals,
                    "discovered token"
                );
                Ok(token)
            })
            .await
            .map_err(ResolveError::Coalesced)
    }

    /// Resolves a pool by address. `Ok(None)` means the address is not a
    /// pool this engine prices: either it lacks a reference-token side, or
    /// it does not implement the pool interface. Both outcomes are cached.
    pub async fn resolve_pair(&self, addr: Address) -> Result<Option<Pair>, ResolveError> {
        let chain = self.chain.clone();
        let store = self.store.clone();
        let reference = self.reference.clone();
        let entry = self
            .pairs
            .try_get_with(addr, async move {
                let (token0, token1, factory_addr) = match chain.pair_metadata(addr).await {
                    Ok(meta) => meta,
                    Err(ChainError::Call { reason, .. }) => {
                        debug!(target: "resolver", addr = %format!("{addr:#x}"), %reason, "not a pool; caching as invalid");
                        return Ok(PairEntry::Invalid);
                    }
                    Err(e) => return Err(ResolveError::Chain(e)),
                };

                let (lp_addr, token_addr) = if reference.contains(&token0) {
                    (token0, token1)
                } else if reference.contains(&token1) {
                    (token1, token0)
                } else {
                    debug!(
                        target: "resolver",
                        addr = %format!("{addr:#x}"),
                        "pool has no reference-token side; caching as invalid"
                    );
                    return Ok(PairEntry::Invalid);
                };

                let pair = Pair {
                    addr,
                    token_addr,
                    lp_addr,
                    factory_addr,
                };
                store.insert_pair(&pair).await?;
                debug!(
                    target: "resolver",
                    addr = %format!("{addr:#x}"),
                    token = %format!("{token_addr:#x}"),
                    lp = %format!("{lp_addr:#x}"),
                    "discovered pair"
                );
                Ok(PairEntry::Valid(pair))
            })
            .await
            .map_err(ResolveError::Coalesced)?;

        Ok(match entry {
            PairEntry::Valid(pair) => Some(pair),
            PairEntry::Invalid => None,
        })
    }

    /// Resolves the pool holding the two tokens via the factory registry.
    pub async fn resolve_pair_by_tokens(
        &self,
        a: Address,
        b: Address,
    ) -> Result<Option<Pair>, ResolveError> {
        let pair_addr = self.chain.pair_for_tokens(self.factory, a, b).await?;
        if pair_addr.is_zero() {
            warn!(
                target: "resolver",
                a = %format!("{a:#x}"),
                b = %format!("{b:#x}"),
                "factory has no pool for token pair"
            );
            return Ok(None);
        }
        self.resolve_pair(pair_addr).await
    }
}
