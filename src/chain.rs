//! # Chain Client
//!
//! A thin, typed abstraction over the node's JSON-RPC API: block and log
//! retrieval plus the handful of read-only contract calls the resolver and
//! oracle need. Application logic (metadata classification, pricing) lives
//! above this seam so tests can substitute a mock.

use crate::abi::{AmmFactory, AmmPair, Erc20Token, SWAP_TOPIC, SYNC_TOPIC};
use crate::errors::ChainError;
use async_trait::async_trait;
use ethers::contract::ContractError;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, Block, Filter, Log, Transaction, ValueOrArray, U256};
use std::sync::Arc;

#[async_trait]
pub trait ChainClient: Send + Sync + std::fmt::Debug {
    /// Fetch a block with full transaction bodies.
    async fn block_with_transactions(
        &self,
        number: u64,
    ) -> Result<Option<Block<Transaction>>, ChainError>;

    /// Fetch the block's logs scoped to the sync/swap event topics.
    async fn sync_swap_logs(&self, number: u64) -> Result<Vec<Log>, ChainError>;

    /// `name()`, `symbol()`, `decimals()` of an ERC-20 token.
    async fn token_metadata(&self, addr: Address) -> Result<(String, String, u8), ChainError>;

    /// `token0()`, `token1()`, `factory()` of a pool.
    async fn pair_metadata(
        &self,
        addr: Address,
    ) -> Result<(Address, Address, Address), ChainError>;

    /// Factory lookup of the pool holding the two tokens; zero address when
    /// no such pool exists.
    async fn pair_for_tokens(
        &self,
        factory: Address,
        a: Address,
        b: Address,
    ) -> Result<Address, ChainError>;

    /// Current raw reserves of a pool, in slot order.
    async fn reserves(&self, pair: Address) -> Result<(U256, U256), ChainError>;
}

/// Production implementation over an HTTP provider.
#[derive(Debug, Clone)]
pub struct EvmChainClient {
    provider: Arc<Provider<Http>>,
}

impl EvmChainClient {
    pub fn new(http_url: &str) -> Result<Self, ChainError> {
        let provider = Provider::<Http>::try_from(http_url)
            .map_err(|e| ChainError::Provider(e.to_string()))?;
        Ok(Self {
            provider: Arc::new(provider),
        })
    }
}

/// Separates transport failures (transient, safe to retry) from contract
/// failures (the address does not implement the expected interface).
fn classify<M: Middleware>(addr: Address, err: ContractError<M>) -> ChainError {
    match err {
        ContractError::MiddlewareError { e } => ChainError::Provider(e.to_string()),
        ContractError::ProviderError { e } => ChainError::Provider(e.to_string()),
        other => ChainError::Call {
            addr,
            reason: other.to_string(),
        },
    }
}

#[async_trait]
impl ChainClient for EvmChainClient {
    async fn block_with_transactions(
        &self,
        number: u64,
    ) -> Result<Option<Block<Transaction>>, ChainError> {
        self.provider
            .get_block_with_txs(number)
            .await
            .map_err(|e| ChainError::Provider(e.to_string()))
    }

    async fn sync_swap_logs(&self, number: u64) -> Result<Vec<Log>, ChainError> {
        let filter = Filter::new()
            .from_block(number)
            .to_block(number)
            .topic0(ValueOrArray::Array(vec![*SYNC_TOPIC, *SWAP_TOPIC]));
        self.provider
            .get_logs(&filter)
            .await
            .map_err(|e| ChainError::Provider(e.to_string()))
    }

    async fn token_metadata(&self, addr: Address) -> Result<(String, String, u8), ChainError> {
        let token = Erc20Token::new(addr, self.provider.clone());
        let name = token.name().call().await.map_err(|e| classify(addr, e))?;
        let symbol = token.symbol().call().await.map_err(|e| classify(addr, e))?;
        let decimals = token
            .decimals()
            .call()
            .await
            .map_err(|e| classify(addr, e))?;
        Ok((name, symbol, decimals))
    }

    async fn pair_metadata(
        &self,
        addr: Address,
    ) -> Result<(Address, Address, Address), ChainError> {
        let pair = AmmPair::new(addr, self.provider.clone());
        let token0 = pair.token_0().call().await.map_err(|e| classify(addr, e))?;
        let token1 = pair.token_1().call().await.map_err(|e| classify(addr, e))?;
        let factory = pair.factory().call().await.map_err(|e| classify(addr, e))?;
        Ok((token0, token1, factory))
    }

    async fn pair_for_tokens(
        &self,
        factory: Address,
        a: Address,
        b: Address,
    ) -> Result<Address, ChainError> {
        let contract = AmmFactory::new(factory, self.provider.clone());
        contract
            .get_pair(a, b)
            .call()
            .await
            .map_err(|e| classify(factory, e))
    }

    async fn reserves(&self, pair: Address) -> Result<(U256, U256), ChainError> {
        let contract = AmmPair::new(pair, self.provider.clone());
        let (reserve0, reserve1, _) = contract
            .get_reserves()
            .call()
            .await
            .map_err(|e| classify(pair, e))?;
        Ok((U256::from(reserve0), U256::from(reserve1)))
    }
}
