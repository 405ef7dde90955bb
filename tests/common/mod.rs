//! Shared test harness: a scripted chain client, an in-memory store and
//! builders for blocks, transactions and sync/swap logs.

#![allow(dead_code)]

use amm_swap_indexer::abi::{SWAP_TOPIC, SYNC_TOPIC};
use amm_swap_indexer::chain::ChainClient;
use amm_swap_indexer::errors::{ChainError, StoreError};
use amm_swap_indexer::store::SwapStore;
use amm_swap_indexer::types::{Pair, Swap, Token};
use async_trait::async_trait;
use ethers::abi::{encode, Token as AbiToken};
use ethers::types::{Address, Block, Log, Transaction, H256, U256};
use std::collections::HashMap;
use std::sync::Mutex;

pub fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub fn hash(n: u64) -> H256 {
    H256::from_low_u64_be(n)
}

pub fn units(n: u64, decimals: u32) -> U256 {
    U256::from(n) * U256::exp10(decimals as usize)
}

fn addr_topic(a: Address) -> H256 {
    let mut topic = H256::zero();
    topic.0[12..].copy_from_slice(a.as_bytes());
    topic
}

pub fn sync_log(pair: Address, tx: H256, idx: u64, block: u64, reserve0: U256, reserve1: U256) -> Log {
    Log {
        address: pair,
        topics: vec![*SYNC_TOPIC],
        data: encode(&[AbiToken::Uint(reserve0), AbiToken::Uint(reserve1)]).into(),
        block_number: Some(block.into()),
        transaction_hash: Some(tx),
        log_index: Some(idx.into()),
        removed: Some(false),
        ..Default::default()
    }
}

#[allow(clippy::too_many_arguments)]
pub fn swap_log(
    pair: Address,
    tx: H256,
    idx: u64,
    block: u64,
    sender: Address,
    to: Address,
    amounts_in: (U256, U256),
    amounts_out: (U256, U256),
) -> Log {
    Log {
        address: pair,
        topics: vec![*SWAP_TOPIC, addr_topic(sender), addr_topic(to)],
        data: encode(&[
            AbiToken::Uint(amounts_in.0),
            AbiToken::Uint(amounts_in.1),
            AbiToken::Uint(amounts_out.0),
            AbiToken::Uint(amounts_out.1),
        ])
        .into(),
        block_number: Some(block.into()),
        transaction_hash: Some(tx),
        log_index: Some(idx.into()),
        removed: Some(false),
        ..Default::default()
    }
}

pub fn block(number: u64, timestamp: u64, transactions: Vec<Transaction>) -> Block<Transaction> {
    Block {
        number: Some(number.into()),
        timestamp: timestamp.into(),
        transactions,
        ..Default::default()
    }
}

pub fn transaction(tx: H256, from: Address, to: Address, gas_price_gwei: u64, gas: u64) -> Transaction {
    Transaction {
        hash: tx,
        from,
        to: Some(to),
        gas: U256::from(gas),
        gas_price: Some(U256::from(gas_price_gwei) * U256::exp10(9)),
        ..Default::default()
    }
}

/// A chain client scripted entirely from in-memory maps.
#[derive(Debug, Default)]
pub struct MockChainClient {
    pub blocks: HashMap<u64, Block<Transaction>>,
    pub logs: HashMap<u64, Vec<Log>>,
    /// addr -> (name, symbol, decimals)
    pub tokens: HashMap<Address, (String, String, u8)>,
    /// pair addr -> (token0, token1, factory)
    pub pair_meta: HashMap<Address, (Address, Address, Address)>,
    /// unordered token pair -> pool addr
    pub factory_pairs: HashMap<(Address, Address), Address>,
    /// pool addr -> (reserve0, reserve1); mutable so tests can break the
    /// chain between refreshes
    pub reserves: Mutex<HashMap<Address, (U256, U256)>>,
}

impl MockChainClient {
    pub fn with_token(mut self, addr: Address, symbol: &str, decimals: u8) -> Self {
        self.tokens
            .insert(addr, (symbol.to_string(), symbol.to_string(), decimals));
        self
    }

    pub fn with_pair(
        mut self,
        pair: Address,
        token0: Address,
        token1: Address,
        factory: Address,
    ) -> Self {
        self.pair_meta.insert(pair, (token0, token1, factory));
        self.factory_pairs.insert((token0, token1), pair);
        self
    }

    pub fn with_reserves(self, pair: Address, reserve0: U256, reserve1: U256) -> Self {
        self.reserves.lock().unwrap().insert(pair, (reserve0, reserve1));
        self
    }

    /// Simulates the pool becoming unreadable (for example a dead node).
    pub fn clear_reserves(&self) {
        self.reserves.lock().unwrap().clear();
    }

    pub fn with_block(mut self, b: Block<Transaction>, logs: Vec<Log>) -> Self {
        let number = b.number.expect("block number").as_u64();
        self.blocks.insert(number, b);
        self.logs.insert(number, logs);
        self
    }
}

fn not_a_contract(addr: Address) -> ChainError {
    ChainError::Call {
        addr,
        reason: "execution reverted".to_string(),
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn block_with_transactions(
        &self,
        number: u64,
    ) -> Result<Option<Block<Transaction>>, ChainError> {
        Ok(self.blocks.get(&number).cloned())
    }

    async fn sync_swap_logs(&self, number: u64) -> Result<Vec<Log>, ChainError> {
        Ok(self.logs.get(&number).cloned().unwrap_or_default())
    }

    async fn token_metadata(&self, addr: Address) -> Result<(String, String, u8), ChainError> {
        self.tokens
            .get(&addr)
            .cloned()
            .ok_or_else(|| not_a_contract(addr))
    }

    async fn pair_metadata(
        &self,
        addr: Address,
    ) -> Result<(Address, Address, Address), ChainError> {
        self.pair_meta
            .get(&addr)
            .copied()
            .ok_or_else(|| not_a_contract(addr))
    }

    async fn pair_for_tokens(
        &self,
        _factory: Address,
        a: Address,
        b: Address,
    ) -> Result<Address, ChainError> {
        Ok(self
            .factory_pairs
            .get(&(a, b))
            .or_else(|| self.factory_pairs.get(&(b, a)))
            .copied()
            .unwrap_or_else(Address::zero))
    }

    async fn reserves(&self, pair: Address) -> Result<(U256, U256), ChainError> {
        self.reserves
            .lock()
            .unwrap()
            .get(&pair)
            .copied()
            .ok_or_else(|| not_a_contract(pair))
    }
}

/// In-memory store with the same duplicate-tolerant semantics as Postgres.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tokens: Mutex<Vec<Token>>,
    pairs: Mutex<Vec<Pair>>,
    swaps: Mutex<Vec<Swap>>,
}

impl MemoryStore {
    pub fn swaps(&self) -> Vec<Swap> {
        self.swaps.lock().unwrap().clone()
    }

    pub fn pairs(&self) -> Vec<Pair> {
        self.pairs.lock().unwrap().clone()
    }

    pub fn tokens(&self) -> Vec<Token> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl SwapStore for MemoryStore {
    async fn load_tokens(&self) -> Result<Vec<Token>, StoreError> {
        Ok(self.tokens())
    }

    async fn load_pairs(&self) -> Result<Vec<Pair>, StoreError> {
        Ok(self.pairs())
    }

    async fn insert_token(&self, token: &Token) -> Result<(), StoreError> {
        let mut tokens = self.tokens.lock().unwrap();
        if !tokens.iter().any(|t| t.addr == token.addr) {
            tokens.push(token.clone());
        }
        Ok(())
    }

    async fn insert_pair(&self, pair: &Pair) -> Result<(), StoreError> {
        let mut pairs = self.pairs.lock().unwrap();
        if !pairs.iter().any(|p| p.addr == pair.addr) {
            pairs.push(pair.clone());
        }
        Ok(())
    }

    async fn insert_swap(&self, swap: &Swap) -> Result<bool, StoreError> {
        let mut swaps = self.swaps.lock().unwrap();
        if swaps
            .iter()
            .any(|s| s.tx_hash == swap.tx_hash && s.log_idx == swap.log_idx)
        {
            return Ok(false);
        }
        swaps.push(swap.clone());
        Ok(true)
    }
}
