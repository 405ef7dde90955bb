//! Core domain types: tokens, pairs and enriched swaps.

use chrono::{DateTime, Utc};
use ethers::types::{Address, H256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An ERC-20 token, created on first resolution and immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub addr: Address,
    pub decimals: u8,
    pub name: String,
    pub symbol: String,
    pub first_seen: DateTime<Utc>,
}

/// A constant-product pool whose `lp_addr` side is a member of the
/// reference-token set and whose `token_addr` side is the priced token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pair {
    pub addr: Address,
    pub token_addr: Address,
    pub lp_addr: Address,
    pub factory_addr: Address,
}

/// Directional classification of a swap relative to the non-reference token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

/// A fully enriched swap record. Natural key is `(tx_hash, log_idx)`;
/// written exactly once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Swap {
    pub block_number: u64,
    pub tx_hash: H256,
    pub log_idx: u64,

    pub pair_addr: Address,
    pub token_addr: Address,
    pub lp_addr: Address,

    /// Gas price of the enclosing transaction, in gwei.
    pub gas_price: Decimal,
    /// Gas limit of the enclosing transaction, in gwei.
    pub gas_limit: Decimal,

    pub tx_from: Address,
    pub tx_to: Option<Address>,
    pub swap_sender: Address,
    pub swap_to: Address,

    pub side: Side,

    pub lp_reserve_usd: Decimal,

    pub token_in_usd: Decimal,
    pub token_out_usd: Decimal,
    pub lp_in_usd: Decimal,
    pub lp_out_usd: Decimal,

    pub token_price_usd: Decimal,
    pub lp_price_usd: Decimal,

    /// Block timestamp, seconds since epoch.
    pub timestamp: u64,
}

/// Lowercase `0x`-prefixed text form used at every store boundary.
pub fn fmt_addr(addr: &Address) -> String {
    format!("{addr:#x}")
}

/// Lowercase `0x`-prefixed text form of a transaction hash.
pub fn fmt_hash(hash: &H256) -> String {
    format!("{hash:#x}")
}
