//! AMM swap ingestion and price-resolution engine.
//!
//! Tracks the live tip of an EVM chain, pairs each pool's reserve-update
//! (`Sync`) log with the trade (`Swap`) log that immediately follows it,
//! resolves the pair/token metadata needed to interpret the trade, prices
//! it in USD against a fixed set of reference tokens, and persists the
//! enriched record exactly once.

pub mod abi;
pub mod chain;
pub mod config;
pub mod correlator;
pub mod enricher;
pub mod errors;
pub mod ingest;
pub mod listen;
pub mod math;
pub mod oracle;
pub mod resolver;
pub mod store;
pub mod types;
