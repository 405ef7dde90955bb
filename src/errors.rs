//! # Centralized Error Handling
//!
//! Hierarchical, typed errors for the whole engine. Each component owns its
//! own error enum; `IndexerError` is the top-level roll-up used by `main`.
//!
//! Propagation policy: per-log and per-swap failures never escape the block
//! they occurred in; connectivity failures surface only as reconnect/retry
//! signals. The only fatal paths are configuration, store pool creation,
//! listener retry exhaustion and the startup quote gate.

use ethers::types::Address;
use std::sync::Arc;
use thiserror::Error;

/// Top-level error type for the ingestion engine.
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("listener error: {0}")]
    Listener(#[from] ListenerError),
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),
    #[error("metadata error: {0}")]
    Resolve(#[from] ResolveError),
    #[error("system shut down")]
    Shutdown,
}

/// Errors from the WebSocket block subscription and its keep-alive probe.
#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("connection timed out")]
    ConnectTimeout,
    #[error("block stream ended")]
    StreamEnded,
    #[error("keep-alive probe failed: {0}")]
    Probe(String),
    #[error("keep-alive probe timed out")]
    ProbeTimeout,
    #[error("block channel closed")]
    ChannelClosed,
    #[error("gave up after {0} reconnect attempts")]
    RetriesExhausted(u32),
}

/// Errors from JSON-RPC queries and contract calls.
#[derive(Error, Debug)]
pub enum ChainError {
    /// Transport-level failure; transient, retried by the caller's own cycle.
    #[error("provider error: {0}")]
    Provider(String),
    /// Contract-level failure (revert, bad interface); permanent for the address.
    #[error("call to {addr:#x} failed: {reason}")]
    Call { addr: Address, reason: String },
}

/// Errors from the relational store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
    #[error("database error: {0}")]
    Db(#[from] tokio_postgres::Error),
    #[error("store configuration error: {0}")]
    Config(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Errors from token/pair metadata resolution.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("metadata unresolvable for {0:#x}")]
    Unresolvable(Address),
    /// Error shared across coalesced in-flight resolutions of one address.
    #[error(transparent)]
    Coalesced(Arc<ResolveError>),
}

impl ResolveError {
    /// True when the address simply does not implement the expected
    /// interface; callers skip the log rather than treating it as a fault.
    pub fn is_unresolvable(&self) -> bool {
        match self {
            Self::Unresolvable(_) => true,
            Self::Coalesced(inner) => inner.is_unresolvable(),
            _ => false,
        }
    }
}

/// Errors from reference-quote maintenance.
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("no quote available for reference token {0:#x}")]
    QuoteUnavailable(Address),
    #[error("no pair against the pegged stable for {0:#x}")]
    NoReferencePair(Address),
    #[error("resolver error: {0}")]
    Resolve(#[from] ResolveError),
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("math error: {0}")]
    Math(#[from] MathError),
}

/// Errors from reserve/price arithmetic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MathError {
    #[error("reserve is zero after decimal scaling")]
    ZeroReserve,
    #[error("value does not fit decimal range: {0}")]
    Overflow(String),
}

/// Errors from enriching a single validated log pair. Always isolated to
/// that one swap.
#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("log decode failed: {0}")]
    Decode(String),
    #[error("math error: {0}")]
    Math(#[from] MathError),
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
