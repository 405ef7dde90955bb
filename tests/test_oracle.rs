//! Reference-quote maintenance and the startup gate.

mod common;

use amm_swap_indexer::errors::OracleError;
use amm_swap_indexer::oracle::PriceOracle;
use amm_swap_indexer::resolver::MetadataResolver;
use common::*;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

fn oracle_with(
    chain: MockChainClient,
    reference: Vec<ethers::types::Address>,
    pegged: ethers::types::Address,
) -> PriceOracle {
    let chain: Arc<MockChainClient> = Arc::new(chain);
    let factory = addr(99);
    let resolver = Arc::new(MetadataResolver::new(
        chain.clone(),
        Arc::new(MemoryStore::default()),
        &reference,
        factory,
    ));
    PriceOracle::new(chain, resolver, reference, pegged, Duration::from_secs(60))
}

#[tokio::test]
async fn pegged_stable_is_quoted_at_one_without_refresh() {
    let stable = addr(2);
    let oracle = oracle_with(MockChainClient::default(), vec![stable], stable);
    assert_eq!(oracle.quote_of(stable).await.unwrap(), dec!(1));
    oracle.ensure_populated().await.unwrap();
}

#[tokio::test]
async fn refresh_prices_reference_token_via_its_stable_pool() {
    let stable = addr(2);
    let wrapped = addr(3);
    let pool = addr(11);
    let factory = addr(99);

    // stable < wrapped, so the stable sits in slot 0.
    let chain = MockChainClient::default()
        .with_token(stable, "USD", 18)
        .with_token(wrapped, "WNAT", 18)
        .with_pair(pool, stable, wrapped, factory)
        .with_reserves(pool, units(600, 18), units(2, 18));

    let oracle = oracle_with(chain, vec![stable, wrapped], stable);
    oracle.refresh().await;
    oracle.ensure_populated().await.unwrap();

    // 600 stable / 2 wrapped = 300 USD each.
    assert_eq!(oracle.quote_of(wrapped).await.unwrap(), dec!(300));
}

#[tokio::test]
async fn quote_survives_a_failed_refresh() {
    let stable = addr(2);
    let wrapped = addr(3);
    let pool = addr(11);
    let factory = addr(99);

    let chain: Arc<MockChainClient> = Arc::new(
        MockChainClient::default()
            .with_token(stable, "USD", 18)
            .with_token(wrapped, "WNAT", 18)
            .with_pair(pool, stable, wrapped, factory)
            .with_reserves(pool, units(600, 18), units(2, 18)),
    );
    let resolver = Arc::new(MetadataResolver::new(
        chain.clone(),
        Arc::new(MemoryStore::default()),
        &[stable, wrapped],
        factory,
    ));
    let oracle = PriceOracle::new(
        chain.clone(),
        resolver,
        vec![stable, wrapped],
        stable,
        Duration::from_secs(60),
    );

    oracle.refresh().await;
    assert_eq!(oracle.quote_of(wrapped).await.unwrap(), dec!(300));

    // The pool becomes unreadable; the previous quote must be kept.
    chain.clear_reserves();
    oracle.refresh().await;
    assert_eq!(oracle.quote_of(wrapped).await.unwrap(), dec!(300));
}

#[tokio::test]
async fn startup_gate_fails_when_a_reference_token_has_no_pool() {
    let stable = addr(2);
    let orphan = addr(4);

    let chain = MockChainClient::default()
        .with_token(stable, "USD", 18)
        .with_token(orphan, "ORPH", 18);

    let oracle = oracle_with(chain, vec![stable, orphan], stable);
    oracle.refresh().await;

    match oracle.ensure_populated().await {
        Err(OracleError::QuoteUnavailable(a)) => assert_eq!(a, orphan),
        other => panic!("expected QuoteUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_token_has_no_quote() {
    let stable = addr(2);
    let oracle = oracle_with(MockChainClient::default(), vec![stable], stable);
    assert!(matches!(
        oracle.quote_of(addr(7)).await,
        Err(OracleError::QuoteUnavailable(_))
    ));
}
