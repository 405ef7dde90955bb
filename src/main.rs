//! Entry point: load configuration, initialise tracing, wire the engine,
//! gate startup on reference-quote population, and run until ctrl-c.

use amm_swap_indexer::{
    chain::EvmChainClient,
    config::Config,
    correlator::SwapCorrelator,
    enricher::SwapEnricher,
    errors::IndexerError,
    ingest::Ingestor,
    listen::BlockListener,
    oracle::PriceOracle,
    resolver::MetadataResolver,
    store::PgStore,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const BLOCK_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Parser)]
#[command(name = "indexer", about = "AMM swap ingestion and price-resolution engine")]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "config/indexer.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), IndexerError> {
    let filter = EnvFilter::from_default_env()
        .add_directive("ethers_providers=warn".parse().expect("static directive"))
        .add_directive("tokio_postgres=warn".parse().expect("static directive"))
        .add_directive("amm_swap_indexer=info".parse().expect("static directive"))
        .add_directive("indexer=info".parse().expect("static directive"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config).map_err(|e| IndexerError::Config(e.to_string()))?;
    info!(config = %args.config.display(), "configuration loaded");

    let database_url = config
        .database_url()
        .ok_or_else(|| IndexerError::Config("DATABASE_URL not configured".into()))?;
    let store = Arc::new(PgStore::connect(&database_url)?);
    store.create_tables().await?;
    let chain = Arc::new(EvmChainClient::new(&config.chain.http_url)?);

    let resolver = Arc::new(MetadataResolver::new(
        chain.clone(),
        store.clone(),
        &config.reference_tokens,
        config.factory_addr,
    ));
    resolver.warm().await?;

    let oracle = Arc::new(PriceOracle::new(
        chain.clone(),
        resolver.clone(),
        config.reference_tokens.clone(),
        config.pegged_stable,
        config.quote_refresh_interval(),
    ));

    // Hard startup gate: every reference quote must resolve before any
    // block is ingested.
    oracle.refresh().await;
    oracle.ensure_populated().await?;

    let cancel = CancellationToken::new();
    let (block_tx, block_rx) = mpsc::channel(BLOCK_CHANNEL_CAPACITY);

    let listener = BlockListener::new(
        config.chain.ws_url.clone(),
        config.listener.clone(),
        block_tx,
        cancel.child_token(),
    );
    let mut listener_handle = tokio::spawn(async move { listener.run().await });

    let oracle_task = oracle.clone();
    let oracle_cancel = cancel.child_token();
    let oracle_handle = tokio::spawn(async move { oracle_task.run(oracle_cancel).await });

    let correlator = SwapCorrelator::new(resolver.clone(), config.factory_addr);
    let enricher = SwapEnricher::new(resolver.clone(), oracle.clone(), store.clone());
    let ingestor = Ingestor::new(chain, correlator, enricher);
    let ingest_cancel = cancel.child_token();
    let ingest_handle = tokio::spawn(async move { ingestor.run(block_rx, ingest_cancel).await });

    info!("ingestion started; waiting for blocks");

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("ctrl-c received; shutting down");
        }
        result = &mut listener_handle => {
            match result {
                Ok(Ok(())) => info!("listener stopped"),
                Ok(Err(e)) => error!(error = %e, "listener failed"),
                Err(e) => error!(error = %e, "listener task panicked"),
            }
        }
    }

    cancel.cancel();
    listener_handle.abort();
    if let Err(e) = oracle_handle.await {
        warn!(error = %e, "oracle task did not shut down cleanly");
    }
    if let Err(e) = ingest_handle.await {
        warn!(error = %e, "ingestion task did not shut down cleanly");
    }
    info!("shutdown complete");
    Ok(())
}
