//! # Relational Store
//!
//! Postgres-backed system of record for tokens, pairs and swaps, behind the
//! `SwapStore` seam. Inserts are idempotent: a duplicate-key race on any
//! natural key is a benign no-op, not an error. Each swap write is a single
//! atomic insert, so no cross-statement transactions are needed.

use crate::errors::StoreError;
use crate::types::{fmt_addr, fmt_hash, Pair, Swap, Token};
use async_trait::async_trait;
use deadpool_postgres::{Config as PgConfig, Pool, PoolConfig, Runtime, Timeouts};
use ethers::types::Address;
use std::str::FromStr;
use std::time::Duration;
use tokio_postgres::NoTls;

#[async_trait]
pub trait SwapStore: Send + Sync + std::fmt::Debug {
    async fn load_tokens(&self) -> Result<Vec<Token>, StoreError>;
    async fn load_pairs(&self) -> Result<Vec<Pair>, StoreError>;
    async fn insert_token(&self, token: &Token) -> Result<(), StoreError>;
    async fn insert_pair(&self, pair: &Pair) -> Result<(), StoreError>;
    /// Returns `false` when the row already existed (benign duplicate).
    async fn insert_swap(&self, swap: &Swap) -> Result<bool, StoreError>;
}

#[derive(Debug)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    /// Builds a bounded connection pool from a `postgres://` URL.
    pub fn connect(database_url: &str) -> Result<Self, StoreError> {
        let url = url::Url::parse(database_url)
            .map_err(|e| StoreError::Config(format!("invalid DATABASE_URL: {e}")))?;
        if url.scheme() != "postgres" && url.scheme() != "postgresql" {
            return Err(StoreError::Config(format!(
                "unsupported database scheme: {}",
                url.scheme()
            )));
        }

        let mut cfg = PgConfig::new();
        cfg.host = Some(
            url.host_str()
                .ok_or_else(|| StoreError::Config("missing host in DATABASE_URL".into()))?
                .to_string(),
        );
        cfg.port = Some(url.port().unwrap_or(5432));
        cfg.user = Some(if url.username().is_empty() {
            "postgres".to_string()
        } else {
            url.username().to_string()
        });
        cfg.password = url.password().map(str::to_string);
        cfg.dbname = Some(url.path().trim_start_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| Some("indexer".to_string()));
        cfg.pool = Some(PoolConfig {
            max_size: 20,
            timeouts: Timeouts {
                create: Some(Duration::from_secs(30)),
                wait: Some(Duration::from_secs(30)),
                recycle: Some(Duration::from_secs(300)),
            },
            ..Default::default()
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Config(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Schema management for the administrative surface; never called by the
    /// ingestion engine at steady state.
    pub async fn create_tables(&self) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        client
            .batch_execute(
                r#"
                CREATE TABLE IF NOT EXISTS token (
                    addr        TEXT PRIMARY KEY,
                    decimals    SMALLINT NOT NULL,
                    name        TEXT NOT NULL,
                    symbol      TEXT NOT NULL,
                    first_seen  TIMESTAMPTZ NOT NULL
                );
                CREATE TABLE IF NOT EXISTS pair (
                    addr         TEXT PRIMARY KEY,
                    token_addr   TEXT NOT NULL,
                    lp_addr      TEXT NOT NULL,
                    factory_addr TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS swap (
                    block_number    BIGINT NOT NULL,
                    tx_hash         TEXT NOT NULL,
                    log_idx         BIGINT NOT NULL,
                    pair_addr       TEXT NOT NULL,
                    token_addr      TEXT NOT NULL,
                    lp_addr         TEXT NOT NULL,
                    gas_price       NUMERIC NOT NULL,
                    gas_limit       NUMERIC NOT NULL,
                    tx_from         TEXT NOT NULL,
                    tx_to           TEXT,
                    swap_sender     TEXT NOT NULL,
                    swap_to         TEXT NOT NULL,
                    side            TEXT NOT NULL,
                    lp_reserve_usd  NUMERIC NOT NULL,
                    token_in_usd    NUMERIC NOT NULL,
                    token_out_usd   NUMERIC NOT NULL,
                    lp_in_usd       NUMERIC NOT NULL,
                    lp_out_usd      NUMERIC NOT NULL,
                    token_price_usd NUMERIC NOT NULL,
                    lp_price_usd    NUMERIC NOT NULL,
                    ts              BIGINT NOT NULL,
                    PRIMARY KEY (tx_hash, log_idx)
                );
                "#,
            )
            .await?;
        Ok(())
    }

    pub async fn drop_tables(&self) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        client
            .batch_execute("DROP TABLE IF EXISTS swap; DROP TABLE IF EXISTS pair; DROP TABLE IF EXISTS token;")
            .await?;
        Ok(())
    }

    /// Bounded listing for the administrative surface.
    pub async fn list_pairs(&self, limit: i64) -> Result<Vec<Pair>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT addr, token_addr, lp_addr, factory_addr FROM pair LIMIT $1",
                &[&limit],
            )
            .await?;
        rows.iter().map(pair_from_row).collect()
    }

    /// Bounded listing for the administrative surface.
    pub async fn list_tokens(&self, limit: i64) -> Result<Vec<Token>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT addr, decimals, name, symbol, first_seen FROM token LIMIT $1",
                &[&limit],
            )
            .await?;
        rows.iter().map(token_from_row).collect()
    }
}

fn parse_addr(text: &str) -> Result<Address, StoreError> {
    Address::from_str(text).map_err(|e| StoreError::Corrupt(format!("bad address {text}: {e}")))
}

fn token_from_row(row: &tokio_postgres::Row) -> Result<Token, StoreError> {
    let addr: String = row.get("addr");
    let decimals: i16 = row.get("decimals");
    Ok(Token {
        addr: parse_addr(&addr)?,
        decimals: decimals as u8,
        name: row.get("name"),
        symbol: row.get("symbol"),
        first_seen: row.get("first_seen"),
    })
}

fn pair_from_row(row: &tokio_postgres::Row) -> Result<Pair, StoreError> {
    let addr: String = row.get("addr");
    let token_addr: String = row.get("token_addr");
    let lp_addr: String = row.get("lp_addr");
    let factory_addr: String = row.get("factory_addr");
    Ok(Pair {
        addr: parse_addr(&addr)?,
        token_addr: parse_addr(&token_addr)?,
        lp_addr: parse_addr(&lp_addr)?,
        factory_addr: parse_addr(&factory_addr)?,
    })
}

#[async_trait]
impl SwapStore for PgStore {
    async fn load_tokens(&self) -> Result<Vec<Token>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .query("SELECT addr, decimals, name, symbol, first_seen FROM token", &[])
            .await?;
        rows.iter().map(token_from_row).collect()
    }

    async fn load_pairs(&self) -> Result<Vec<Pair>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .query("SELECT addr, token_addr, lp_addr, factory_addr FROM pair", &[])
            .await?;
        rows.iter().map(pair_from_row).collect()
    }

    async fn insert_token(&self, token: &Token) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO token (addr, decimals, name, symbol, first_seen)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (addr) DO NOTHING",
                &[
                    &fmt_addr(&token.addr),
                    &(i16::from(token.decimals)),
                    &token.name,
                    &token.symbol,
                    &token.first_seen,
                ],
            )
            .await?;
        Ok(())
    }

    async fn insert_pair(&self, pair: &Pair) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO pair (addr, token_addr, lp_addr, factory_addr)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (addr) DO NOTHING",
                &[
                    &fmt_addr(&pair.addr),
                    &fmt_addr(&pair.token_addr),
                    &fmt_addr(&pair.lp_addr),
                    &fmt_addr(&pair.factory_addr),
                ],
            )
            .await?;
        Ok(())
    }

    async fn insert_swap(&self, swap: &Swap) -> Result<bool, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .execute(
                "INSERT INTO swap (
                     block_number, tx_hash, log_idx, pair_addr, token_addr, lp_addr,
                     gas_price, gas_limit, tx_from, tx_to, swap_sender, swap_to, side,
                     lp_reserve_usd, token_in_usd, token_out_usd, lp_in_usd, lp_out_usd,
                     token_price_usd, lp_price_usd, ts
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                           $14, $15, $16, $17, $18, $19, $20, $21)
                 ON CONFLICT (tx_hash, log_idx) DO NOTHING",
                &[
                    &(swap.block_number as i64),
                    &fmt_hash(&swap.tx_hash),
                    &(swap.log_idx as i64),
                    &fmt_addr(&swap.pair_addr),
                    &fmt_addr(&swap.token_addr),
                    &fmt_addr(&swap.lp_addr),
                    &swap.gas_price,
                    &swap.gas_limit,
                    &fmt_addr(&swap.tx_from),
                    &swap.tx_to.as_ref().map(fmt_addr),
                    &fmt_addr(&swap.swap_sender),
                    &fmt_addr(&swap.swap_to),
                    &swap.side.as_str(),
                    &swap.lp_reserve_usd,
                    &swap.token_in_usd,
                    &swap.token_out_usd,
                    &swap.lp_in_usd,
                    &swap.lp_out_usd,
                    &swap.token_price_usd,
                    &swap.lp_price_usd,
                    &(swap.timestamp as i64),
                ],
            )
            .await?;
        Ok(rows > 0)
    }
}