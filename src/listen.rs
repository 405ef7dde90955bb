//! # Chain Connection
//!
//! Owns the live WebSocket subscription to new block numbers. A keep-alive
//! probe runs on an interval; a probe that gets no answer within its
//! timeout force-closes the connection. Reconnection uses exponential
//! backoff with jitter and a maximum-attempt policy, the attempt counter
//! resetting on every successful connect. Delivery is at-least-once across
//! reconnects; everything downstream is idempotent.

use crate::config::ListenerSettings;
use crate::errors::ListenerError;
use ethers::providers::{Middleware, Provider, Ws};
use futures::StreamExt;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Backoff delay with randomized jitter so restarted processes do not
/// hammer the node in lockstep.
fn backoff_with_jitter(
    attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_factor: f64,
) -> Duration {
    let exp = attempts.saturating_sub(1).min(8);
    let mut delay = base_delay.saturating_mul(2u32.saturating_pow(exp));
    delay = delay.min(max_delay);
    let jitter_ms =
        (delay.as_millis() as f64 * jitter_factor * rand::thread_rng().gen::<f64>()) as u64;
    delay + Duration::from_millis(jitter_ms)
}

/// Resolves one keep-alive round: the probe must answer within the window
/// or the connection is declared dead.
async fn probe_verdict<F, Fut, E>(probe: F, window: Duration) -> Result<(), ListenerError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    match timeout(window, probe()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ListenerError::Probe(e.to_string())),
        Err(_) => Err(ListenerError::ProbeTimeout),
    }
}

#[derive(Debug)]
pub struct BlockListener {
    ws_url: String,
    settings: ListenerSettings,
    block_tx: mpsc::Sender<u64>,
    cancel: CancellationToken,
}

impl BlockListener {
    pub fn new(
        ws_url: String,
        settings: ListenerSettings,
        block_tx: mpsc::Sender<u64>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ws_url,
            settings,
            block_tx,
            cancel,
        }
    }

    /// Connection manager loop: connect, stream blocks until the connection
    /// dies, back off, retry. Returns `Ok` on shutdown and `Err` only when
    /// the retry budget is exhausted.
    pub async fn run(&self) -> Result<(), ListenerError> {
        let base_delay = Duration::from_millis(self.settings.reconnect_base_delay_ms);
        let max_delay = Duration::from_millis(self.settings.reconnect_max_delay_ms);
        let mut attempts: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            match self.connect().await {
                Ok(provider) => {
                    info!(target: "listener", url = %self.ws_url, "connected");
                    attempts = 0;
                    match self.run_session(provider).await {
                        Ok(()) => return Ok(()),
                        Err(ListenerError::ChannelClosed) => {
                            return Err(ListenerError::ChannelClosed)
                        }
                        Err(e) => {
                            warn!(target: "listener", error = %e, "connection lost; reconnecting");
                        }
                    }
                }
                Err(e) => {
                    warn!(target: "listener", error = %e, "connection attempt failed");
                }
            }

            attempts = attempts.saturating_add(1);
            if attempts >= self.settings.max_reconnect_attempts {
                error!(
                    target: "listener",
                    attempts,
                    "reconnect budget exhausted; giving up"
                );
                return Err(ListenerError::RetriesExhausted(attempts));
            }

            let delay = backoff_with_jitter(
                attempts,
                base_delay,
                max_delay,
                self.settings.backoff_jitter_factor,
            );
            debug!(target: "listener", attempt = attempts, ?delay, "backing off before reconnect");
            select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                _ = sleep(delay) => {}
            }
        }
    }

    async fn connect(&self) -> Result<Provider<Ws>, ListenerError> {
        let connect_timeout = Duration::from_secs(self.settings.connect_timeout_secs);
        match timeout(connect_timeout, Provider::<Ws>::connect(&self.ws_url)).await {
            Ok(Ok(provider)) => Ok(provider),
            Ok(Err(e)) => Err(ListenerError::Connection(e.to_string())),
            Err(_) => Err(ListenerError::ConnectTimeout),
        }
    }

    /// Streams block numbers over one live connection. Returns `Ok` only on
    /// shutdown; any other exit forces a reconnect by the caller.
    async fn run_session(&self, provider: Provider<Ws>) -> Result<(), ListenerError> {
        let mut stream = provider
            .subscribe_blocks()
            .await
            .map_err(|e| ListenerError::Connection(e.to_string()))?;

        let mut keepalive = interval(Duration::from_secs(self.settings.keepalive_interval_secs));
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick is immediate; skip it so the probe starts one interval in.
        keepalive.tick().await;

        let probe_window = Duration::from_secs(self.settings.keepalive_timeout_secs);

        loop {
            select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(target: "listener", "shutdown signal received");
                    return Ok(());
                }
                block = stream.next() => {
                    match block {
                        Some(block) => {
                            let Some(number) = block.number else { continue };
                            debug!(target: "listener", block = number.as_u64(), "new block");
                            if self.block_tx.send(number.as_u64()).await.is_err() {
                                error!(target: "listener", "block channel closed");
                                return Err(ListenerError::ChannelClosed);
                            }
                        }
                        None => {
                            warn!(target: "listener", "block stream ended");
                            return Err(ListenerError::StreamEnded);
                        }
                    }
                }
                _ = keepalive.tick() => {
                    probe_verdict(
                        || async {
                            provider.get_block_number().await.map(|_| ())
                        },
                        probe_window,
                    )
                    .await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_is_capped() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(5);
        let first = backoff_with_jitter(1, base, max, 0.0);
        let third = backoff_with_jitter(3, base, max, 0.0);
        let huge = backoff_with_jitter(30, base, max, 0.0);
        assert_eq!(first, base);
        assert_eq!(third, Duration::from_millis(400));
        assert_eq!(huge, max);
    }

    #[test]
    fn backoff_jitter_stays_within_factor() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(5);
        for _ in 0..100 {
            let delay = backoff_with_jitter(2, base, max, 0.5);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(300));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn probe_timeout_forces_close() {
        let verdict = probe_verdict(
            || async {
                std::future::pending::<()>().await;
                Ok::<(), std::convert::Infallible>(())
            },
            Duration::from_secs(15),
        )
        .await;
        assert!(matches!(verdict, Err(ListenerError::ProbeTimeout)));
    }

    #[tokio::test]
    async fn probe_ack_keeps_connection_open() {
        let verdict = probe_verdict(
            || async { Ok::<(), std::convert::Infallible>(()) },
            Duration::from_secs(15),
        )
        .await;
        assert!(verdict.is_ok());
    }

    #[tokio::test]
    async fn probe_error_is_surfaced() {
        let verdict = probe_verdict(
            || async { Err("socket reset") },
            Duration::from_secs(15),
        )
        .await;
        assert!(matches!(verdict, Err(ListenerError::Probe(_))));
    }
}
