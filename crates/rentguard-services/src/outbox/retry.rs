use anyhow::{Context, Result};
use rentguard_core::OutboxSettings;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;

use super::dispatcher::OutboxDispatcher;

/// Configuration for the outbox retry service
#[derive(Clone, Debug)]
pub struct OutboxRetryServiceConfig {
    pub poll_interval_seconds: u64,
    pub batch_size: i64,
}

impl Default for OutboxRetryServiceConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 30,
            batch_size: 100,
        }
    }
}

impl From<&OutboxSettings> for OutboxRetryServiceConfig {
    fn from(settings: &OutboxSettings) -> Self {
        Self {
            poll_interval_seconds: settings.poll_interval_secs.max(1),
            batch_size: settings.batch_size.max(1),
        }
    }
}

/// Background service that re-attempts due outbox events
pub struct OutboxRetryService {
    shutdown_tx: mpsc::Sender<()>,
}

impl OutboxRetryService {
    /// Spawn the worker loop on the current runtime.
    pub fn start(dispatcher: Arc<OutboxDispatcher>, config: OutboxRetryServiceConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            Self::worker_loop(dispatcher, config, shutdown_rx).await;
        });

        Self { shutdown_tx }
    }

    async fn worker_loop(
        dispatcher: Arc<OutboxDispatcher>,
        config: OutboxRetryServiceConfig,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let mut poll_interval = interval(Duration::from_secs(config.poll_interval_seconds));

        tracing::info!(
            poll_interval_seconds = config.poll_interval_seconds,
            batch_size = config.batch_size,
            "Outbox retry service started"
        );

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    if let Err(e) = Self::process_batch(&dispatcher, &config).await {
                        tracing::error!(error = %e, "Error processing outbox batch");
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Outbox retry service shutting down");
                    break;
                }
            }
        }
    }

    async fn process_batch(
        dispatcher: &OutboxDispatcher,
        config: &OutboxRetryServiceConfig,
    ) -> Result<()> {
        let stats = dispatcher
            .deliver_due(config.batch_size)
            .await
            .context("Failed to load due outbox events")?;

        if stats.delivered + stats.retrying + stats.dead > 0 {
            tracing::info!(
                delivered = stats.delivered,
                retrying = stats.retrying,
                dead = stats.dead,
                "Processed outbox batch"
            );
        }
        Ok(())
    }

    /// Gracefully shutdown the retry service
    pub async fn shutdown(&self) {
        if let Err(e) = self.shutdown_tx.send(()).await {
            tracing::warn!(
                error = %e,
                "Failed to send shutdown signal to outbox retry service"
            );
        }
    }
}
