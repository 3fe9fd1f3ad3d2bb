//! IndexerRunner processor.
//!
//! The runner is responsible for:
//! - Walking from the checkpoint to the confirmed head in fixed windows
//! - Registering round instances announced by the factory in each window
//! - Fetching, ordering and routing every monitored log of the window
//! - Polling for new blocks once caught up, until shutdown

use crate::config::{DiscoveryConfig, IndexerConfig};
use crate::decoding::{self, DecodeError};
use crate::discovery::MonitoredContracts;
use crate::ledger::{LedgerClient, LedgerError, RawLog};
use crate::router::{EventRouter, RouteOutcome, RouterError};
use crate::store::StoreError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum IndexerError {
    /// Ledger error, retried on the next poll
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("router error: {0}")]
    Router(#[from] RouterError),

    /// A factory deployment log could not be decoded
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl IndexerError {
    /// Whether the runner may continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, IndexerError::Ledger(_))
    }
}

/// Counters for one pass over the chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub windows: u64,
    pub applied: u64,
    pub new_rounds: u64,
    /// Last block scanned, if any.
    pub synced_to: Option<u64>,
}

pub struct IndexerRunner {
    client: Arc<dyn LedgerClient>,
    router: EventRouter,
    monitored: MonitoredContracts,
    discovery: DiscoveryConfig,
    confirmations: u64,
    poll_interval: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl IndexerRunner {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        router: EventRouter,
        monitored: MonitoredContracts,
        config: &IndexerConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            client,
            router,
            monitored,
            discovery: config.discovery,
            confirmations: config.ledger.confirmations,
            poll_interval: config.ledger.poll_interval,
            shutdown_rx,
        }
    }

    pub fn monitored(&self) -> &MonitoredContracts {
        &self.monitored
    }

    /// Run until shutdown or until an unrecoverable error.
    pub async fn run(mut self) -> Result<(), IndexerError> {
        info!(
            rounds = self.monitored.instances().len(),
            start_block = self.discovery.start_block,
            "IndexerRunner started"
        );

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            match self.sync_once().await {
                Ok(report) if report.windows > 0 => {
                    info!(
                        synced_to = report.synced_to,
                        applied = report.applied,
                        new_rounds = report.new_rounds,
                        "Indexer caught up"
                    );
                }
                Ok(_) => debug!("No new confirmed blocks"),
                Err(e) if e.is_recoverable() => {
                    warn!(error = %e, "Ledger unavailable, retrying on next poll");
                }
                Err(e) => {
                    error!(error = %e, "Indexer halted");
                    return Err(e);
                }
            }

            tokio::select! {
                biased;
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("IndexerRunner shutting down");
        Ok(())
    }

    /// Process every confirmed block after the checkpoint.
    pub async fn sync_once(&mut self) -> Result<SyncReport, IndexerError> {
        let head = self.client.block_number().await?;
        let target = head.saturating_sub(self.confirmations);
        let checkpoint = self.router.store().checkpoint().await?;
        let chunk_size = self.discovery.chunk_size.max(1);

        let mut report = SyncReport::default();
        let mut from_block = checkpoint.resume_block(self.discovery.start_block);
        while from_block <= target {
            if *self.shutdown_rx.borrow() {
                break;
            }
            let to_block = from_block.saturating_add(chunk_size - 1).min(target);
            self.process_window(from_block, to_block, &mut report).await?;
            report.windows += 1;
            report.synced_to = Some(to_block);
            from_block = to_block + 1;
        }
        Ok(report)
    }

    async fn process_window(
        &mut self,
        from_block: u64,
        to_block: u64,
        report: &mut SyncReport,
    ) -> Result<(), IndexerError> {
        let mut logs = self
            .client
            .logs(&self.monitored.factory_query(from_block, to_block))
            .await?;
        logs.sort_by_key(|log| log.position());
        for log in &logs {
            let instance = decoding::instance_address(log)?;
            if self.monitored.register_instance(instance) {
                info!(round = %instance, block = log.block_number, "Monitoring new round");
                report.new_rounds += 1;
            }
        }

        logs.extend(
            self.client
                .logs(&self.monitored.event_query(from_block, to_block))
                .await?,
        );
        logs.sort_by_key(|log| log.position());
        logs.dedup_by_key(|log| log.position());

        let mut timestamps = HashMap::new();
        for log in &logs {
            let Some(kind) = self.monitored.kind_of(&log.address) else {
                continue;
            };
            let timestamp = self.timestamp_of(log, &mut timestamps).await?;
            if let RouteOutcome::Applied(_) = self.router.route(log, kind, timestamp).await? {
                report.applied += 1;
            }
        }

        self.router.mark_synced(to_block).await?;
        debug!(from_block, to_block, logs = logs.len(), "Window processed");
        Ok(())
    }

    async fn timestamp_of(
        &self,
        log: &RawLog,
        cache: &mut HashMap<u64, u64>,
    ) -> Result<u64, LedgerError> {
        if let Some(ts) = log.block_timestamp {
            return Ok(ts);
        }
        if let Some(ts) = cache.get(&log.block_number) {
            return Ok(*ts);
        }
        let ts = self.client.block_timestamp(log.block_number).await?;
        cache.insert(log.block_number, ts);
        Ok(ts)
    }
}
