//! Pipeline orchestration -- adapter assembly, channel wiring, and
//! lifecycle management.
//!
//! The [`Orchestrator`] loads configuration, builds the HTTP adapters,
//! wires the ingest channel, spawns the scheduled pipeline loops, and
//! coordinates graceful shutdown through a shared cancellation token.
//!
//! # Pipeline stages
//!
//! 1. Ingest collector (TCP NDJSON listener -> ingest channel)
//! 2. Flush loop (ingest channel -> buffer -> bulk index)
//! 3. Intel loop (threat feed -> indicator upserts)
//! 4. Correlation loop (trailing window scan -> summary alert)
//!
//! Stages are independent: a failing intel fetch does not stall
//! indexing, and an abandoned correlation run does not block the next
//! tick.

use std::path::Path;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use watchpost_core::config::WatchpostConfig;
use watchpost_correlate::{CorrelationEngine, FlagMatchPolicy, LookupMatchPolicy};
use watchpost_indexer::{IngestTcpCollector, IngestTcpConfig, LogIndexer};
use watchpost_intel::IntelFetcher;
use watchpost_store::{EsStore, HttpFeed, WebhookNotifier};

use crate::metrics_server;
use crate::scheduler;

/// Ingest channel capacity between the collector and the flush loop.
const INGEST_CHANNEL_CAPACITY: usize = 1024;

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: WatchpostConfig,
    /// Shared cancellation token for all pipeline tasks.
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Load configuration from a file and build the orchestrator.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = WatchpostConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config)
    }

    /// Build from an already-loaded configuration.
    ///
    /// Useful for testing or when CLI overrides have been applied.
    pub fn build_from_config(config: WatchpostConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        Ok(Self {
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Clone the shutdown token so callers can trigger shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Access the loaded configuration.
    pub fn config(&self) -> &WatchpostConfig {
        &self.config
    }

    /// Spawn all enabled pipeline stages and run until cancelled.
    pub async fn run(self) -> Result<()> {
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        let search = EsStore::new(&self.config.search)
            .map_err(|e| anyhow::anyhow!("failed to build search store client: {}", e))?;

        if self.config.index.enabled {
            let (units_tx, units_rx) = mpsc::channel(INGEST_CHANNEL_CAPACITY);

            let collector_config = IngestTcpConfig {
                bind_addr: self.config.index.ingest_bind.clone(),
                ..Default::default()
            };
            let mut collector =
                IngestTcpCollector::new(collector_config, units_tx, self.cancel.clone());
            tasks.push(tokio::spawn(async move {
                if let Err(e) = collector.run().await {
                    tracing::error!(error = %e, "ingest collector terminated");
                }
            }));

            let indexer = LogIndexer::new(search.clone());
            tasks.push(tokio::spawn(scheduler::run_flush_loop(
                indexer,
                units_rx,
                self.config.index.clone(),
                self.cancel.clone(),
            )));

            tracing::info!(bind = %self.config.index.ingest_bind, "indexing stage enabled");
        }

        if self.config.intel.enabled {
            let feed = HttpFeed::new(&self.config.intel)
                .map_err(|e| anyhow::anyhow!("failed to build feed client: {}", e))?;
            let fetcher = IntelFetcher::new(feed, search.clone());
            tasks.push(tokio::spawn(scheduler::run_intel_loop(
                fetcher,
                self.config.intel.period_secs,
                self.cancel.clone(),
            )));

            tracing::info!(
                period_secs = self.config.intel.period_secs,
                "intel stage enabled"
            );
        }

        if self.config.correlate.enabled {
            let notifier = WebhookNotifier::new(&self.config.notify)
                .map_err(|e| anyhow::anyhow!("failed to build notifier: {}", e))?;
            let correlate = self.config.correlate.clone();
            let prefix = self.config.notify.subject_prefix.clone();

            // 정책마다 엔진 타입이 달라 분기별로 스폰
            match correlate.policy.as_str() {
                "flag" => {
                    let engine = CorrelationEngine::new(
                        search.clone(),
                        search.clone(),
                        notifier,
                        FlagMatchPolicy,
                    )
                    .with_subject_prefix(prefix)
                    .with_sample_size(correlate.sample_size);
                    tasks.push(tokio::spawn(scheduler::run_correlation_loop(
                        engine,
                        correlate.clone(),
                        self.cancel.clone(),
                    )));
                }
                _ => {
                    let engine = CorrelationEngine::new(
                        search.clone(),
                        search.clone(),
                        notifier,
                        LookupMatchPolicy::new(search.clone()),
                    )
                    .with_subject_prefix(prefix)
                    .with_sample_size(correlate.sample_size);
                    tasks.push(tokio::spawn(scheduler::run_correlation_loop(
                        engine,
                        correlate.clone(),
                        self.cancel.clone(),
                    )));
                }
            }

            tracing::info!(
                policy = %correlate.policy,
                period_secs = correlate.period_secs,
                "correlation stage enabled"
            );
        }

        tracing::info!("watchpost-daemon running -- pipeline stages active");
        self.cancel.cancelled().await;

        tracing::info!("stopping pipeline tasks");
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "pipeline task panicked");
            }
        }

        Ok(())
    }
}
