//! Scheduled pipeline loops.
//!
//! Each pipeline stage runs as an independent tokio task driven by an
//! interval timer. The correlation loop deliberately skips missed
//! ticks instead of bursting: if a run overruns its period, the next
//! run simply starts at the next tick with a fresh trailing window, so
//! there is no backlog to catch up on.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use watchpost_core::config::{CorrelateConfig, IndexConfig};
use watchpost_core::error::CorrelationError;
use watchpost_core::store::{DedupStore, IndicatorStore, Notifier, SearchStore, ThreatFeed};
use watchpost_core::types::CorrelationWindow;
use watchpost_correlate::{CorrelationEngine, MatchPolicy};
use watchpost_indexer::{DropPolicy, IngestBuffer, LogIndexer, RawUnit};
use watchpost_intel::IntelFetcher;

/// Receive ingest units and flush them to the indexer in batches.
///
/// Flushes when the batch size is reached or on the flush interval,
/// whichever comes first. Drains the remaining buffer on shutdown.
pub async fn run_flush_loop<S: SearchStore>(
    indexer: LogIndexer<S>,
    mut units_rx: mpsc::Receiver<RawUnit>,
    config: IndexConfig,
    cancel: CancellationToken,
) {
    let mut buffer = IngestBuffer::new(config.buffer_capacity, DropPolicy::Oldest);
    let mut ticker =
        tokio::time::interval(Duration::from_secs(config.flush_interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe_unit = units_rx.recv() => {
                match maybe_unit {
                    Some(unit) => {
                        buffer.push(unit);
                        if buffer.should_flush(config.batch_size) {
                            flush(&indexer, &mut buffer, config.batch_size).await;
                        }
                    }
                    None => {
                        info!("ingest channel closed, stopping flush loop");
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    flush(&indexer, &mut buffer, config.batch_size).await;
                }
            }
            _ = cancel.cancelled() => {
                info!("flush loop received shutdown signal");
                break;
            }
        }
    }

    // 종료 전 잔여 유닛을 모두 플러시
    while !buffer.is_empty() {
        flush(&indexer, &mut buffer, config.batch_size).await;
    }
}

async fn flush<S: SearchStore>(
    indexer: &LogIndexer<S>,
    buffer: &mut IngestBuffer,
    batch_size: usize,
) {
    let batch = buffer.drain_batch(batch_size);
    if batch.is_empty() {
        return;
    }
    match indexer.index(&batch).await {
        Ok(outcome) => {
            if outcome.skipped > 0 {
                info!(
                    indexed = outcome.indexed,
                    skipped = outcome.skipped,
                    "flushed batch with skipped records"
                );
            }
        }
        // 재전달은 업스트림 책임: 실패한 배치는 버리고 다음 배치 진행
        Err(e) => error!(error = %e, units = batch.len(), "failed to index batch"),
    }
}

/// Periodically walk the threat feed and upsert indicators.
///
/// The first fetch happens immediately on startup so the indicator
/// store is warm before the first correlation run.
pub async fn run_intel_loop<F: ThreatFeed, I: IndicatorStore>(
    fetcher: IntelFetcher<F, I>,
    period_secs: u64,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(period_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match fetcher.fetch_and_upsert().await {
                    Ok(outcome) => info!(
                        pages = outcome.pages,
                        upserted = outcome.upserted,
                        "intel fetch run finished"
                    ),
                    // 실행 내 재시도는 없음: 다음 틱이 재시도
                    Err(e) => error!(error = %e, "intel fetch run failed"),
                }
            }
            _ = cancel.cancelled() => {
                info!("intel loop received shutdown signal");
                break;
            }
        }
    }
}

/// Periodically run the correlation engine over a trailing window.
///
/// Each run gets a hard deadline. A run that exceeds it is abandoned
/// and logged; the next tick proceeds independently with its own
/// window. Alerts the abandoned run would have published are covered
/// by the window overlap of later runs.
pub async fn run_correlation_loop<S, D, N, P>(
    engine: CorrelationEngine<S, D, N, P>,
    config: CorrelateConfig,
    cancel: CancellationToken,
) where
    S: SearchStore,
    D: DedupStore,
    N: Notifier,
    P: MatchPolicy,
{
    let mut ticker = tokio::time::interval(Duration::from_secs(config.period_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let deadline = Duration::from_secs(config.run_deadline_secs);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let window = CorrelationWindow::trailing(
                    Utc::now(),
                    config.window_secs,
                    config.overlap_secs,
                );

                match tokio::time::timeout(deadline, engine.run(window)).await {
                    Ok(Ok(result)) => {
                        if result.emitted > 0 || result.suppressed > 0 {
                            info!(
                                matched = result.matched,
                                emitted = result.emitted,
                                suppressed = result.suppressed,
                                "correlation run finished"
                            );
                        }
                    }
                    Ok(Err(e)) => error!(error = %e, window = %window, "correlation run failed"),
                    Err(_) => {
                        let e = CorrelationError::Deadline {
                            budget_secs: config.run_deadline_secs,
                        };
                        error!(error = %e, window = %window, "correlation run abandoned");
                    }
                }
            }
            _ = cancel.cancelled() => {
                info!("correlation loop received shutdown signal");
                break;
            }
        }
    }
}
