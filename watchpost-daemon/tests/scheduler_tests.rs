//! Scheduler loop integration tests with in-memory collaborators.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use watchpost_core::config::IndexConfig;
use watchpost_core::error::StoreError;
use watchpost_core::store::SearchStore;
use watchpost_core::types::{CorrelationWindow, LogRecord};
use watchpost_daemon::scheduler;
use watchpost_indexer::{LogIndexer, RawUnit};

#[derive(Clone, Default)]
struct MemorySearch {
    batches: Arc<Mutex<Vec<Vec<LogRecord>>>>,
}

impl SearchStore for MemorySearch {
    async fn write_batch(&self, records: &[LogRecord]) -> Result<(), StoreError> {
        self.batches.lock().unwrap().push(records.to_vec());
        Ok(())
    }

    async fn query_window(&self, _window: CorrelationWindow) -> Result<Vec<LogRecord>, StoreError> {
        Ok(Vec::new())
    }
}

fn unit(offset: u64) -> RawUnit {
    RawUnit::new(
        "test",
        offset,
        Bytes::copy_from_slice(format!(r#"{{"n":{offset}}}"#).as_bytes()),
    )
}

#[tokio::test]
async fn flush_loop_flushes_on_batch_size() {
    let store = MemorySearch::default();
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let config = IndexConfig {
        batch_size: 2,
        flush_interval_secs: 3600, // 타이머가 아니라 배치 크기로 플러시되는지 확인
        ..Default::default()
    };

    let loop_task = tokio::spawn(scheduler::run_flush_loop(
        LogIndexer::new(store.clone()),
        rx,
        config,
        cancel.clone(),
    ));

    tx.send(unit(0)).await.unwrap();
    tx.send(unit(1)).await.unwrap();

    // 배치 크기 도달로 플러시될 때까지 대기
    for _ in 0..50 {
        if !store.batches.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(store.batches.lock().unwrap().len(), 1);
    assert_eq!(store.batches.lock().unwrap()[0].len(), 2);

    cancel.cancel();
    loop_task.await.unwrap();
}

#[tokio::test]
async fn flush_loop_drains_buffer_on_shutdown() {
    let store = MemorySearch::default();
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let config = IndexConfig {
        batch_size: 100,
        flush_interval_secs: 3600,
        ..Default::default()
    };

    let loop_task = tokio::spawn(scheduler::run_flush_loop(
        LogIndexer::new(store.clone()),
        rx,
        config,
        cancel.clone(),
    ));

    tx.send(unit(0)).await.unwrap();
    tx.send(unit(1)).await.unwrap();
    tx.send(unit(2)).await.unwrap();
    // 채널이 비워질 시간을 준 뒤 종료
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    cancel.cancel();
    loop_task.await.unwrap();

    let batches = store.batches.lock().unwrap();
    let total: usize = batches.iter().map(Vec::len).sum();
    assert_eq!(total, 3);
}

#[tokio::test]
async fn flush_loop_stops_when_channel_closes() {
    let store = MemorySearch::default();
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let loop_task = tokio::spawn(scheduler::run_flush_loop(
        LogIndexer::new(store.clone()),
        rx,
        IndexConfig::default(),
        cancel,
    ));

    tx.send(unit(0)).await.unwrap();
    drop(tx);

    loop_task.await.unwrap();
    // 채널 종료 시에도 잔여 유닛은 색인됨
    let batches = store.batches.lock().unwrap();
    let total: usize = batches.iter().map(Vec::len).sum();
    assert_eq!(total, 1);
}
