//! 겹침 윈도우 시나리오 통합 테스트
//!
//! 같은 레코드가 연속된 두 겹침 윈도우에 모두 들어오는 경우,
//! 첫 실행만 알림을 발행하고 두 번째 실행은 전부 억제되어야 합니다.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};

use watchpost_core::error::StoreError;
use watchpost_core::store::{DedupStore, IndicatorStore, Notifier, SearchStore};
use watchpost_core::types::{CorrelationWindow, Indicator, IndicatorKind, LogRecord};
use watchpost_correlate::{CorrelationEngine, LookupMatchPolicy};

#[derive(Clone, Default)]
struct MemorySearch {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl SearchStore for MemorySearch {
    async fn write_batch(&self, records: &[LogRecord]) -> Result<(), StoreError> {
        self.records.lock().unwrap().extend_from_slice(records);
        Ok(())
    }

    async fn query_window(&self, window: CorrelationWindow) -> Result<Vec<LogRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| window.contains(r.timestamp))
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
struct MemoryDedup {
    seen: Arc<Mutex<HashSet<String>>>,
}

impl DedupStore for MemoryDedup {
    async fn insert_if_absent(&self, alert_id: &str) -> Result<bool, StoreError> {
        Ok(self.seen.lock().unwrap().insert(alert_id.to_owned()))
    }

    async fn contains(&self, alert_id: &str) -> Result<bool, StoreError> {
        Ok(self.seen.lock().unwrap().contains(alert_id))
    }
}

#[derive(Clone, Default)]
struct MemoryNotifier {
    published: Arc<Mutex<Vec<(String, String)>>>,
}

impl Notifier for MemoryNotifier {
    async fn publish(&self, subject: &str, message: &str) -> Result<(), StoreError> {
        self.published
            .lock()
            .unwrap()
            .push((subject.to_owned(), message.to_owned()));
        Ok(())
    }
}

#[derive(Clone, Default)]
struct MemoryIndicators {
    known: Arc<Mutex<Vec<Indicator>>>,
}

impl IndicatorStore for MemoryIndicators {
    async fn upsert(&self, indicator: &Indicator) -> Result<(), StoreError> {
        let mut known = self.known.lock().unwrap();
        if let Some(existing) = known
            .iter_mut()
            .find(|i| i.kind == indicator.kind && i.value == indicator.value)
        {
            existing.last_seen = indicator.last_seen;
        } else {
            known.push(indicator.clone());
        }
        Ok(())
    }

    async fn find(
        &self,
        kind: IndicatorKind,
        value: &str,
    ) -> Result<Option<Indicator>, StoreError> {
        Ok(self
            .known
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.kind == kind && i.value == value)
            .cloned())
    }
}

fn record_with_source_ip(id: &str, ip: &str, ts: chrono::DateTime<Utc>) -> LogRecord {
    let mut fields = serde_json::Map::new();
    fields.insert("source_ip".to_owned(), serde_json::json!(ip));
    LogRecord {
        id: id.to_owned(),
        timestamp: ts,
        source: "edge:fw-01".to_owned(),
        fields,
        ioc_match: false,
        indexed_at: ts,
    }
}

#[tokio::test]
async fn overlapping_runs_emit_each_alert_exactly_once() {
    let search = MemorySearch::default();
    let notifier = MemoryNotifier::default();
    let indicators = MemoryIndicators::default();

    let now = Utc::now();
    indicators
        .upsert(&Indicator {
            kind: IndicatorKind::Ip,
            value: "1.2.3.4".to_owned(),
            first_seen: now,
            last_seen: now,
        })
        .await
        .unwrap();

    // 악성 IP로 향하는 레코드 하나와 무해한 레코드 하나
    search
        .write_batch(&[
            record_with_source_ip("rec-1", "1.2.3.4", now - Duration::seconds(100)),
            record_with_source_ip("rec-2", "10.0.0.1", now - Duration::seconds(90)),
        ])
        .await
        .unwrap();

    let engine = CorrelationEngine::new(
        search,
        MemoryDedup::default(),
        notifier.clone(),
        LookupMatchPolicy::new(indicators),
    );

    // 첫 실행: 매칭 1건, 알림 1건 발행
    let first_window = CorrelationWindow::trailing(now, 300, 300);
    let first = engine.run(first_window).await.unwrap();
    assert_eq!(first.matched, 1);
    assert_eq!(first.emitted, 1);
    assert_eq!(first.suppressed, 0);

    // 다음 주기: 겹침 때문에 같은 레코드가 다시 윈도우에 들어옴
    let second_window = CorrelationWindow::trailing(now + Duration::seconds(300), 300, 300);
    assert!(second_window.contains(now - Duration::seconds(100)));

    let second = engine.run(second_window).await.unwrap();
    assert_eq!(second.matched, 1);
    assert_eq!(second.emitted, 0);
    assert_eq!(second.suppressed, 1);

    // 하류 채널에는 요약 한 건만 전달됨
    let published = notifier.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert!(published[0].0.contains("1 new threat alert"));
    assert!(published[0].1.contains("1.2.3.4"));
}

#[tokio::test]
async fn new_record_in_overlap_still_alerts() {
    let search = MemorySearch::default();
    let notifier = MemoryNotifier::default();
    let indicators = MemoryIndicators::default();

    let now = Utc::now();
    indicators
        .upsert(&Indicator {
            kind: IndicatorKind::Ip,
            value: "1.2.3.4".to_owned(),
            first_seen: now,
            last_seen: now,
        })
        .await
        .unwrap();

    search
        .write_batch(&[record_with_source_ip(
            "rec-1",
            "1.2.3.4",
            now - Duration::seconds(100),
        )])
        .await
        .unwrap();

    let engine = CorrelationEngine::new(
        search.clone(),
        MemoryDedup::default(),
        notifier.clone(),
        LookupMatchPolicy::new(indicators),
    );

    let first = engine
        .run(CorrelationWindow::trailing(now, 300, 300))
        .await
        .unwrap();
    assert_eq!(first.emitted, 1);

    // 색인 지연으로 늦게 들어온 레코드는 겹침 구간에서 처음 보임
    search
        .write_batch(&[record_with_source_ip(
            "rec-late",
            "1.2.3.4",
            now - Duration::seconds(50),
        )])
        .await
        .unwrap();

    let second = engine
        .run(CorrelationWindow::trailing(
            now + Duration::seconds(300),
            300,
            300,
        ))
        .await
        .unwrap();
    assert_eq!(second.matched, 2);
    assert_eq!(second.emitted, 1);
    assert_eq!(second.suppressed, 1);
    assert_eq!(notifier.published.lock().unwrap().len(), 2);
}
