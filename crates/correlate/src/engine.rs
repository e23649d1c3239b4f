//! 상관분석 엔진
//!
//! 한 번의 실행은 윈도우 쿼리, 정책 평가, 중복 제거, 요약 발행의
//! 순서로 진행됩니다. 중복 제거 기록은 발행 확인 이후에만 일어나며,
//! 실행이 중간에 실패해도 부분 알림 상태는 커밋되지 않습니다.

use tracing::{debug, info, warn};

use watchpost_core::error::{CorrelationError, PublishError};
use watchpost_core::metrics::{
    CORRELATE_ALERTS_EMITTED_TOTAL, CORRELATE_ALERTS_SUPPRESSED_TOTAL, CORRELATE_MATCHES_TOTAL,
    CORRELATE_PUBLISH_FAILURES_TOTAL, CORRELATE_RECORDS_SCANNED_TOTAL, CORRELATE_RUNS_TOTAL,
    LABEL_RESULT,
};
use watchpost_core::store::{DedupStore, Notifier, SearchStore};
use watchpost_core::types::{Alert, AlertsEmitted, CorrelationWindow};

use crate::policy::MatchPolicy;
use crate::publisher::compose_summary;

/// 상관분석 엔진
///
/// 모든 협력자는 생성자 주입으로 받습니다.
pub struct CorrelationEngine<S, D, N, P>
where
    S: SearchStore,
    D: DedupStore,
    N: Notifier,
    P: MatchPolicy,
{
    search: S,
    dedup: D,
    notifier: N,
    policy: P,
    subject_prefix: String,
    sample_size: usize,
}

impl<S, D, N, P> CorrelationEngine<S, D, N, P>
where
    S: SearchStore,
    D: DedupStore,
    N: Notifier,
    P: MatchPolicy,
{
    /// 새 엔진을 생성합니다.
    pub fn new(search: S, dedup: D, notifier: N, policy: P) -> Self {
        Self {
            search,
            dedup,
            notifier,
            policy,
            subject_prefix: "[watchpost]".to_owned(),
            sample_size: 5,
        }
    }

    /// 요약 알림 제목 접두어를 설정합니다.
    #[must_use]
    pub fn with_subject_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.subject_prefix = prefix.into();
        self
    }

    /// 요약에 포함할 샘플 알림 수를 설정합니다.
    #[must_use]
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// 윈도우 하나에 대해 상관분석을 실행합니다.
    ///
    /// 매칭이 없으면 아무것도 발행하지 않고 0 카운트로 성공합니다.
    /// 새 알림이 있으면 요약 알림 하나를 발행하고, 발행이 확인된
    /// 뒤에야 중복 제거 엔트리를 기록합니다. 기록 중 실패하면 이미
    /// 발행된 알림이 다음 실행에서 재발행될 수 있지만, 유실되지는
    /// 않습니다.
    pub async fn run(&self, window: CorrelationWindow) -> Result<AlertsEmitted, CorrelationError> {
        let records = match self.search.query_window(window).await {
            Ok(records) => records,
            Err(e) => {
                metrics::counter!(CORRELATE_RUNS_TOTAL, LABEL_RESULT => "error").increment(1);
                return Err(CorrelationError::Query(e));
            }
        };
        metrics::counter!(CORRELATE_RECORDS_SCANNED_TOTAL).increment(records.len() as u64);
        debug!(window = %window, records = records.len(), "scanning window");

        let mut result = AlertsEmitted::default();
        let mut fresh: Vec<Alert> = Vec::new();

        for record in records {
            let Some(indicator) = self.policy.evaluate(&record).await? else {
                continue;
            };
            result.matched += 1;

            let alert = Alert::from_match(record, indicator);

            // 비권위적 사전 필터. 겹침 윈도우가 만드는 재매칭 대부분을
            // 발행 전에 걸러냅니다. 권위적 기록은 발행 후의
            // insert_if_absent입니다.
            let seen = self
                .dedup
                .contains(&alert.id)
                .await
                .map_err(CorrelationError::Dedup)?;
            if seen {
                result.suppressed += 1;
                continue;
            }

            fresh.push(alert);
        }

        metrics::counter!(CORRELATE_MATCHES_TOTAL).increment(result.matched as u64);

        if fresh.is_empty() {
            metrics::counter!(CORRELATE_RUNS_TOTAL, LABEL_RESULT => "ok").increment(1);
            metrics::counter!(CORRELATE_ALERTS_SUPPRESSED_TOTAL)
                .increment(result.suppressed as u64);
            info!(
                window = %window,
                matched = result.matched,
                suppressed = result.suppressed,
                "correlation run completed with no new alerts"
            );
            return Ok(result);
        }

        // 실행당 요약 알림 하나만 발행
        let (subject, body) =
            compose_summary(&self.subject_prefix, window, &fresh, self.sample_size);
        if let Err(e) = self.notifier.publish(&subject, &body).await {
            metrics::counter!(CORRELATE_PUBLISH_FAILURES_TOTAL).increment(1);
            metrics::counter!(CORRELATE_RUNS_TOTAL, LABEL_RESULT => "error").increment(1);
            return Err(CorrelationError::Publish(PublishError::Channel(e)));
        }

        // 발행 확인 후에만 중복 제거 엔트리를 기록
        for alert in &fresh {
            match self.dedup.insert_if_absent(&alert.id).await {
                Ok(true) => result.emitted += 1,
                Ok(false) => {
                    // 동시 실행이 이미 기록함. 발행은 중복됐지만 유실은 아님.
                    result.suppressed += 1;
                    warn!(alert = %alert, "alert was already recorded by a concurrent run");
                }
                Err(e) => {
                    metrics::counter!(CORRELATE_RUNS_TOTAL, LABEL_RESULT => "error").increment(1);
                    return Err(CorrelationError::Dedup(e));
                }
            }
        }

        metrics::counter!(CORRELATE_RUNS_TOTAL, LABEL_RESULT => "ok").increment(1);
        metrics::counter!(CORRELATE_ALERTS_EMITTED_TOTAL).increment(result.emitted as u64);
        metrics::counter!(CORRELATE_ALERTS_SUPPRESSED_TOTAL).increment(result.suppressed as u64);

        info!(
            window = %window,
            matched = result.matched,
            emitted = result.emitted,
            suppressed = result.suppressed,
            "correlation run completed"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use chrono::Utc;
    use watchpost_core::error::StoreError;
    use watchpost_core::types::{Indicator, IndicatorKind, LogRecord};

    use crate::policy::FlagMatchPolicy;

    struct MemorySearch {
        records: Vec<LogRecord>,
        fail: bool,
    }

    impl SearchStore for MemorySearch {
        async fn write_batch(&self, _records: &[LogRecord]) -> Result<(), StoreError> {
            Ok(())
        }

        async fn query_window(
            &self,
            window: CorrelationWindow,
        ) -> Result<Vec<LogRecord>, StoreError> {
            if self.fail {
                return Err(StoreError::Timeout {
                    operation: "window_query".to_owned(),
                });
            }
            Ok(self
                .records
                .iter()
                .filter(|r| window.contains(r.timestamp))
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct MemoryDedup {
        seen: Mutex<HashSet<String>>,
    }

    impl DedupStore for MemoryDedup {
        async fn insert_if_absent(&self, alert_id: &str) -> Result<bool, StoreError> {
            Ok(self.seen.lock().unwrap().insert(alert_id.to_owned()))
        }

        async fn contains(&self, alert_id: &str) -> Result<bool, StoreError> {
            Ok(self.seen.lock().unwrap().contains(alert_id))
        }
    }

    #[derive(Default)]
    struct MemoryNotifier {
        published: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl Notifier for MemoryNotifier {
        async fn publish(&self, subject: &str, message: &str) -> Result<(), StoreError> {
            if self.fail {
                return Err(StoreError::Status {
                    code: 502,
                    body: "bad gateway".to_owned(),
                });
            }
            self.published
                .lock()
                .unwrap()
                .push((subject.to_owned(), message.to_owned()));
            Ok(())
        }
    }

    fn flagged_record(id: &str) -> LogRecord {
        let mut fields = serde_json::Map::new();
        fields.insert("ioc_value".to_owned(), serde_json::json!("1.2.3.4"));
        fields.insert("ioc_kind".to_owned(), serde_json::json!("ip"));
        LogRecord {
            id: id.to_owned(),
            timestamp: Utc::now(),
            source: "edge:fw-01".to_owned(),
            fields,
            ioc_match: true,
            indexed_at: Utc::now(),
        }
    }

    fn clean_record(id: &str) -> LogRecord {
        LogRecord {
            id: id.to_owned(),
            timestamp: Utc::now(),
            source: "edge:fw-01".to_owned(),
            fields: serde_json::Map::new(),
            ioc_match: false,
            indexed_at: Utc::now(),
        }
    }

    fn window() -> CorrelationWindow {
        CorrelationWindow::trailing(Utc::now() + chrono::Duration::seconds(1), 300, 300)
    }

    fn engine(
        records: Vec<LogRecord>,
    ) -> CorrelationEngine<MemorySearch, MemoryDedup, MemoryNotifier, FlagMatchPolicy> {
        CorrelationEngine::new(
            MemorySearch {
                records,
                fail: false,
            },
            MemoryDedup::default(),
            MemoryNotifier::default(),
            FlagMatchPolicy,
        )
    }

    #[tokio::test]
    async fn empty_window_is_success_with_zero_counts() {
        let engine = engine(vec![]);
        let result = engine.run(window()).await.unwrap();
        assert_eq!(result, AlertsEmitted::default());
        assert!(engine.notifier.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_match_publishes_nothing() {
        let engine = engine(vec![clean_record("rec-1"), clean_record("rec-2")]);
        let result = engine.run(window()).await.unwrap();
        assert_eq!(result.matched, 0);
        assert!(engine.notifier.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn matches_publish_one_summary() {
        let engine = engine(vec![
            flagged_record("rec-1"),
            clean_record("rec-2"),
            flagged_record("rec-3"),
        ]);

        let result = engine.run(window()).await.unwrap();
        assert_eq!(result.matched, 2);
        assert_eq!(result.emitted, 2);
        assert_eq!(result.suppressed, 0);

        let published = engine.notifier.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert!(published[0].0.contains("2 new threat alerts"));
    }

    #[tokio::test]
    async fn second_overlapping_run_is_fully_suppressed() {
        let engine = engine(vec![flagged_record("rec-1")]);

        let first = engine.run(window()).await.unwrap();
        assert_eq!(first.emitted, 1);

        let second = engine.run(window()).await.unwrap();
        assert_eq!(second.matched, 1);
        assert_eq!(second.emitted, 0);
        assert_eq!(second.suppressed, 1);

        // 요약은 첫 실행에서 한 번만 발행됨
        assert_eq!(engine.notifier.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn publish_failure_leaves_dedup_unrecorded() {
        let engine = CorrelationEngine::new(
            MemorySearch {
                records: vec![flagged_record("rec-1")],
                fail: false,
            },
            MemoryDedup::default(),
            MemoryNotifier {
                fail: true,
                ..Default::default()
            },
            FlagMatchPolicy,
        );

        let err = engine.run(window()).await.unwrap_err();
        assert!(matches!(err, CorrelationError::Publish(_)));
        // 발행 실패 시 중복 제거 엔트리가 남으면 알림이 영구 유실됨
        assert!(engine.dedup.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_failure_is_a_typed_error() {
        let engine = CorrelationEngine::new(
            MemorySearch {
                records: vec![],
                fail: true,
            },
            MemoryDedup::default(),
            MemoryNotifier::default(),
            FlagMatchPolicy,
        );

        let err = engine.run(window()).await.unwrap_err();
        assert!(matches!(
            err,
            CorrelationError::Query(StoreError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn retry_after_publish_failure_emits_alert() {
        // 첫 실행은 발행 실패, 같은 윈도우의 재시도 실행이 알림을 전달
        let dedup = MemoryDedup::default();
        let failing = CorrelationEngine::new(
            MemorySearch {
                records: vec![flagged_record("rec-1")],
                fail: false,
            },
            dedup,
            MemoryNotifier {
                fail: true,
                ..Default::default()
            },
            FlagMatchPolicy,
        );
        assert!(failing.run(window()).await.is_err());

        let retry = CorrelationEngine::new(
            MemorySearch {
                records: vec![flagged_record("rec-1")],
                fail: false,
            },
            failing.dedup,
            MemoryNotifier::default(),
            FlagMatchPolicy,
        );
        let result = retry.run(window()).await.unwrap();
        assert_eq!(result.emitted, 1);
        assert_eq!(retry.notifier.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sample_size_limits_summary_body() {
        let records: Vec<LogRecord> = (0..10)
            .map(|i| {
                let mut r = flagged_record(&format!("rec-{i}"));
                r.fields
                    .insert("ioc_value".to_owned(), serde_json::json!(format!("10.0.0.{i}")));
                r
            })
            .collect();
        let engine = engine(records).with_sample_size(3);

        let result = engine.run(window()).await.unwrap();
        assert_eq!(result.emitted, 10);

        let published = engine.notifier.published.lock().unwrap();
        assert!(published[0].1.contains("... and 7 more"));
    }
}
