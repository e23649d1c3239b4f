//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 크레이트는 이 상수를 사용하여 `metrics::counter!()`,
//! `metrics::gauge!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `watchpost_`
//! - 컴포넌트명: `indexer_`, `intel_`, `correlate_`
//! - 접미어: `_total` (counter), 없음 (gauge)

use metrics::{describe_counter, describe_gauge};

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 인디케이터 유형 레이블 키 (ip, domain, hash, url, unknown)
pub const LABEL_KIND: &str = "kind";

// ─── Indexer 메트릭 ────────────────────────────────────────────────

/// Indexer: 색인된 레코드 수 (counter)
pub const INDEXER_RECORDS_INDEXED_TOTAL: &str = "watchpost_indexer_records_indexed_total";

/// Indexer: 파싱 실패로 건너뛴 레코드 수 (counter)
pub const INDEXER_RECORDS_SKIPPED_TOTAL: &str = "watchpost_indexer_records_skipped_total";

/// Indexer: 버퍼 오버플로우로 드롭된 유닛 수 (counter)
pub const INDEXER_UNITS_DROPPED_TOTAL: &str = "watchpost_indexer_units_dropped_total";

/// Indexer: 버퍼 내 유닛 수 (gauge)
pub const INDEXER_BUFFER_SIZE: &str = "watchpost_indexer_buffer_size";

// ─── Intel 메트릭 ──────────────────────────────────────────────────

/// Intel: 업서트된 인디케이터 수 (counter, label: kind)
pub const INTEL_INDICATORS_UPSERTED_TOTAL: &str = "watchpost_intel_indicators_upserted_total";

/// Intel: 수집 실행 수 (counter, label: result)
pub const INTEL_FETCH_RUNS_TOTAL: &str = "watchpost_intel_fetch_runs_total";

// ─── Correlate 메트릭 ──────────────────────────────────────────────

/// Correlate: 상관분석 실행 수 (counter, label: result)
pub const CORRELATE_RUNS_TOTAL: &str = "watchpost_correlate_runs_total";

/// Correlate: 윈도우에서 스캔된 레코드 수 (counter)
pub const CORRELATE_RECORDS_SCANNED_TOTAL: &str = "watchpost_correlate_records_scanned_total";

/// Correlate: 매칭된 레코드/인디케이터 쌍 수 (counter)
pub const CORRELATE_MATCHES_TOTAL: &str = "watchpost_correlate_matches_total";

/// Correlate: 발행된 알림 수 (counter)
pub const CORRELATE_ALERTS_EMITTED_TOTAL: &str = "watchpost_correlate_alerts_emitted_total";

/// Correlate: 중복 제거로 억제된 알림 수 (counter)
pub const CORRELATE_ALERTS_SUPPRESSED_TOTAL: &str = "watchpost_correlate_alerts_suppressed_total";

/// Correlate: 발행 실패 수 (counter)
pub const CORRELATE_PUBLISH_FAILURES_TOTAL: &str = "watchpost_correlate_publish_failures_total";

/// 모든 메트릭의 설명을 등록합니다.
///
/// Prometheus 레코더 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    describe_counter!(
        INDEXER_RECORDS_INDEXED_TOTAL,
        "Records successfully indexed into the search store"
    );
    describe_counter!(
        INDEXER_RECORDS_SKIPPED_TOTAL,
        "Records skipped due to parse failures"
    );
    describe_counter!(
        INDEXER_UNITS_DROPPED_TOTAL,
        "Raw units dropped due to buffer overflow"
    );
    describe_gauge!(INDEXER_BUFFER_SIZE, "Raw units currently buffered");
    describe_counter!(
        INTEL_INDICATORS_UPSERTED_TOTAL,
        "Indicators upserted into the indicator store"
    );
    describe_counter!(INTEL_FETCH_RUNS_TOTAL, "Threat feed fetch runs by result");
    describe_counter!(CORRELATE_RUNS_TOTAL, "Correlation runs by result");
    describe_counter!(
        CORRELATE_RECORDS_SCANNED_TOTAL,
        "Records scanned by correlation windows"
    );
    describe_counter!(
        CORRELATE_MATCHES_TOTAL,
        "Record/indicator pairs matched by the active policy"
    );
    describe_counter!(CORRELATE_ALERTS_EMITTED_TOTAL, "Alerts newly emitted");
    describe_counter!(
        CORRELATE_ALERTS_SUPPRESSED_TOTAL,
        "Alerts suppressed by the dedup store"
    );
    describe_counter!(
        CORRELATE_PUBLISH_FAILURES_TOTAL,
        "Summary notifications that failed to publish"
    );
}
