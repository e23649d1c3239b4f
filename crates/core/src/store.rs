//! 포트 trait — 외부 협력자 능력 인터페이스
//!
//! 코어는 검색 저장소, 인디케이터 저장소, 중복 제거 저장소, 알림 채널,
//! 위협 피드를 소유하지 않습니다. 각 컴포넌트는 이 trait들을 생성자
//! 주입으로 받아 사용하며, 테스트에서는 인메모리 대역으로 교체합니다.
//!
//! 모든 연산은 제한된 타임아웃을 적용하고, 타임아웃을
//! [`StoreError::Timeout`](crate::error::StoreError::Timeout)으로 표면화해야
//! 합니다. 어떤 연산도 무기한 블로킹하지 않습니다.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::types::{CorrelationWindow, Indicator, IndicatorKind, LogRecord};

/// 검색 가능한 로그 저장소
///
/// 쓰기 확인(ack) 이후에만 해당 레코드가 상관분석 엔진의 쿼리에
/// 보일 수 있습니다. 저장소는 read-after-write 일관성을 보장하지
/// 않으므로, 윈도우 겹침과 중복 제거가 색인 지연을 흡수합니다.
pub trait SearchStore: Send + Sync {
    /// 레코드 배치를 벌크 쓰기합니다.
    ///
    /// 같은 배치의 재시도 쓰기는 결정적 문서 ID 덕분에 중복 문서를
    /// 만들지 않아야 합니다.
    fn write_batch(
        &self,
        records: &[LogRecord],
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// 타임스탬프가 윈도우 `[start, end)`에 속하는 레코드를 조회합니다.
    fn query_window(
        &self,
        window: CorrelationWindow,
    ) -> impl std::future::Future<Output = Result<Vec<LogRecord>, StoreError>> + Send;
}

/// 인디케이터 저장소
///
/// `(kind, value)`를 자연 키로 하는 멱등 업서트를 제공합니다.
pub trait IndicatorStore: Send + Sync {
    /// 인디케이터를 업서트합니다.
    ///
    /// 이미 존재하면 `last_seen`만 전진하고 중복을 만들지 않습니다.
    fn upsert(
        &self,
        indicator: &Indicator,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// 유형과 값으로 인디케이터를 조회합니다 (능동 조회 매칭 정책용).
    fn find(
        &self,
        kind: IndicatorKind,
        value: &str,
    ) -> impl std::future::Future<Output = Result<Option<Indicator>, StoreError>> + Send;
}

/// 알림 중복 제거 저장소
///
/// 동시/겹침 실행에 대한 유일한 안전 장치이므로,
/// [`insert_if_absent`](DedupStore::insert_if_absent)는 read-then-write가
/// 아닌 원자적 insert-if-absent 시맨틱이어야 합니다.
pub trait DedupStore: Send + Sync {
    /// 알림 ID가 없으면 원자적으로 삽입합니다.
    ///
    /// `true`면 새로 삽입된 것이고, `false`면 이미 존재합니다.
    fn insert_if_absent(
        &self,
        alert_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    /// 알림 ID 존재 여부를 확인합니다.
    ///
    /// 발행 전 사전 필터로만 사용되는 비권위적 읽기입니다.
    /// 권위적 기록은 항상 `insert_if_absent`입니다.
    fn contains(
        &self,
        alert_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;
}

/// 하류 알림 채널
pub trait Notifier: Send + Sync {
    /// 제목과 본문을 발행하고 전달 확인을 기다립니다.
    fn publish(
        &self,
        subject: &str,
        message: &str,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

/// 위협 인디케이터 피드의 한 페이지
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPage {
    /// 페이지 내 원시 인디케이터 항목
    pub entries: Vec<FeedEntry>,
    /// 다음 페이지 커서 (없으면 마지막 페이지)
    pub next_cursor: Option<String>,
}

/// 피드가 내려주는 원시 인디케이터 항목
///
/// `kind`가 누락될 수 있으며, 정규화 단계에서 명시적 unknown으로
/// 보존됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEntry {
    /// 인디케이터 유형 문자열 (피드 원문 그대로)
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// 인디케이터 값
    pub indicator: String,
}

/// 외부 위협 인디케이터 피드
pub trait ThreatFeed: Send + Sync {
    /// 피드의 한 페이지를 가져옵니다.
    ///
    /// `cursor`가 `None`이면 첫 페이지입니다. 페이지 크기는
    /// 어댑터 설정으로 제한됩니다.
    fn fetch_page(
        &self,
        cursor: Option<&str>,
    ) -> impl std::future::Future<Output = Result<FeedPage, StoreError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_entry_deserializes_missing_type() {
        let entry: FeedEntry = serde_json::from_str(r#"{"indicator":"1.2.3.4"}"#).unwrap();
        assert_eq!(entry.kind, None);
        assert_eq!(entry.indicator, "1.2.3.4");
    }

    #[test]
    fn feed_page_deserializes_with_cursor() {
        let page: FeedPage = serde_json::from_str(
            r#"{"entries":[{"type":"ip","indicator":"1.2.3.4"}],"next_cursor":"abc"}"#,
        )
        .unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.next_cursor.as_deref(), Some("abc"));
    }
}
