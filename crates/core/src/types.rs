//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 파이프라인의 모든 크레이트가 공유하는 데이터 구조를 정의합니다.
//! 식별자는 재시도 간 안정성을 위해 결정적(UUID v5)으로 생성됩니다.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 결정적 식별자 생성에 사용하는 고정 네임스페이스
///
/// 이 값이 바뀌면 기존에 색인된 문서/알림 ID와의 호환성이 깨집니다.
const ID_NAMESPACE: Uuid = Uuid::from_u128(0x3f1c_9a07_5d42_4b8e_9c60_aa51_7e2d_84f3);

/// 소스, 유닛 오프셋, 유닛 내 항목 인덱스에서 결정적 문서 ID를 생성합니다.
///
/// 동일한 `(source, offset, item)` 조합은 항상 동일한 ID를 반환하므로,
/// 같은 배치를 재전송해도 저장소에 중복 문서가 생기지 않습니다.
/// `item`은 하나의 수집 유닛이 레코드 배열인 경우 배열 내 위치입니다.
pub fn doc_id(source: &str, offset: u64, item: usize) -> String {
    Uuid::new_v5(
        &ID_NAMESPACE,
        format!("{source}:{offset}:{item}").as_bytes(),
    )
    .to_string()
}

/// 레코드 ID와 인디케이터 값에서 결정적 알림 ID를 생성합니다.
///
/// 같은 상관분석 결과를 재시도해도 동일한 ID가 나오므로,
/// 중복 제거 저장소에서 재전송을 감지할 수 있습니다.
pub fn alert_id(record_id: &str, indicator_value: &str) -> String {
    Uuid::new_v5(
        &ID_NAMESPACE,
        format!("{record_id}\u{1f}{indicator_value}").as_bytes(),
    )
    .to_string()
}

/// 색인된 로그 레코드
///
/// 색인 시점 이후에는 불변이며, 보존 정책(외부 관심사)에 의해서만
/// 삭제됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// 결정적 문서 ID ([`doc_id`])
    pub id: String,
    /// 원본 이벤트 발생 시각
    pub timestamp: DateTime<Utc>,
    /// 수집 소스 식별자 (예: "edge:fw-01")
    pub source: String,
    /// 구조화 필드 (키 → JSON 값)
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
    /// 업스트림 인리치먼트가 설정하는 IOC 매칭 플래그
    #[serde(default)]
    pub ioc_match: bool,
    /// 색인 시각 (인덱서가 태깅)
    pub indexed_at: DateTime<Utc>,
}

impl LogRecord {
    /// 필드 값을 문자열로 추출합니다.
    ///
    /// 문자열 값은 그대로, 숫자 값은 10진 표기로 반환합니다.
    /// 그 외 타입(객체, 배열, bool, null)은 `None`입니다.
    pub fn field_str(&self, name: &str) -> Option<String> {
        match self.fields.get(name)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} source={} ts={} ioc_match={}",
            &self.id[..8.min(self.id.len())],
            self.source,
            self.timestamp.to_rfc3339(),
            self.ioc_match,
        )
    }
}

/// 위협 인디케이터 유형
///
/// 피드가 내려주는 알 수 없는 유형은 버리지 않고 [`IndicatorKind::Unknown`]으로
/// 보존합니다 (인텔을 조용히 폐기하지 않는다는 정책).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorKind {
    /// IP 주소
    Ip,
    /// 도메인명
    Domain,
    /// 파일 해시
    Hash,
    /// URL
    Url,
    /// 알 수 없는 유형 (명시적 보존)
    Unknown,
}

impl IndicatorKind {
    /// 피드의 type 문자열을 유형으로 변환합니다.
    ///
    /// 누락되거나 인식할 수 없는 값은 [`IndicatorKind::Unknown`]입니다.
    pub fn from_feed(raw: Option<&str>) -> Self {
        match raw.map(str::to_lowercase).as_deref() {
            Some("ip" | "ipv4" | "ipv6" | "ip-addr") => Self::Ip,
            Some("domain" | "hostname" | "fqdn") => Self::Domain,
            Some("hash" | "md5" | "sha1" | "sha256") => Self::Hash,
            Some("url" | "uri") => Self::Url,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip => write!(f, "ip"),
            Self::Domain => write!(f, "domain"),
            Self::Hash => write!(f, "hash"),
            Self::Url => write!(f, "url"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// 위협 인디케이터
///
/// `(kind, value)` 쌍이 자연 키입니다. 업서트는 멱등해야 하며,
/// 같은 인디케이터를 재수집하면 `last_seen`만 전진합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Indicator {
    /// 인디케이터 유형
    pub kind: IndicatorKind,
    /// 인디케이터 값 (IP 문자열, 도메인, 해시 등)
    pub value: String,
    /// 최초 관측 시각
    pub first_seen: DateTime<Utc>,
    /// 최근 관측 시각
    pub last_seen: DateTime<Utc>,
}

impl Indicator {
    /// 자연 키 문자열을 반환합니다 (저장소 문서 ID로 사용).
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.value)
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind, self.value)
    }
}

/// 상관분석 윈도우 — 반개구간 `[start, end)`
///
/// 한 번의 상관분석 실행이 스캔하는 시간 범위입니다.
/// 연속 실행의 윈도우는 시간을 건너뛰지 않아야 하며, 색인 지연을
/// 흡수하기 위한 의도적 겹침은 중복 제거로 처리됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationWindow {
    /// 시작 (포함)
    pub start: DateTime<Utc>,
    /// 끝 (미포함)
    pub end: DateTime<Utc>,
}

impl CorrelationWindow {
    /// `[now - window - overlap, now)` 형태의 트레일링 윈도우를 만듭니다.
    pub fn trailing(now: DateTime<Utc>, window_secs: u64, overlap_secs: u64) -> Self {
        let span = Duration::seconds((window_secs + overlap_secs) as i64);
        Self {
            start: now - span,
            end: now,
        }
    }

    /// 타임스탬프가 윈도우에 포함되는지 확인합니다.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }

    /// 윈도우 길이를 초 단위로 반환합니다.
    pub fn span_secs(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

impl fmt::Display for CorrelationWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// 상관분석 매칭으로 생성된 알림
///
/// 발행된 이후에는 종결 상태이며 변경되지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// 결정적 알림 ID ([`alert_id`])
    pub id: String,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
    /// 매칭된 로그 레코드
    pub record: LogRecord,
    /// 매칭된 인디케이터
    pub indicator: Indicator,
    /// 사람이 읽을 수 있는 요약 메시지
    pub message: String,
}

impl Alert {
    /// 레코드/인디케이터 쌍에서 알림을 생성합니다.
    ///
    /// ID는 결정적이므로 같은 쌍에 대해 언제 만들어도 동일합니다.
    pub fn from_match(record: LogRecord, indicator: Indicator) -> Self {
        let id = alert_id(&record.id, &indicator.value);
        let message = format!(
            "indicator {} matched record {} from source {}",
            indicator, record.id, record.source,
        );
        Self {
            id,
            created_at: Utc::now(),
            record,
            indicator,
            message,
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "alert[{}] {} record={}",
            &self.id[..8.min(self.id.len())],
            self.indicator,
            self.record.id,
        )
    }
}

/// 상관분석 실행 결과 집계
///
/// 매칭/발행/억제 수가 모두 0이어도 성공입니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertsEmitted {
    /// 윈도우에서 매칭된 레코드/인디케이터 쌍 수
    pub matched: usize,
    /// 새로 발행된 알림 수
    pub emitted: usize,
    /// 중복 제거로 억제된 알림 수
    pub suppressed: usize,
}
