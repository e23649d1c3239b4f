//! 원시 로그 정규화 및 파싱
//!
//! 엣지 수집기가 보내는 원시 유닛은 JSON 객체 하나이거나 객체 배열일 수
//! 있습니다. 이 모호성은 파싱 로직이 실행되기 전에 [`RawEntry`]라는
//! 명시적 태그 변형으로 해소되어 항상 시퀀스로 정규화됩니다.
//!
//! 유닛 하나의 파싱 실패는 배치 전체를 중단시키지 않습니다. 실패는
//! 로깅 후 건너뛰고, 건너뛴 수는 호출자에게 보고됩니다.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use watchpost_core::error::ParseError;
use watchpost_core::types::{LogRecord, doc_id};

/// 유닛당 최대 허용 크기 (바이트)
const MAX_UNIT_SIZE: usize = 1024 * 1024; // 1MB

/// 수집 전송 계층이 전달하는 원시 유닛
///
/// 전송 계층은 소스 식별자와 소스 내 단조 증가 오프셋을 함께 제공하며,
/// 이 둘이 결정적 문서 ID의 재료가 됩니다.
#[derive(Debug, Clone)]
pub struct RawUnit {
    /// 수집 소스 식별자
    pub source: String,
    /// 소스 내 유닛 오프셋
    pub offset: u64,
    /// 원시 JSON 페이로드 (객체 또는 객체 배열)
    pub payload: Bytes,
    /// 수신 시각
    pub received_at: DateTime<Utc>,
}

impl RawUnit {
    /// 새 원시 유닛을 생성합니다.
    pub fn new(source: impl Into<String>, offset: u64, payload: Bytes) -> Self {
        Self {
            source: source.into(),
            offset,
            payload,
            received_at: Utc::now(),
        }
    }
}

/// 객체-또는-배열 모호성을 해소하는 명시적 입력 변형
///
/// 동적 타입 검사 대신 serde의 untagged 역직렬화로 한 번에 분기하고,
/// 이후 모든 코드는 시퀀스만 다룹니다.
#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
pub enum RawEntry {
    /// 레코드 배열
    Many(Vec<serde_json::Value>),
    /// 단일 레코드
    One(serde_json::Value),
}

impl RawEntry {
    /// 항상 시퀀스로 정규화합니다.
    pub fn into_values(self) -> Vec<serde_json::Value> {
        match self {
            Self::Many(values) => values,
            Self::One(value) => vec![value],
        }
    }
}

/// 유닛 하나를 레코드 시퀀스로 파싱합니다.
///
/// 유닛 전체가 잘못된 JSON이면 유닛 단위로 실패를 반환하고,
/// 배열 내 개별 레코드가 잘못된 경우 해당 레코드만 건너뜁니다.
///
/// # Returns
/// `(파싱된 레코드들, 건너뛴 레코드 수)`
pub fn parse_unit(unit: &RawUnit) -> Result<(Vec<LogRecord>, usize), ParseError> {
    if unit.payload.len() > MAX_UNIT_SIZE {
        return Err(ParseError::TooLarge {
            size: unit.payload.len(),
            max: MAX_UNIT_SIZE,
        });
    }

    let entry: RawEntry =
        serde_json::from_slice(&unit.payload).map_err(|e| ParseError::Malformed {
            origin: unit.source.clone(),
            offset: unit.offset,
            reason: e.to_string(),
        })?;

    let values = entry.into_values();
    let mut records = Vec::with_capacity(values.len());
    let mut skipped = 0usize;

    for (item, value) in values.into_iter().enumerate() {
        match parse_record(unit, item, value) {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                tracing::warn!(
                    source = %unit.source,
                    offset = unit.offset,
                    item,
                    error = %e,
                    "skipping malformed record"
                );
            }
        }
    }

    Ok((records, skipped))
}

/// 정규화된 JSON 값 하나를 [`LogRecord`]로 변환합니다.
fn parse_record(
    unit: &RawUnit,
    item: usize,
    value: serde_json::Value,
) -> Result<LogRecord, ParseError> {
    let serde_json::Value::Object(mut fields) = value else {
        return Err(ParseError::Malformed {
            origin: unit.source.clone(),
            offset: unit.offset,
            reason: "expected JSON object".to_owned(),
        });
    };

    // 문서 ID는 항상 전송 계층 키로 계산합니다. 레코드에 내장된
    // source 필드는 표시용 소스로만 쓰입니다. 내장 값으로 ID를
    // 만들면 서로 다른 전송 경로의 레코드가 같은 ID로 충돌합니다.
    let id = doc_id(&unit.source, unit.offset, item);

    let source = match fields.remove("source") {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s,
        _ => unit.source.clone(),
    };

    // timestamp 필드: RFC 3339 문자열. 누락되거나 해석 불가하면
    // 수신 시각으로 대체하고 레코드는 유지합니다.
    let timestamp = match fields.remove("timestamp") {
        Some(serde_json::Value::String(ts)) => DateTime::parse_from_rfc3339(&ts)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(unit.received_at),
        _ => unit.received_at,
    };

    let ioc_match = matches!(fields.remove("ioc_match"), Some(serde_json::Value::Bool(true)));

    Ok(LogRecord {
        id,
        timestamp,
        source,
        fields,
        ioc_match,
        indexed_at: Utc::now(),
    })
}
