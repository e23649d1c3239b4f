//! 매칭 정책 -- 레코드가 위협 인디케이터와 매칭되는지 판정
//!
//! 두 정책을 제공합니다:
//! - [`FlagMatchPolicy`]: 업스트림 인리치먼트가 설정한 `ioc_match`
//!   플래그를 신뢰합니다. 저장소 조회가 없어 가장 저렴합니다.
//! - [`LookupMatchPolicy`]: 레코드의 후보 필드를 인디케이터 저장소에서
//!   능동 조회합니다. 인리치먼트 없는 환경의 기본 정책입니다.

use watchpost_core::error::CorrelationError;
use watchpost_core::store::IndicatorStore;
use watchpost_core::types::{Indicator, IndicatorKind, LogRecord};

/// 레코드 한 건을 평가하는 매칭 정책
///
/// 매칭되면 알림 생성에 쓰일 인디케이터를 반환합니다.
pub trait MatchPolicy: Send + Sync {
    /// 레코드를 평가합니다.
    fn evaluate(
        &self,
        record: &LogRecord,
    ) -> impl std::future::Future<Output = Result<Option<Indicator>, CorrelationError>> + Send;
}

/// `ioc_match` 플래그 기반 정책
///
/// 업스트림 인리치먼트가 이미 인디케이터 대조를 마친 환경에서
/// 사용합니다. 플래그가 설정된 레코드는 매칭으로 판정하며,
/// 인디케이터 값은 인리치먼트가 남긴 `ioc_value` 필드를 사용합니다.
/// 필드가 없으면 알림 ID의 결정성을 위해 고정 값으로 대체합니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagMatchPolicy;

impl MatchPolicy for FlagMatchPolicy {
    async fn evaluate(&self, record: &LogRecord) -> Result<Option<Indicator>, CorrelationError> {
        if !record.ioc_match {
            return Ok(None);
        }

        let value = record
            .field_str("ioc_value")
            .unwrap_or_else(|| "flagged".to_owned());
        let kind = IndicatorKind::from_feed(record.field_str("ioc_kind").as_deref());

        Ok(Some(Indicator {
            kind,
            value,
            first_seen: record.timestamp,
            last_seen: record.timestamp,
        }))
    }
}

/// 인디케이터 유형별 후보 필드 테이블
///
/// 유형이 맞지 않는 필드는 조회하지 않습니다. IP 인디케이터를
/// 도메인 필드와 대조하는 낭비를 막습니다.
const LOOKUP_FIELDS: &[(&str, IndicatorKind)] = &[
    ("source_ip", IndicatorKind::Ip),
    ("dest_ip", IndicatorKind::Ip),
    ("client_ip", IndicatorKind::Ip),
    ("remote_addr", IndicatorKind::Ip),
    ("domain", IndicatorKind::Domain),
    ("hostname", IndicatorKind::Domain),
    ("query", IndicatorKind::Domain),
    ("url", IndicatorKind::Url),
    ("uri", IndicatorKind::Url),
    ("file_hash", IndicatorKind::Hash),
    ("sha256", IndicatorKind::Hash),
    ("md5", IndicatorKind::Hash),
];

/// 인디케이터 저장소 능동 조회 정책
///
/// 레코드의 후보 필드를 순서대로 조회하고 첫 매칭을 반환합니다.
/// 조회 실패는 매칭 안 됨이 아니라 실행 실패로 전파됩니다.
pub struct LookupMatchPolicy<I: IndicatorStore> {
    indicators: I,
}

impl<I: IndicatorStore> LookupMatchPolicy<I> {
    /// 새 조회 정책을 생성합니다.
    pub fn new(indicators: I) -> Self {
        Self { indicators }
    }
}

impl<I: IndicatorStore> MatchPolicy for LookupMatchPolicy<I> {
    async fn evaluate(&self, record: &LogRecord) -> Result<Option<Indicator>, CorrelationError> {
        for (field, kind) in LOOKUP_FIELDS {
            let Some(value) = record.field_str(field) else {
                continue;
            };

            let found = self
                .indicators
                .find(*kind, &value)
                .await
                .map_err(CorrelationError::Lookup)?;

            if let Some(indicator) = found {
                return Ok(Some(indicator));
            }
        }

        Ok(None)
    }
}
