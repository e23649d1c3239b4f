//! 피드 항목 정규화
//!
//! 피드가 내려주는 원시 항목을 저장소의 [`Indicator`]로 변환합니다.
//! 피드마다 유형 표기가 다르므로 ([`IndicatorKind::from_feed`] 참고)
//! 매핑되지 않는 유형도 버리지 않고 unknown으로 보존합니다.

use chrono::{DateTime, Utc};

use watchpost_core::store::FeedEntry;
use watchpost_core::types::{Indicator, IndicatorKind};

/// 피드 항목 하나를 인디케이터로 정규화합니다.
///
/// 값이 비어있으면 `None`을 반환하여 호출자가 건너뛰도록 합니다.
/// `observed_at`은 이번 수집 실행의 관찰 시각이며 `first_seen`과
/// `last_seen`의 초기값이 됩니다. 업서트 시 이미 존재하는
/// 인디케이터는 `last_seen`만 전진합니다.
pub fn normalize_entry(entry: &FeedEntry, observed_at: DateTime<Utc>) -> Option<Indicator> {
    let value = entry.indicator.trim();
    if value.is_empty() {
        return None;
    }

    Some(Indicator {
        kind: IndicatorKind::from_feed(entry.kind.as_deref()),
        value: value.to_owned(),
        first_seen: observed_at,
        last_seen: observed_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: Option<&str>, value: &str) -> FeedEntry {
        FeedEntry {
            kind: kind.map(str::to_owned),
            indicator: value.to_owned(),
        }
    }

    #[test]
    fn known_kinds_map() {
        let now = Utc::now();
        let ind = normalize_entry(&entry(Some("ipv4"), "1.2.3.4"), now).unwrap();
        assert_eq!(ind.kind, IndicatorKind::Ip);
        assert_eq!(ind.value, "1.2.3.4");
        assert_eq!(ind.first_seen, now);
        assert_eq!(ind.last_seen, now);
    }

    #[test]
    fn missing_kind_is_preserved_as_unknown() {
        let ind = normalize_entry(&entry(None, "whatever"), Utc::now()).unwrap();
        assert_eq!(ind.kind, IndicatorKind::Unknown);
    }

    #[test]
    fn unrecognized_kind_is_preserved_as_unknown() {
        let ind = normalize_entry(&entry(Some("yara-rule"), "rule x"), Utc::now()).unwrap();
        assert_eq!(ind.kind, IndicatorKind::Unknown);
    }

    #[test]
    fn empty_value_is_skipped() {
        assert!(normalize_entry(&entry(Some("ip"), "   "), Utc::now()).is_none());
    }

    #[test]
    fn value_is_trimmed() {
        let ind = normalize_entry(&entry(Some("domain"), " evil.example \n"), Utc::now()).unwrap();
        assert_eq!(ind.value, "evil.example");
    }
}
