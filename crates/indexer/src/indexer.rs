//! 로그 인덱서 -- 원시 유닛 배치를 정규화하여 검색 저장소에 색인
//!
//! 배치 내 유닛 하나의 실패가 배치 전체를 중단시키지 않습니다.
//! 파싱 실패는 건너뛰고 카운트하며, 저장소 쓰기 실패만 배치 실패로
//! 전파됩니다. 결정적 문서 ID 덕분에 실패한 배치의 재시도는 중복
//! 문서를 만들지 않습니다.

use watchpost_core::error::IndexError;
use watchpost_core::metrics::{INDEXER_RECORDS_INDEXED_TOTAL, INDEXER_RECORDS_SKIPPED_TOTAL};
use watchpost_core::store::SearchStore;
use watchpost_core::types::LogRecord;

use crate::normalize::{self, RawUnit};

/// 배치 색인 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOutcome {
    /// 색인된 레코드 수
    pub indexed: usize,
    /// 파싱 실패로 건너뛴 레코드/유닛 수
    pub skipped: usize,
}

/// 로그 인덱서
///
/// 검색 저장소는 생성자 주입으로 받습니다. 테스트에서는 인메모리
/// 대역으로 교체합니다.
pub struct LogIndexer<S: SearchStore> {
    store: S,
}

impl<S: SearchStore> LogIndexer<S> {
    /// 새 인덱서를 생성합니다.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// 원시 유닛 배치를 파싱하여 검색 저장소에 벌크 쓰기합니다.
    ///
    /// 빈 배치는 거부됩니다. 모든 유닛이 파싱에 실패하면 쓰기 없이
    /// 성공으로 처리되고 건너뛴 수만 보고됩니다.
    pub async fn index(&self, units: &[RawUnit]) -> Result<IndexOutcome, IndexError> {
        if units.is_empty() {
            return Err(IndexError::EmptyBatch);
        }

        let mut records: Vec<LogRecord> = Vec::new();
        let mut skipped = 0usize;

        for unit in units {
            match normalize::parse_unit(unit) {
                Ok((parsed, unit_skipped)) => {
                    skipped += unit_skipped;
                    records.extend(parsed);
                }
                Err(e) => {
                    // 유닛 전체 불량: 유닛 단위로 건너뜀
                    skipped += 1;
                    tracing::warn!(
                        source = %unit.source,
                        offset = unit.offset,
                        error = %e,
                        "skipping malformed unit"
                    );
                }
            }
        }

        if !records.is_empty() {
            self.store.write_batch(&records).await?;
        }

        metrics::counter!(INDEXER_RECORDS_INDEXED_TOTAL).increment(records.len() as u64);
        metrics::counter!(INDEXER_RECORDS_SKIPPED_TOTAL).increment(skipped as u64);

        tracing::debug!(
            indexed = records.len(),
            skipped,
            units = units.len(),
            "indexed batch"
        );

        Ok(IndexOutcome {
            indexed: records.len(),
            skipped,
        })
    }

    /// 내부 저장소 참조를 반환합니다.
    pub fn store(&self) -> &S {
        &self.store
    }
}
