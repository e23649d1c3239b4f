//! 수집 버퍼 -- 인메모리 버퍼 및 배치 플러시
//!
//! [`IngestBuffer`]는 수집된 원시 유닛을 인메모리에 버퍼링하고,
//! 배치 크기 또는 시간 간격에 따라 인덱서로 플러시합니다.
//!
//! # 오버플로우 정책
//! 버퍼가 가득 찬 경우:
//! - [`DropPolicy::Oldest`]: 가장 오래된 유닛을 드롭
//! - [`DropPolicy::Newest`]: 새 유입을 거부

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use watchpost_core::metrics::{INDEXER_BUFFER_SIZE, INDEXER_UNITS_DROPPED_TOTAL};

use crate::normalize::RawUnit;

/// 버퍼 오버플로우 시 드롭 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropPolicy {
    /// 가장 오래된 유닛을 드롭하고 새 유닛을 받습니다.
    #[default]
    Oldest,
    /// 새 유닛을 거부합니다.
    Newest,
}

/// 인메모리 수집 버퍼
///
/// 수집된 원시 유닛을 임시 저장하고, 배치 단위로 인덱서에 전달합니다.
/// 버퍼 용량이 초과되면 설정된 드롭 정책에 따라 유닛을 제거합니다.
pub struct IngestBuffer {
    /// 버퍼 내부 저장소
    buffer: VecDeque<RawUnit>,
    /// 최대 용량
    capacity: usize,
    /// 드롭 정책
    drop_policy: DropPolicy,
    /// 드롭된 유닛 카운터 (통계용)
    dropped_count: u64,
    /// 총 유입 유닛 카운터
    total_received: u64,
}

impl IngestBuffer {
    /// 새 수집 버퍼를 생성합니다.
    pub fn new(capacity: usize, drop_policy: DropPolicy) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity.min(10_000)),
            capacity,
            drop_policy,
            dropped_count: 0,
            total_received: 0,
        }
    }

    /// 유닛을 버퍼에 추가합니다.
    ///
    /// 버퍼가 가득 찬 경우 드롭 정책에 따라 처리합니다.
    /// 드롭이 발생하면 `true`를 반환합니다.
    pub fn push(&mut self, unit: RawUnit) -> bool {
        self.total_received += 1;

        let dropped = if self.buffer.len() >= self.capacity {
            match self.drop_policy {
                DropPolicy::Oldest => {
                    self.buffer.pop_front();
                    self.dropped_count += 1;
                    tracing::warn!(
                        dropped = self.dropped_count,
                        capacity = self.capacity,
                        "buffer full, dropped oldest unit"
                    );
                    self.buffer.push_back(unit);
                    true
                }
                DropPolicy::Newest => {
                    self.dropped_count += 1;
                    tracing::warn!(
                        dropped = self.dropped_count,
                        capacity = self.capacity,
                        "buffer full, rejected new unit"
                    );
                    true
                }
            }
        } else {
            self.buffer.push_back(unit);
            false
        };

        if dropped {
            metrics::counter!(INDEXER_UNITS_DROPPED_TOTAL).increment(1);
        }
        metrics::gauge!(INDEXER_BUFFER_SIZE).set(self.buffer.len() as f64);
        dropped
    }

    /// 배치 크기만큼 또는 버퍼에 남은 만큼 유닛을 드레인합니다.
    ///
    /// 버퍼가 비어있으면 빈 Vec을 반환합니다.
    pub fn drain_batch(&mut self, batch_size: usize) -> Vec<RawUnit> {
        let count = batch_size.min(self.buffer.len());
        let batch: Vec<RawUnit> = self.buffer.drain(..count).collect();
        metrics::gauge!(INDEXER_BUFFER_SIZE).set(self.buffer.len() as f64);
        batch
    }

    /// 버퍼의 모든 유닛을 드레인합니다.
    pub fn drain_all(&mut self) -> Vec<RawUnit> {
        let all: Vec<RawUnit> = self.buffer.drain(..).collect();
        metrics::gauge!(INDEXER_BUFFER_SIZE).set(0.0);
        all
    }

    /// 현재 버퍼에 저장된 유닛 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// 버퍼가 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// 버퍼 최대 용량을 반환합니다.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 지금까지 드롭된 유닛 수를 반환합니다.
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }

    /// 총 유입 유닛 수를 반환합니다.
    pub fn total_received(&self) -> u64 {
        self.total_received
    }

    /// 배치 플러시 조건을 확인합니다.
    ///
    /// 버퍼에 `batch_size` 이상의 유닛이 있으면 `true`를 반환합니다.
    pub fn should_flush(&self, batch_size: usize) -> bool {
        self.buffer.len() >= batch_size
    }
}
