//! 위협 피드 수집기
//!
//! 외부 피드를 페이지 단위로 순회하며 인디케이터를 정규화해
//! 저장소에 업서트합니다. 실행 중 피드 호출이나 업서트가 실패하면
//! 실행을 중단하고 에러를 반환합니다. 같은 호출 내 재시도는 없으며,
//! 다음 스케줄 틱이 재시도 메커니즘입니다. 업서트가 멱등이므로
//! 중단 전에 업서트된 인디케이터는 그대로 남아도 안전합니다.

use chrono::Utc;
use tracing::{debug, info, warn};

use watchpost_core::error::FetchError;
use watchpost_core::metrics::{
    INTEL_FETCH_RUNS_TOTAL, INTEL_INDICATORS_UPSERTED_TOTAL, LABEL_KIND, LABEL_RESULT,
};
use watchpost_core::store::{IndicatorStore, ThreatFeed};

use crate::normalize::normalize_entry;

/// 한 실행이 순회할 수 있는 최대 페이지 수
///
/// 커서가 순환하는 잘못된 피드로부터 실행을 보호합니다.
const MAX_PAGES_PER_RUN: usize = 10_000;

/// 수집 실행 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    /// 순회한 페이지 수
    pub pages: usize,
    /// 업서트된 인디케이터 수
    pub upserted: usize,
    /// 값이 비어 건너뛴 항목 수
    pub skipped: usize,
}

/// 위협 피드 수집기
///
/// 피드와 인디케이터 저장소를 생성자 주입으로 받습니다.
pub struct IntelFetcher<F: ThreatFeed, I: IndicatorStore> {
    feed: F,
    store: I,
}

impl<F: ThreatFeed, I: IndicatorStore> IntelFetcher<F, I> {
    /// 새 수집기를 생성합니다.
    pub fn new(feed: F, store: I) -> Self {
        Self { feed, store }
    }

    /// 피드 전체를 한 번 순회하며 인디케이터를 업서트합니다.
    ///
    /// 커서는 피드가 내려준 값을 그대로 되돌려주는 불투명 토큰으로
    /// 취급합니다. `next_cursor`가 없으면 마지막 페이지입니다.
    pub async fn fetch_and_upsert(&self) -> Result<FetchOutcome, FetchError> {
        let observed_at = Utc::now();
        let mut outcome = FetchOutcome::default();
        let mut cursor: Option<String> = None;

        loop {
            if outcome.pages >= MAX_PAGES_PER_RUN {
                metrics::counter!(INTEL_FETCH_RUNS_TOTAL, LABEL_RESULT => "error").increment(1);
                return Err(FetchError::BadPage {
                    reason: format!("cursor did not terminate after {MAX_PAGES_PER_RUN} pages"),
                });
            }

            let page = match self.feed.fetch_page(cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    metrics::counter!(INTEL_FETCH_RUNS_TOTAL, LABEL_RESULT => "error").increment(1);
                    return Err(FetchError::Feed(e));
                }
            };
            outcome.pages += 1;

            debug!(
                page = outcome.pages,
                entries = page.entries.len(),
                has_next = page.next_cursor.is_some(),
                "fetched feed page"
            );

            for entry in &page.entries {
                let Some(indicator) = normalize_entry(entry, observed_at) else {
                    outcome.skipped += 1;
                    warn!(kind = ?entry.kind, "skipping feed entry with empty value");
                    continue;
                };

                if let Err(e) = self.store.upsert(&indicator).await {
                    metrics::counter!(INTEL_FETCH_RUNS_TOTAL, LABEL_RESULT => "error").increment(1);
                    return Err(FetchError::Feed(e));
                }
                metrics::counter!(INTEL_INDICATORS_UPSERTED_TOTAL, LABEL_KIND => indicator.kind.to_string())
                    .increment(1);
                outcome.upserted += 1;
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        metrics::counter!(INTEL_FETCH_RUNS_TOTAL, LABEL_RESULT => "ok").increment(1);

        info!(
            pages = outcome.pages,
            upserted = outcome.upserted,
            skipped = outcome.skipped,
            "feed fetch run completed"
        );

        Ok(outcome)
    }
}
