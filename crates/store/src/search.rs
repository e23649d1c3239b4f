//! Elasticsearch 호환 저장소 어댑터
//!
//! 하나의 클러스터가 로그, 인디케이터, 중복 제거의 세 인덱스를
//! 담당하므로 어댑터도 하나의 구조체가 세 포트를 모두 구현합니다.
//!
//! - 로그 색인: `_bulk` + 결정적 `_id`. 같은 배치의 재시도는 같은
//!   문서를 덮어쓸 뿐 중복을 만들지 않습니다.
//! - 중복 제거: `_create`의 원자적 put-if-absent 시맨틱. 409는
//!   "이미 존재"이지 실패가 아닙니다.
//! - 인디케이터: 자연 키 문서 ID에 대한 scripted upsert로
//!   `last_seen`만 전진시킵니다.

use chrono::Utc;
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use watchpost_core::config::SearchConfig;
use watchpost_core::error::StoreError;
use watchpost_core::store::{DedupStore, IndicatorStore, SearchStore};
use watchpost_core::types::{CorrelationWindow, Indicator, IndicatorKind, LogRecord};

use crate::http::{build_client, map_request_error, reject_status};

/// 윈도우 쿼리가 한 번에 가져오는 최대 레코드 수
const MAX_WINDOW_DOCS: usize = 10_000;

/// Elasticsearch 호환 저장소 클라이언트
#[derive(Clone)]
pub struct EsStore {
    client: reqwest::Client,
    endpoint: Url,
    log_index: String,
    indicator_index: String,
    dedup_index: String,
}

impl EsStore {
    /// 설정에서 저장소 클라이언트를 생성합니다.
    pub fn new(config: &SearchConfig) -> Result<Self, StoreError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| StoreError::Connection(format!("invalid endpoint: {e}")))?;
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            endpoint,
            log_index: config.log_index.clone(),
            indicator_index: config.indicator_index.clone(),
            dedup_index: config.dedup_index.clone(),
        })
    }

    /// 경로 세그먼트를 이어붙인 URL을 만듭니다.
    ///
    /// 세그먼트는 자동으로 percent-encoding 되므로 `/`가 포함된
    /// 인디케이터 키도 안전합니다.
    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::Connection("endpoint cannot be a base URL".to_owned()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// `_bulk` 요청 본문을 NDJSON으로 구성합니다.
fn bulk_body(index: &str, records: &[LogRecord]) -> Result<String, StoreError> {
    let mut body = String::new();
    for record in records {
        let action = serde_json::json!({"index": {"_index": index, "_id": record.id}});
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&serde_json::to_string(record).map_err(|e| StoreError::Decode(e.to_string()))?);
        body.push('\n');
    }
    Ok(body)
}

/// 윈도우 `[start, end)`에 대한 `_search` 요청 본문을 구성합니다.
fn window_query(window: CorrelationWindow) -> serde_json::Value {
    serde_json::json!({
        "size": MAX_WINDOW_DOCS,
        "query": {
            "range": {
                "timestamp": {
                    "gte": window.start.to_rfc3339(),
                    "lt": window.end.to_rfc3339(),
                }
            }
        },
        "sort": [{"timestamp": {"order": "asc"}}],
    })
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<BulkItem>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(alias = "create", alias = "update")]
    index: Option<BulkOp>,
}

#[derive(Debug, Deserialize)]
struct BulkOp {
    status: u16,
    error: Option<BulkOpError>,
}

#[derive(Debug, Deserialize)]
struct BulkOpError {
    reason: Option<String>,
}

/// 벌크 응답의 부분 실패를 [`StoreError::Bulk`]로 변환합니다.
fn check_bulk_response(resp: &BulkResponse) -> Result<(), StoreError> {
    if !resp.errors {
        return Ok(());
    }

    let mut failed = 0usize;
    let mut first_reason: Option<String> = None;
    for item in &resp.items {
        let Some(op) = &item.index else { continue };
        if op.status >= 400 {
            failed += 1;
            if first_reason.is_none() {
                first_reason = op
                    .error
                    .as_ref()
                    .and_then(|e| e.reason.clone())
                    .or_else(|| Some(format!("status {}", op.status)));
            }
        }
    }

    Err(StoreError::Bulk {
        failed,
        first_reason: first_reason.unwrap_or_else(|| "unknown".to_owned()),
    })
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_source")]
    source: LogRecord,
}

#[derive(Debug, Deserialize)]
struct GetResponse<T> {
    found: bool,
    #[serde(rename = "_source")]
    source: Option<T>,
}

impl SearchStore for EsStore {
    async fn write_batch(&self, records: &[LogRecord]) -> Result<(), StoreError> {
        let body = bulk_body(&self.log_index, records)?;
        let url = self.url(&["_bulk"])?;

        let resp = self
            .client
            .post(url)
            .header("content-type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| map_request_error("bulk_write", e))?;

        if !resp.status().is_success() {
            return Err(reject_status("bulk_write", resp).await);
        }

        let bulk: BulkResponse = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        check_bulk_response(&bulk)
    }

    async fn query_window(&self, window: CorrelationWindow) -> Result<Vec<LogRecord>, StoreError> {
        let url = self.url(&[&self.log_index, "_search"])?;

        let resp = self
            .client
            .post(url)
            .json(&window_query(window))
            .send()
            .await
            .map_err(|e| map_request_error("window_query", e))?;

        if !resp.status().is_success() {
            return Err(reject_status("window_query", resp).await);
        }

        let search: SearchResponse = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(search.hits.hits.into_iter().map(|h| h.source).collect())
    }
}

impl IndicatorStore for EsStore {
    async fn upsert(&self, indicator: &Indicator) -> Result<(), StoreError> {
        let url = self.url(&[&self.indicator_index, "_update", &indicator.key()])?;

        // 이미 존재하면 last_seen만 전진, 없으면 문서 전체를 생성
        let body = serde_json::json!({
            "script": {
                "lang": "painless",
                "source": "if (ctx._source.last_seen.compareTo(params.last_seen) < 0) \
                           { ctx._source.last_seen = params.last_seen }",
                "params": {"last_seen": indicator.last_seen.to_rfc3339()},
            },
            "upsert": indicator,
        });

        let resp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_request_error("indicator_upsert", e))?;

        if !resp.status().is_success() {
            return Err(reject_status("indicator_upsert", resp).await);
        }
        Ok(())
    }

    async fn find(
        &self,
        kind: IndicatorKind,
        value: &str,
    ) -> Result<Option<Indicator>, StoreError> {
        let key = format!("{kind}:{value}");
        let url = self.url(&[&self.indicator_index, "_doc", &key])?;

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_request_error("indicator_find", e))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(reject_status("indicator_find", resp).await);
        }

        let get: GetResponse<Indicator> = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(if get.found { get.source } else { None })
    }
}

impl DedupStore for EsStore {
    async fn insert_if_absent(&self, alert_id: &str) -> Result<bool, StoreError> {
        let url = self.url(&[&self.dedup_index, "_create", alert_id])?;
        let body = serde_json::json!({"recorded_at": Utc::now().to_rfc3339()});

        let resp = self
            .client
            .put(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_request_error("dedup_insert", e))?;

        // _create는 원자적 put-if-absent: 409는 이미 존재한다는 뜻
        if resp.status() == StatusCode::CONFLICT {
            return Ok(false);
        }
        if !resp.status().is_success() {
            return Err(reject_status("dedup_insert", resp).await);
        }
        Ok(true)
    }

    async fn contains(&self, alert_id: &str) -> Result<bool, StoreError> {
        let url = self.url(&[&self.dedup_index, "_doc", alert_id])?;

        let resp = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| map_request_error("dedup_contains", e))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            _ => Err(reject_status("dedup_contains", resp).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> LogRecord {
        LogRecord {
            id: "doc-1".to_owned(),
            timestamp: Utc::now(),
            source: "edge:fw-01".to_owned(),
            fields: serde_json::Map::new(),
            ioc_match: false,
            indexed_at: Utc::now(),
        }
    }

    fn store() -> EsStore {
        EsStore::new(&SearchConfig::default()).unwrap()
    }

    #[test]
    fn bulk_body_pairs_action_and_doc_lines() {
        let records = vec![sample_record(), sample_record()];
        let body = bulk_body("watchpost-logs", &records).unwrap();

        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 4);
        let action: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action["index"]["_index"], "watchpost-logs");
        assert_eq!(action["index"]["_id"], "doc-1");
        let doc: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(doc["source"], "edge:fw-01");
    }

    #[test]
    fn window_query_is_half_open_and_sorted() {
        let window = CorrelationWindow::trailing(Utc::now(), 300, 300);
        let query = window_query(window);

        let range = &query["query"]["range"]["timestamp"];
        assert_eq!(range["gte"], window.start.to_rfc3339());
        assert_eq!(range["lt"], window.end.to_rfc3339());
        assert_eq!(query["sort"][0]["timestamp"]["order"], "asc");
    }

    #[test]
    fn bulk_partial_failure_is_surfaced() {
        let resp: BulkResponse = serde_json::from_str(
            r#"{
                "errors": true,
                "items": [
                    {"index": {"status": 200, "error": null}},
                    {"index": {"status": 429, "error": {"reason": "rejected"}}},
                    {"index": {"status": 500, "error": {"reason": "boom"}}}
                ]
            }"#,
        )
        .unwrap();

        let err = check_bulk_response(&resp).unwrap_err();
        match err {
            StoreError::Bulk {
                failed,
                first_reason,
            } => {
                assert_eq!(failed, 2);
                assert_eq!(first_reason, "rejected");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bulk_success_passes() {
        let resp: BulkResponse =
            serde_json::from_str(r#"{"errors": false, "items": []}"#).unwrap();
        assert!(check_bulk_response(&resp).is_ok());
    }

    #[test]
    fn search_response_parses_sources() {
        let json = serde_json::json!({
            "hits": {"hits": [{"_source": sample_record()}]}
        });
        let resp: SearchResponse = serde_json::from_value(json).unwrap();
        assert_eq!(resp.hits.hits.len(), 1);
        assert_eq!(resp.hits.hits[0].source.id, "doc-1");
    }

    #[test]
    fn url_segments_are_percent_encoded() {
        let store = store();
        let url = store
            .url(&["watchpost-indicators", "_doc", "url:http://evil.example/x"])
            .unwrap();
        // 키에 든 '/'가 그대로 남으면 경로가 깨짐
        assert!(url.as_str().contains("%2F%2Fevil.example%2Fx"));
        assert_eq!(url.path_segments().unwrap().count(), 3);
    }
}
