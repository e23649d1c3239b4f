//! 위협 인디케이터 피드 HTTP 클라이언트
//!
//! `GET {feed_url}/indicators?limit=N[&cursor=C]` 형태의 커서
//! 페이지네이션 API를 호출합니다. 커서는 피드가 내려준 값을 그대로
//! 되돌려주는 불투명 토큰입니다.

use reqwest::Url;

use watchpost_core::config::IntelConfig;
use watchpost_core::error::StoreError;
use watchpost_core::store::{FeedPage, ThreatFeed};

use crate::http::{build_client, map_request_error, reject_status};

/// HTTP 위협 피드 클라이언트
#[derive(Clone)]
pub struct HttpFeed {
    client: reqwest::Client,
    feed_url: Url,
    api_key: String,
    page_size: usize,
}

impl HttpFeed {
    /// 설정에서 피드 클라이언트를 생성합니다.
    pub fn new(config: &IntelConfig) -> Result<Self, StoreError> {
        let feed_url = Url::parse(&config.feed_url)
            .map_err(|e| StoreError::Connection(format!("invalid feed url: {e}")))?;
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            feed_url,
            api_key: config.api_key.clone(),
            page_size: config.page_size,
        })
    }

    /// 페이지 요청 URL을 구성합니다.
    fn page_url(&self, cursor: Option<&str>) -> Result<Url, StoreError> {
        let mut url = self.feed_url.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::Connection("feed url cannot be a base URL".to_owned()))?
            .pop_if_empty()
            .push("indicators");

        url.query_pairs_mut()
            .append_pair("limit", &self.page_size.to_string());
        if let Some(cursor) = cursor {
            url.query_pairs_mut().append_pair("cursor", cursor);
        }
        Ok(url)
    }
}

impl ThreatFeed for HttpFeed {
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<FeedPage, StoreError> {
        let url = self.page_url(cursor)?;

        let mut req = self.client.get(url);
        if !self.api_key.is_empty() {
            req = req.header("x-api-key", &self.api_key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| map_request_error("feed_fetch", e))?;

        if !resp.status().is_success() {
            return Err(reject_status("feed_fetch", resp).await);
        }

        resp.json::<FeedPage>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}
