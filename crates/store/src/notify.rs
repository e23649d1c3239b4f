//! 웹훅 알림 발행 어댑터
//!
//! 요약 알림을 `{"subject": ..., "message": ...}` JSON으로 웹훅에
//! POST합니다. 2xx 응답이 전달 확인입니다.

use reqwest::Url;
use serde::Serialize;

use watchpost_core::config::NotifyConfig;
use watchpost_core::error::StoreError;
use watchpost_core::store::Notifier;

use crate::http::{build_client, map_request_error, reject_status};

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    message: &'a str,
}

/// 웹훅 알림 발행자
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: Url,
}

impl WebhookNotifier {
    /// 설정에서 발행자를 생성합니다.
    pub fn new(config: &NotifyConfig) -> Result<Self, StoreError> {
        let webhook_url = Url::parse(&config.webhook_url)
            .map_err(|e| StoreError::Connection(format!("invalid webhook url: {e}")))?;
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            webhook_url,
        })
    }
}

impl Notifier for WebhookNotifier {
    async fn publish(&self, subject: &str, message: &str) -> Result<(), StoreError> {
        let resp = self
            .client
            .post(self.webhook_url.clone())
            .json(&WebhookPayload { subject, message })
            .send()
            .await
            .map_err(|e| map_request_error("notify_publish", e))?;

        if !resp.status().is_success() {
            return Err(reject_status("notify_publish", resp).await);
        }

        tracing::debug!(subject, "published notification");
        Ok(())
    }
}
