//! HTTP 공통 유틸리티 -- 클라이언트 생성과 에러 매핑

use std::time::Duration;

use watchpost_core::error::StoreError;

/// 타임아웃이 적용된 HTTP 클라이언트를 생성합니다.
pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client, StoreError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(timeout_secs.min(10)))
        .build()
        .map_err(|e| StoreError::Connection(e.to_string()))
}

/// reqwest 에러를 도메인 에러로 매핑합니다.
///
/// 타임아웃은 별도 변형으로 구분하여 운영자가 느린 저장소와
/// 죽은 저장소를 구분할 수 있게 합니다.
pub fn map_request_error(operation: &str, e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout {
            operation: operation.to_owned(),
        }
    } else if e.is_decode() {
        StoreError::Decode(e.to_string())
    } else {
        StoreError::Connection(e.to_string())
    }
}

/// 비성공 응답을 [`StoreError::Status`]로 변환합니다.
pub async fn reject_status(operation: &str, resp: reqwest::Response) -> StoreError {
    let code = resp.status().as_u16();
    let body = resp
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
    // 본문이 길면 앞부분만 남김
    let body: String = body.chars().take(512).collect();
    tracing::warn!(operation, code, "request rejected");
    StoreError::Status { code, body }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_with_timeout() {
        assert!(build_client(10).is_ok());
    }
}
