//! 인덱서 에러 타입
//!
//! [`IndexerError`]는 수집/버퍼링/색인 경로에서 발생하는 에러를 표현합니다.
//! `From<IndexerError> for WatchpostError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use watchpost_core::error::{IndexError, WatchpostError};

/// 인덱서 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    /// 수집기 에러 (소켓 바인드, 읽기 실패 등)
    #[error("collector error: {reason}")]
    Collector {
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// 색인 배치 에러
    #[error(transparent)]
    Index(#[from] IndexError),
}

impl From<IndexerError> for WatchpostError {
    fn from(err: IndexerError) -> Self {
        match err {
            IndexerError::Index(e) => WatchpostError::Index(e),
            other => WatchpostError::Io(std::io::Error::other(other.to_string())),
        }
    }
}
