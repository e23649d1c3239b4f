//! 에러 타입 — 도메인별 에러 정의
//!
//! 모든 실패는 "작업이 없었음"(성공, 0 카운트)과 "작업이 있었지만
//! 완료하지 못함"(실패)을 구분할 수 있도록 충분한 정보를 담습니다.

/// Watchpost 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum WatchpostError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 개별 레코드 파싱 에러
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// 색인 배치 에러
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// 위협 피드 수집 에러
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// 상관분석 실행 에러
    #[error("correlation error: {0}")]
    Correlation(#[from] CorrelationError),

    /// 알림 발행 에러
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    /// 외부 저장소 에러
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 개별 레코드 파싱 에러
///
/// 배치 내 한 레코드의 파싱 실패는 배치 전체를 중단시키지 않습니다.
/// 인덱서는 이 에러를 로깅하고 건너뛴 뒤 카운트만 보고합니다.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// 형식이 잘못된 레코드
    #[error("malformed record from {origin} at offset {offset}: {reason}")]
    Malformed {
        /// 수집 소스 (`source`는 thiserror의 에러 체인 필드명이라 피함)
        origin: String,
        /// 배치 내 오프셋
        offset: u64,
        /// 실패 사유
        reason: String,
    },

    /// 타임스탬프 해석 실패
    #[error("bad timestamp '{value}': {reason}")]
    BadTimestamp { value: String, reason: String },

    /// 입력 크기 초과
    #[error("input too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },
}

/// 외부 저장소/HTTP 협력자 에러
///
/// 모든 외부 호출은 제한된 타임아웃을 적용하며, 타임아웃은
/// 행(hang)이 아니라 [`StoreError::Timeout`]으로 표면화됩니다.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 연결 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 비성공 HTTP 상태
    #[error("unexpected status {code}: {body}")]
    Status { code: u16, body: String },

    /// 제한 시간 초과
    #[error("operation '{operation}' timed out")]
    Timeout { operation: String },

    /// 벌크 쓰기 내 부분 실패
    #[error("bulk write failed for {failed} item(s): {first_reason}")]
    Bulk { failed: usize, first_reason: String },

    /// 응답 본문 해석 실패
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// 색인 배치 에러
///
/// 저장소 쓰기 실패는 배치를 중단하고 보고합니다.
/// 재전달은 업스트림(수집 전송 계층)의 책임입니다.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// 빈 배치는 계약 위반
    #[error("batch must not be empty")]
    EmptyBatch,

    /// 저장소 쓰기 실패
    #[error("store write failed: {0}")]
    Store(#[from] StoreError),
}

/// 위협 피드 수집 에러
///
/// 실행은 중단되며 같은 호출 내에서 재시도하지 않습니다.
/// 다음 스케줄 틱이 재시도 메커니즘입니다.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// 피드 호출 실패 (네트워크, 비성공 상태, 잘못된 자격증명)
    #[error("feed request failed: {0}")]
    Feed(#[from] StoreError),

    /// 피드 페이지 해석 실패
    #[error("bad feed page: {reason}")]
    BadPage { reason: String },
}

/// 상관분석 실행 에러
///
/// 실행이 중단되어도 부분 알림 상태는 커밋되지 않습니다.
/// 중복 제거 엔트리는 발행이 확인된 알림에 대해서만 기록됩니다.
#[derive(Debug, thiserror::Error)]
pub enum CorrelationError {
    /// 검색 저장소 쿼리 실패
    #[error("window query failed: {0}")]
    Query(StoreError),

    /// 매칭 정책의 인디케이터 조회 실패
    #[error("indicator lookup failed: {0}")]
    Lookup(StoreError),

    /// 중복 제거 저장소 접근 실패
    #[error("dedup store failed: {0}")]
    Dedup(StoreError),

    /// 알림 발행 실패 — 탐지는 됐지만 전달되지 못함
    ///
    /// 운영자가 전달 공백을 탐지 공백과 구분할 수 있도록
    /// 별도 변형으로 유지합니다.
    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),

    /// 실행 데드라인 초과 — 다음 틱이 독립적으로 진행
    #[error("run exceeded deadline of {budget_secs}s")]
    Deadline { budget_secs: u64 },
}

/// 알림 발행 에러
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// 알림 채널 전달 실패
    #[error("notification channel failed: {0}")]
    Channel(#[from] StoreError),
}
