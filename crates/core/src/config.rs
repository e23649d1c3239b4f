//! 설정 관리 — watchpost.toml 파싱 및 런타임 설정
//!
//! [`WatchpostConfig`]는 모든 컴포넌트의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`WATCHPOST_INTEL_API_KEY=...` 형식)
//! 3. 설정 파일 (`watchpost.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), watchpost_core::error::WatchpostError> {
//! use watchpost_core::config::WatchpostConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = WatchpostConfig::load("watchpost.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = WatchpostConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, WatchpostError};

/// Watchpost 통합 설정
///
/// `watchpost.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 컴포넌트는 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchpostConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 수집/색인 설정
    #[serde(default)]
    pub index: IndexConfig,
    /// 검색 저장소 설정
    #[serde(default)]
    pub search: SearchConfig,
    /// 위협 인텔 피드 설정
    #[serde(default)]
    pub intel: IntelConfig,
    /// 상관분석 엔진 설정
    #[serde(default)]
    pub correlate: CorrelateConfig,
    /// 알림 채널 설정
    #[serde(default)]
    pub notify: NotifyConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl WatchpostConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, WatchpostError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, WatchpostError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WatchpostError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                WatchpostError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, WatchpostError> {
        toml::from_str(toml_str).map_err(|e| {
            WatchpostError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `WATCHPOST_{SECTION}_{FIELD}`
    /// 예: `WATCHPOST_SEARCH_ENDPOINT=http://es:9200`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "WATCHPOST_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "WATCHPOST_GENERAL_LOG_FORMAT");

        // Index
        override_bool(&mut self.index.enabled, "WATCHPOST_INDEX_ENABLED");
        override_string(&mut self.index.ingest_bind, "WATCHPOST_INDEX_INGEST_BIND");
        override_usize(&mut self.index.batch_size, "WATCHPOST_INDEX_BATCH_SIZE");
        override_u64(
            &mut self.index.flush_interval_secs,
            "WATCHPOST_INDEX_FLUSH_INTERVAL_SECS",
        );
        override_usize(
            &mut self.index.buffer_capacity,
            "WATCHPOST_INDEX_BUFFER_CAPACITY",
        );

        // Search store
        override_string(&mut self.search.endpoint, "WATCHPOST_SEARCH_ENDPOINT");
        override_string(&mut self.search.log_index, "WATCHPOST_SEARCH_LOG_INDEX");
        override_string(
            &mut self.search.indicator_index,
            "WATCHPOST_SEARCH_INDICATOR_INDEX",
        );
        override_string(
            &mut self.search.dedup_index,
            "WATCHPOST_SEARCH_DEDUP_INDEX",
        );
        override_u64(&mut self.search.timeout_secs, "WATCHPOST_SEARCH_TIMEOUT_SECS");

        // Intel feed
        override_bool(&mut self.intel.enabled, "WATCHPOST_INTEL_ENABLED");
        override_string(&mut self.intel.feed_url, "WATCHPOST_INTEL_FEED_URL");
        override_string(&mut self.intel.api_key, "WATCHPOST_INTEL_API_KEY");
        override_usize(&mut self.intel.page_size, "WATCHPOST_INTEL_PAGE_SIZE");
        override_u64(&mut self.intel.period_secs, "WATCHPOST_INTEL_PERIOD_SECS");
        override_u64(&mut self.intel.timeout_secs, "WATCHPOST_INTEL_TIMEOUT_SECS");

        // Correlate
        override_bool(&mut self.correlate.enabled, "WATCHPOST_CORRELATE_ENABLED");
        override_u64(
            &mut self.correlate.period_secs,
            "WATCHPOST_CORRELATE_PERIOD_SECS",
        );
        override_u64(
            &mut self.correlate.window_secs,
            "WATCHPOST_CORRELATE_WINDOW_SECS",
        );
        override_u64(
            &mut self.correlate.overlap_secs,
            "WATCHPOST_CORRELATE_OVERLAP_SECS",
        );
        override_string(&mut self.correlate.policy, "WATCHPOST_CORRELATE_POLICY");
        override_u64(
            &mut self.correlate.run_deadline_secs,
            "WATCHPOST_CORRELATE_RUN_DEADLINE_SECS",
        );
        override_usize(
            &mut self.correlate.sample_size,
            "WATCHPOST_CORRELATE_SAMPLE_SIZE",
        );

        // Notify
        override_string(&mut self.notify.webhook_url, "WATCHPOST_NOTIFY_WEBHOOK_URL");
        override_string(
            &mut self.notify.subject_prefix,
            "WATCHPOST_NOTIFY_SUBJECT_PREFIX",
        );
        override_u64(&mut self.notify.timeout_secs, "WATCHPOST_NOTIFY_TIMEOUT_SECS");

        // Metrics
        override_bool(&mut self.metrics.enabled, "WATCHPOST_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "WATCHPOST_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "WATCHPOST_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), WatchpostError> {
        const MAX_BATCH_SIZE: usize = 100_000;
        const MAX_BUFFER_CAPACITY: usize = 10_000_000;

        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.index.batch_size == 0 || self.index.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::InvalidValue {
                field: "index.batch_size".to_owned(),
                reason: format!("must be 1-{MAX_BATCH_SIZE}"),
            }
            .into());
        }

        if self.index.buffer_capacity == 0 || self.index.buffer_capacity > MAX_BUFFER_CAPACITY {
            return Err(ConfigError::InvalidValue {
                field: "index.buffer_capacity".to_owned(),
                reason: format!("must be 1-{MAX_BUFFER_CAPACITY}"),
            }
            .into());
        }

        if self.index.flush_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "index.flush_interval_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.intel.enabled {
            if self.intel.feed_url.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "intel.feed_url".to_owned(),
                    reason: "feed_url must not be empty when intel is enabled".to_owned(),
                }
                .into());
            }
            if self.intel.page_size == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "intel.page_size".to_owned(),
                    reason: "must be greater than 0".to_owned(),
                }
                .into());
            }
            if self.intel.period_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "intel.period_secs".to_owned(),
                    reason: "must be greater than 0".to_owned(),
                }
                .into());
            }
        }

        if self.correlate.enabled {
            let valid_policies = ["flag", "lookup"];
            if !valid_policies.contains(&self.correlate.policy.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "correlate.policy".to_owned(),
                    reason: format!("must be one of: {}", valid_policies.join(", ")),
                }
                .into());
            }

            if self.correlate.period_secs == 0 || self.correlate.window_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "correlate.period_secs".to_owned(),
                    reason: "period_secs and window_secs must be greater than 0".to_owned(),
                }
                .into());
            }

            // 윈도우 불변식: 연속 실행 사이에 시간 공백이 생기면 안 됨.
            // 실행 N의 윈도우 끝과 실행 N+1의 윈도우 시작이 겹치려면
            // 주기가 윈도우+겹침 이하여야 합니다.
            if self.correlate.period_secs > self.correlate.window_secs + self.correlate.overlap_secs
            {
                return Err(ConfigError::InvalidValue {
                    field: "correlate.overlap_secs".to_owned(),
                    reason: format!(
                        "window_secs + overlap_secs ({}) must cover period_secs ({}) \
                         or consecutive windows will skip time",
                        self.correlate.window_secs + self.correlate.overlap_secs,
                        self.correlate.period_secs,
                    ),
                }
                .into());
            }

            if self.correlate.run_deadline_secs == 0
                || self.correlate.run_deadline_secs > self.correlate.period_secs
            {
                return Err(ConfigError::InvalidValue {
                    field: "correlate.run_deadline_secs".to_owned(),
                    reason: "must be 1..=period_secs".to_owned(),
                }
                .into());
            }
        }

        if self.search.endpoint.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "search.endpoint".to_owned(),
                reason: "endpoint must not be empty".to_owned(),
            }
            .into());
        }

        if self.search.timeout_secs == 0 || self.notify.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "search.timeout_secs".to_owned(),
                reason: "timeouts must be greater than 0".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 수집/색인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// NDJSON 수집 리스너 바인드 주소
    pub ingest_bind: String,
    /// 배치 크기 (이 개수만큼 모이면 플러시)
    pub batch_size: usize,
    /// 배치 플러시 간격 (초)
    pub flush_interval_secs: u64,
    /// 인메모리 버퍼 최대 용량
    pub buffer_capacity: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ingest_bind: "0.0.0.0:4517".to_owned(),
            batch_size: 500,
            flush_interval_secs: 5,
            buffer_capacity: 50_000,
        }
    }
}

/// 검색 저장소 접속 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// 저장소 엔드포인트 URL
    pub endpoint: String,
    /// 로그 레코드 인덱스명
    pub log_index: String,
    /// 인디케이터 인덱스명
    pub indicator_index: String,
    /// 중복 제거 인덱스명
    pub dedup_index: String,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9200".to_owned(),
            log_index: "watchpost-logs".to_owned(),
            indicator_index: "watchpost-indicators".to_owned(),
            dedup_index: "watchpost-alerts-seen".to_owned(),
            timeout_secs: 10,
        }
    }
}

/// 위협 인텔 피드 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntelConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 피드 베이스 URL
    pub feed_url: String,
    /// API 키 (환경변수 `WATCHPOST_INTEL_API_KEY` 권장)
    pub api_key: String,
    /// 페이지당 최대 인디케이터 수
    pub page_size: usize,
    /// 수집 주기 (초, 기본 1시간)
    pub period_secs: u64,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for IntelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            feed_url: "https://intel.example.com/v1".to_owned(),
            api_key: String::new(),
            page_size: 500,
            period_secs: 3600,
            timeout_secs: 30,
        }
    }
}

/// 상관분석 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelateConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 실행 주기 (초, 기본 5분)
    pub period_secs: u64,
    /// 트레일링 윈도우 크기 (초, 기본 5분)
    pub window_secs: u64,
    /// 윈도우 겹침 (초) — 색인 지연 흡수용, 기본값은 한 주기 이상
    pub overlap_secs: u64,
    /// 매칭 정책 ("flag" 또는 "lookup")
    pub policy: String,
    /// 실행당 데드라인 (초) — 초과 시 실행을 버리고 다음 틱 진행
    pub run_deadline_secs: u64,
    /// 요약 알림에 포함할 샘플 알림 수
    pub sample_size: usize,
}

impl Default for CorrelateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period_secs: 300,
            window_secs: 300,
            overlap_secs: 300,
            policy: "lookup".to_owned(),
            run_deadline_secs: 60,
            sample_size: 5,
        }
    }
}

/// 알림 채널 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// 웹훅 URL
    pub webhook_url: String,
    /// 알림 제목 접두어
    pub subject_prefix: String,
    /// 발행 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: "http://localhost:9900/notify".to_owned(),
            subject_prefix: "[watchpost]".to_owned(),
            timeout_secs: 10,
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 리슨 주소
    pub listen_addr: String,
    /// 리슨 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9598,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = WatchpostConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert!(config.index.enabled);
        assert_eq!(config.correlate.period_secs, 300);
        assert_eq!(config.intel.period_secs, 3600);
        assert_eq!(config.correlate.policy, "lookup");
    }

    #[test]
    fn default_config_passes_validation() {
        let config = WatchpostConfig::default();
        config.validate().unwrap();
    }

    #[test]
    fn default_overlap_covers_one_period() {
        let config = WatchpostConfig::default();
        assert!(config.correlate.overlap_secs >= config.correlate.period_secs);
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let config = WatchpostConfig::parse("").unwrap();
        assert_eq!(config.search.log_index, "watchpost-logs");
    }

    #[test]
    fn parse_partial_toml_merges_with_defaults() {
        let toml = r#"
[general]
log_level = "debug"

[correlate]
period_secs = 60
window_secs = 60
overlap_secs = 60
run_deadline_secs = 30
"#;
        let config = WatchpostConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        // log_format은 기본값 유지
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.correlate.period_secs, 60);
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_unknown_policy() {
        let mut config = WatchpostConfig::default();
        config.correlate.policy = "heuristic".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_window_gap() {
        // 주기 600초인데 윈도우+겹침이 400초면 시간이 스킵됨
        let mut config = WatchpostConfig::default();
        config.correlate.period_secs = 600;
        config.correlate.window_secs = 300;
        config.correlate.overlap_secs = 100;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("overlap_secs"));
    }

    #[test]
    fn validate_rejects_deadline_beyond_period() {
        let mut config = WatchpostConfig::default();
        config.correlate.run_deadline_secs = config.correlate.period_secs + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let mut config = WatchpostConfig::default();
        config.index.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_feed_url_when_enabled() {
        let mut config = WatchpostConfig::default();
        config.intel.feed_url.clear();
        assert!(config.validate().is_err());
        // 비활성화하면 통과
        config.intel.enabled = false;
        config.validate().unwrap();
    }

    #[test]
    #[serial]
    fn env_override_applies_string_and_number() {
        // SAFETY: serial 테스트 내에서만 환경변수를 변경함
        unsafe {
            std::env::set_var("WATCHPOST_SEARCH_ENDPOINT", "http://es:9200");
            std::env::set_var("WATCHPOST_CORRELATE_PERIOD_SECS", "120");
        }
        let mut config = WatchpostConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.search.endpoint, "http://es:9200");
        assert_eq!(config.correlate.period_secs, 120);
        unsafe {
            std::env::remove_var("WATCHPOST_SEARCH_ENDPOINT");
            std::env::remove_var("WATCHPOST_CORRELATE_PERIOD_SECS");
        }
    }

    #[test]
    #[serial]
    fn env_override_ignores_bad_number() {
        unsafe {
            std::env::set_var("WATCHPOST_INDEX_BATCH_SIZE", "not-a-number");
        }
        let mut config = WatchpostConfig::default();
        let before = config.index.batch_size;
        config.apply_env_overrides();
        assert_eq!(config.index.batch_size, before);
        unsafe {
            std::env::remove_var("WATCHPOST_INDEX_BATCH_SIZE");
        }
    }

    #[tokio::test]
    async fn from_file_reports_missing_file() {
        let err = WatchpostConfig::from_file("/nonexistent/watchpost.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WatchpostError::Config(ConfigError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn from_file_parses_valid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchpost.toml");
        tokio::fs::write(&path, "[general]\nlog_level = \"warn\"\n")
            .await
            .unwrap();
        let config = WatchpostConfig::from_file(&path).await.unwrap();
        assert_eq!(config.general.log_level, "warn");
    }
}
