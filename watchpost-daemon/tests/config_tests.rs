//! Daemon-level configuration loading tests.

use std::io::Write;

use tempfile::NamedTempFile;

use watchpost_daemon::orchestrator::Orchestrator;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn builds_from_valid_config_file() {
    let file = write_config(
        r#"
[general]
log_level = "debug"

[metrics]
enabled = false

[search]
endpoint = "http://es.internal:9200"
"#,
    );

    let orchestrator = Orchestrator::build(file.path()).await.unwrap();
    assert_eq!(orchestrator.config().general.log_level, "debug");
    assert_eq!(
        orchestrator.config().search.endpoint,
        "http://es.internal:9200"
    );
    // 파일에 없는 섹션은 기본값
    assert_eq!(orchestrator.config().correlate.period_secs, 300);
}

#[tokio::test]
async fn missing_config_file_is_an_error() {
    let result = Orchestrator::build(std::path::Path::new("/nonexistent/watchpost.toml")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn malformed_toml_is_an_error() {
    let file = write_config("this is not toml [[[");
    assert!(Orchestrator::build(file.path()).await.is_err());
}

#[tokio::test]
async fn window_invariant_violation_is_rejected() {
    // 주기가 윈도우+겹침보다 크면 연속 실행 사이에 시간 공백이 생김
    let file = write_config(
        r#"
[metrics]
enabled = false

[correlate]
period_secs = 900
window_secs = 300
overlap_secs = 60
"#,
    );

    let result = Orchestrator::build(file.path()).await;
    assert!(result.is_err());
    let msg = result.err().unwrap().to_string();
    assert!(msg.contains("overlap_secs"), "unexpected error: {msg}");
}
