//! 요약 알림 구성
//!
//! 한 실행의 새 알림 전체를 요약 알림 하나로 묶습니다. 알림 폭주
//! 상황에서도 하류 채널에는 실행당 한 건만 전달됩니다.

use watchpost_core::types::{Alert, CorrelationWindow};

/// 새 알림 목록을 제목/본문 쌍으로 구성합니다.
///
/// 본문에는 총 건수와 최대 `sample_size`개의 샘플 알림 메시지가
/// 들어갑니다. 나머지는 건수로만 표기합니다.
pub fn compose_summary(
    prefix: &str,
    window: CorrelationWindow,
    alerts: &[Alert],
    sample_size: usize,
) -> (String, String) {
    let subject = format!(
        "{prefix} {} new threat alert{}",
        alerts.len(),
        if alerts.len() == 1 { "" } else { "s" },
    );

    let mut body = format!(
        "{} alert(s) in window {}\n\n",
        alerts.len(),
        window,
    );

    for alert in alerts.iter().take(sample_size) {
        body.push_str("- ");
        body.push_str(&alert.message);
        body.push('\n');
    }

    if alerts.len() > sample_size {
        body.push_str(&format!("... and {} more\n", alerts.len() - sample_size));
    }

    (subject, body)
}
