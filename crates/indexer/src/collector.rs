//! TCP NDJSON 수집기
//!
//! 엣지 수집기가 보내는 newline-delimited JSON 유닛을 TCP 소켓으로
//! 수신합니다. 한 줄이 유닛 하나이며, 객체 또는 객체 배열입니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, mpsc};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::IndexerError;
use crate::normalize::RawUnit;

/// 수집기 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorStatus {
    /// 생성됨, 아직 시작 전
    Idle,
    /// 연결 수락 중
    Running,
    /// 종료됨
    Stopped,
}

/// TCP NDJSON 수집기 설정
#[derive(Debug, Clone)]
pub struct IngestTcpConfig {
    /// 바인드 주소 (예: "0.0.0.0:4517")
    pub bind_addr: String,
    /// 최대 동시 연결 수
    pub max_connections: usize,
    /// 최대 유닛 크기 (바이트)
    pub max_unit_size: usize,
    /// 연결 타임아웃 (초)
    pub connection_timeout_secs: u64,
}

impl Default for IngestTcpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:4517".to_owned(),
            max_connections: 256,
            max_unit_size: 1024 * 1024, // 1MB
            connection_timeout_secs: 300,
        }
    }
}

/// TCP NDJSON 수집기
///
/// 각 TCP 연결은 별도의 tokio 태스크에서 처리됩니다.
/// 수신한 유닛은 소스 식별자와 단조 증가 오프셋을 붙여
/// 채널로 전달합니다. 오프셋은 수집기 수명 동안 전역 단조 증가이므로
/// 같은 수집기를 거친 유닛의 문서 ID는 서로 충돌하지 않습니다.
pub struct IngestTcpCollector {
    /// 수집기 설정
    config: IngestTcpConfig,
    /// 수집된 유닛 전송 채널
    tx: mpsc::Sender<RawUnit>,
    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,
    /// 현재 상태
    status: CollectorStatus,
    /// 전역 유닛 오프셋 카운터
    next_offset: Arc<AtomicU64>,
}

impl IngestTcpCollector {
    /// 새 TCP NDJSON 수집기를 생성합니다.
    pub fn new(
        config: IngestTcpConfig,
        tx: mpsc::Sender<RawUnit>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            tx,
            cancel_token,
            status: CollectorStatus::Idle,
            next_offset: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 수집기를 시작합니다.
    ///
    /// TCP 소켓에 바인드하고 연결 수락 루프를 실행합니다.
    /// 각 연결은 별도 태스크에서 처리됩니다.
    /// CancellationToken을 통해 graceful shutdown을 지원합니다.
    pub async fn run(&mut self) -> Result<(), IndexerError> {
        self.status = CollectorStatus::Running;
        info!("Starting TCP ingest collector on {}", self.config.bind_addr);

        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(|e| IndexerError::Collector {
                reason: format!("failed to bind to {}: {}", self.config.bind_addr, e),
            })?;

        info!("TCP ingest collector listening on {}", self.config.bind_addr);

        // 연결 수 제한을 위한 세마포어
        let connection_semaphore = Arc::new(Semaphore::new(self.config.max_connections));

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, addr) = result.map_err(|e| IndexerError::Collector {
                        reason: format!("accept error: {e}"),
                    })?;

                    debug!("Accepted connection from {}", addr);

                    let permit = match connection_semaphore.clone().try_acquire_owned() {
                        Ok(p) => p,
                        Err(_) => {
                            warn!(
                                "Max connections reached, rejecting connection from {}",
                                addr
                            );
                            continue;
                        }
                    };

                    let tx = self.tx.clone();
                    let config = self.config.clone();
                    let bind_addr = self.config.bind_addr.clone();
                    let cancel = self.cancel_token.clone();
                    let next_offset = self.next_offset.clone();

                    // 각 연결을 별도 태스크에서 처리
                    tokio::spawn(async move {
                        if let Err(e) =
                            Self::handle_connection(stream, tx, config, bind_addr, next_offset, cancel).await
                        {
                            error!("Connection handler error: {}", e);
                        }
                        drop(permit); // 연결 종료 시 세마포어 반환
                    });
                }
                _ = self.cancel_token.cancelled() => {
                    info!("TCP ingest collector received shutdown signal");
                    self.status = CollectorStatus::Stopped;
                    break;
                }
            }
        }

        Ok(())
    }

    /// 단일 TCP 연결을 newline 프레이밍으로 처리합니다.
    async fn handle_connection(
        stream: TcpStream,
        tx: mpsc::Sender<RawUnit>,
        config: IngestTcpConfig,
        bind_addr: String,
        next_offset: Arc<AtomicU64>,
        cancel: CancellationToken,
    ) -> Result<(), IndexerError> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_owned());
        let source = format!("tcp:{bind_addr}[{peer_addr}]");

        let mut reader = BufReader::new(stream);
        let mut line_buffer = String::new();
        let connection_timeout = Duration::from_secs(config.connection_timeout_secs);
        // newline 없이 쏟아지는 스트림이 버퍼를 무한정 키우지 못하도록
        // 줄 단위 읽기를 유닛 상한 + 1 바이트로 제한합니다. 상한을
        // 넘긴 줄은 newline 없이 잘린 채 반환되어 아래 크기 검사에
        // 걸립니다.
        let line_cap = config.max_unit_size as u64 + 1;

        loop {
            line_buffer.clear();
            let mut limited_reader = (&mut reader).take(line_cap);

            tokio::select! {
                result = timeout(
                    connection_timeout,
                    limited_reader.read_line(&mut line_buffer),
                ) => {
                    match result {
                        Ok(Ok(0)) => {
                            // EOF - 연결 종료
                            debug!("Connection closed by peer: {}", peer_addr);
                            break;
                        }
                        Ok(Ok(_bytes_read)) => {
                            if line_buffer.len() > config.max_unit_size {
                                warn!(
                                    "Unit exceeds max size from {} ({} bytes, max: {}), closing connection",
                                    peer_addr,
                                    line_buffer.len(),
                                    config.max_unit_size
                                );
                                break;
                            }

                            // 빈 라인 스킵
                            if line_buffer.trim().is_empty() {
                                continue;
                            }

                            let payload = Bytes::from(line_buffer.trim_end().to_owned());
                            let offset = next_offset.fetch_add(1, Ordering::Relaxed);
                            let unit = RawUnit::new(source.clone(), offset, payload);

                            if let Err(e) = tx.send(unit).await {
                                error!("Failed to send unit to channel: {}", e);
                                return Err(IndexerError::Channel(e.to_string()));
                            }
                        }
                        Ok(Err(e)) => {
                            error!("Read error from {}: {}", peer_addr, e);
                            return Err(IndexerError::Collector {
                                reason: format!("read error: {e}"),
                            });
                        }
                        Err(_) => {
                            warn!("Connection timeout from {}", peer_addr);
                            return Err(IndexerError::Collector {
                                reason: "connection timeout".to_owned(),
                            });
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("Connection handler for {} received shutdown signal", peer_addr);
                    break;
                }
            }
        }

        Ok(())
    }

    /// 바인드 주소를 반환합니다.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// 현재 상태를 반환합니다.
    pub fn status(&self) -> CollectorStatus {
        self.status
    }
}
