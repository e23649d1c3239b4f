#![doc = include_str!("../README.md")]
//!
//! # 내부 아키텍처
//! ```text
//! TCP NDJSON -> mpsc -> IngestBuffer -> normalize/parse -> SearchStore bulk write
//! ```

pub mod buffer;
pub mod collector;
pub mod error;
pub mod indexer;
pub mod normalize;

// --- 주요 타입 re-export ---

pub use buffer::{DropPolicy, IngestBuffer};
pub use collector::{CollectorStatus, IngestTcpCollector, IngestTcpConfig};
pub use error::IndexerError;
pub use indexer::{IndexOutcome, LogIndexer};
pub use normalize::{RawEntry, RawUnit};
