#![doc = include_str!("../README.md")]

pub mod fetcher;
pub mod normalize;

pub use fetcher::{FetchOutcome, IntelFetcher};
pub use normalize::normalize_entry;
