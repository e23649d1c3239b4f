#![doc = include_str!("../README.md")]

pub mod engine;
pub mod policy;
pub mod publisher;

pub use engine::CorrelationEngine;
pub use policy::{FlagMatchPolicy, LookupMatchPolicy, MatchPolicy};
pub use publisher::compose_summary;
