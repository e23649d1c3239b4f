#![doc = include_str!("../README.md")]

pub mod feed;
mod http;
pub mod notify;
pub mod search;

pub use feed::HttpFeed;
pub use notify::WebhookNotifier;
pub use search::EsStore;
