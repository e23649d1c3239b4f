//! Tracing setup for the daemon.
//!
//! The filter comes from `RUST_LOG` when set, otherwise from the
//! `[general]` section of watchpost.toml. Output format is either
//! JSON lines for log shippers or pretty output for a terminal.

use anyhow::{Context, bail};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use watchpost_core::config::GeneralConfig;

/// Install the global tracing subscriber.
///
/// Call once at startup before the orchestrator spawns any task.
/// A second call fails because the global subscriber is already set.
pub fn init_tracing(config: &GeneralConfig) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
        other => bail!("unknown log format {other:?}, expected \"json\" or \"pretty\""),
    }
    .context("tracing subscriber already installed")?;

    Ok(())
}
