//! Logging setup.

use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::LogConfig;
use crate::error::{SdkError, SdkResult};

/// Install a global `fmt` subscriber filtered by `config.filter`.
///
/// `RUST_LOG`, when set, takes precedence over the configured filter.
/// Calling this again after a subscriber is installed is a no-op.
pub fn init_tracing(config: &LogConfig) -> SdkResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| SdkError::Config(format!("log.filter {:?}: {e}", config.filter)))?,
    };
    let _ = Registry::default()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
    Ok(())
}
