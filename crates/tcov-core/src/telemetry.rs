//! Tracing subscriber setup
//!
//! Filtering follows `TCOV_LOG` (falling back to `RUST_LOG`, then `info`).

use crate::config::LogFormat;
use tracing_subscriber::EnvFilter;

/// Variable holding the filter directives
pub const LOG_ENV: &str = "TCOV_LOG";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber
///
/// Returns `false` if a subscriber was already installed, which is the
/// normal case when several tests initialise tracing.
pub fn init_tracing(format: LogFormat) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true);
    let installed = match format {
        LogFormat::Text => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    };
    if installed {
        tracing::debug!(?format, "Tracing initialized");
    }
    installed
}
