//! Tracing setup for the node.
//!
//! Each subcommand has its own default filter. `RUST_LOG` replaces it
//! wholesale when set. Output goes to stderr; stdout is reserved for the
//! snapshot `simulate` prints.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter for `run`: vault and pool activity at info, one span per
/// HTTP request.
pub const SERVE_FILTER: &str =
    "yieldvault_node=info,yieldvault=info,yieldvault_contracts=info,tower_http=debug";

/// Default filter for `simulate`. Rejected operations and unwinds are
/// expected there, so the vault only reports warnings.
pub const SIMULATE_FILTER: &str = "yieldvault_node=info,yieldvault=warn,yieldvault_contracts=warn";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines with the emitting module.
    Pretty,
    /// One JSON object per event.
    Json,
}

/// `RUST_LOG` if it parses, `default_filter` otherwise.
fn filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails if a subscriber is already installed.
pub fn init_logging(default_filter: &str, format: LogFormat) -> Result<()> {
    let env_filter = filter(default_filter);
    let directives = env_filter.to_string();

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init(),
    }
    .context("tracing subscriber already installed")?;

    tracing::debug!(?format, filter = %directives, "tracing ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filters_parse() {
        for directives in [SERVE_FILTER, SIMULATE_FILTER] {
            assert!(EnvFilter::try_new(directives).is_ok(), "{directives}");
        }
    }

    #[test]
    fn simulate_keeps_the_vault_quiet() {
        assert!(SIMULATE_FILTER.contains("yieldvault=warn"));
        assert!(SERVE_FILTER.contains("yieldvault=info"));
    }
}
