//! Tracing subscriber setup for the resolver binary.

use gridzero_types::{GridzeroError, LoggingConfig, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Filter directive for a level: our crates at `level`, everything else at `warn`.
#[must_use]
pub fn default_directive(level: &str) -> String {
    format!("warn,gridzero={level},gridzero_types={level},gridzero_ledger={level},gridzero_prover={level},gridzero_attestation={level},gridzero_resolver={level}")
}

/// Install the global subscriber. `RUST_LOG` wins over the configured
/// level; each `-v` on the command line raises it one step.
pub fn init_logging(config: &LoggingConfig, cli_verbose: u8) -> Result<()> {
    let level = match cli_verbose {
        0 => config.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(default_directive(level)),
    }
    .map_err(|e| GridzeroError::Configuration(format!("logging filter: {e}")))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry
            .with(fmt::layer().json().with_current_span(true).with_target(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    installed.map_err(|e| GridzeroError::Configuration(format!("logging already initialised: {e}")))
}
