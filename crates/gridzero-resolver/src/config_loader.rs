//! Configuration loading: TOML file, then environment overrides, then
//! validation.
//!
//! Secrets can stay out of the file entirely:
//!
//! | Variable                       | Overrides                   |
//! |--------------------------------|-----------------------------|
//! | `GRIDZERO_RESOLVER_KEY`        | `credentials.resolver_key`  |
//! | `GRIDZERO_RANDOMNESS_SECRET`   | `randomness.secret`         |
//! | `GRIDZERO_ATTESTATION_API_KEY` | `attestation.api_key`       |
//! | `GRIDZERO_LEDGER_ENDPOINT`     | `ledger.endpoint`           |

use std::path::Path;

use gridzero_types::{GridzeroError, ResolverConfig, Result, Secret};
use tracing::{debug, info};

pub const ENV_RESOLVER_KEY: &str = "GRIDZERO_RESOLVER_KEY";
pub const ENV_RANDOMNESS_SECRET: &str = "GRIDZERO_RANDOMNESS_SECRET";
pub const ENV_ATTESTATION_API_KEY: &str = "GRIDZERO_ATTESTATION_API_KEY";
pub const ENV_LEDGER_ENDPOINT: &str = "GRIDZERO_LEDGER_ENDPOINT";

/// Load `path` (or defaults when `None`), apply process environment
/// overrides and validate.
pub fn load(path: Option<&Path>) -> Result<ResolverConfig> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                GridzeroError::Configuration(format!("read {}: {e}", path.display()))
            })?;
            info!(path = %path.display(), "configuration loaded");
            from_toml_str(&text)?
        }
        None => {
            info!("no configuration file given; using defaults");
            ResolverConfig::default()
        }
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

pub fn from_toml_str(text: &str) -> Result<ResolverConfig> {
    toml::from_str(text).map_err(|e| GridzeroError::Configuration(format!("invalid TOML: {e}")))
}

/// Apply overrides found through `lookup`. Empty values are ignored.
pub fn apply_env_overrides(config: &mut ResolverConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    if let Some(key) = get(ENV_RESOLVER_KEY) {
        debug!(var = ENV_RESOLVER_KEY, "override applied");
        config.credentials.resolver_key = Some(Secret::new(key.trim()));
    }
    if let Some(secret) = get(ENV_RANDOMNESS_SECRET) {
        debug!(var = ENV_RANDOMNESS_SECRET, "override applied");
        config.randomness.secret = Some(Secret::new(secret.trim()));
    }
    if let Some(api_key) = get(ENV_ATTESTATION_API_KEY) {
        debug!(var = ENV_ATTESTATION_API_KEY, "override applied");
        config.attestation.api_key = Some(Secret::new(api_key.trim()));
    }
    if let Some(endpoint) = get(ENV_LEDGER_ENDPOINT) {
        debug!(var = ENV_LEDGER_ENDPOINT, endpoint = %endpoint, "override applied");
        config.ledger.endpoint = Some(endpoint.trim().to_string());
    }
}
