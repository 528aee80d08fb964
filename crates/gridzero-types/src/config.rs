//! Configuration types for the resolver process.
//!
//! Every section has defaults so a config file only needs to name what it
//! changes. Durations are carried as milliseconds and exposed through
//! `Duration` accessors.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{GridzeroError, ProofCategory, Result, SecurityRule, constants};

/// A string that must never reach logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Complete resolver configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ResolverConfig {
    pub ledger: LedgerConfig,
    pub credentials: CredentialsConfig,
    pub randomness: RandomnessConfig,
    pub prover: ProverConfig,
    pub attestation: AttestationConfig,
    pub scheduler: SchedulerConfig,
    pub game: GameConfig,
    pub ops: OpsConfig,
    pub audit: AuditConfig,
    pub logging: LoggingConfig,
}

impl ResolverConfig {
    /// Check cross-field constraints after loading and env overrides.
    pub fn validate(&self) -> Result<()> {
        if self.game.bonus_odds == 0 {
            return Err(GridzeroError::Configuration("game.bonus_odds must be > 0".into()));
        }
        if self.game.grid_cells == 0 || self.game.grid_cells > 1024 {
            return Err(GridzeroError::Configuration(format!(
                "game.grid_cells must be in 1..=1024, got {}",
                self.game.grid_cells
            )));
        }
        if self.ledger.backend == LedgerBackend::Http && self.ledger.endpoint.is_none() {
            return Err(GridzeroError::Configuration(
                "ledger.endpoint is required for the http ledger backend".into(),
            ));
        }
        if self.prover.backend == ProverBackend::External {
            if self.prover.prove_command.is_empty() || self.prover.verify_command.is_empty() {
                return Err(GridzeroError::Configuration(
                    "prover.prove_command and prover.verify_command are required for the external prover".into(),
                ));
            }
            if self.prover.verification_key_path.is_none() {
                return Err(GridzeroError::Configuration(
                    "prover.verification_key_path is required for the external prover".into(),
                ));
            }
        }
        if self.attestation.enabled
            && self.attestation.backend == AttestationBackend::Http
            && self.attestation.endpoint.is_none()
        {
            return Err(GridzeroError::Configuration(
                "attestation.endpoint is required for the http attestation backend".into(),
            ));
        }
        if self.attestation.batch_max == 0 {
            return Err(GridzeroError::Configuration("attestation.batch_max must be > 0".into()));
        }
        if self.scheduler.retry_delay_ms == 0 {
            return Err(GridzeroError::Configuration(
                "scheduler.retry_delay_ms must be > 0".into(),
            ));
        }
        if self.scheduler.max_backoff_ms < self.scheduler.retry_delay_ms {
            return Err(GridzeroError::Configuration(
                "scheduler.max_backoff_ms must be >= scheduler.retry_delay_ms".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LedgerBackend {
    /// In-process devnet ledger with simulated players.
    #[default]
    Devnet,
    /// Ledger gateway service reached over HTTP.
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    pub endpoint: Option<String>,
    pub contract_address: String,
    pub chain_id: u64,
    pub request_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Devnet,
            endpoint: None,
            contract_address: "0x0000000000000000000000000000000000000000".into(),
            chain_id: 0,
            request_timeout_ms: 10_000,
        }
    }
}

impl LedgerConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Hex-encoded ed25519 signing key of the resolver account.
    pub resolver_key: Option<Secret>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RandomnessConfig {
    /// Hex-encoded randomness secret, held only by the resolver.
    pub secret: Option<Secret>,
}

// ---------------------------------------------------------------------------
// Prover
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProverBackend {
    /// Deterministic hash-based stand-in (devnet and tests).
    #[default]
    Digest,
    /// External prove/verify commands.
    External,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProverConfig {
    pub backend: ProverBackend,
    /// argv of the prove command; reads inputs JSON on stdin.
    pub prove_command: Vec<String>,
    /// argv of the verify command; reads `{vk, publicSignals, proof}` on stdin.
    pub verify_command: Vec<String>,
    pub verification_key_path: Option<String>,
    pub timeout_ms: u64,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            backend: ProverBackend::Digest,
            prove_command: Vec::new(),
            verify_command: Vec::new(),
            verification_key_path: None,
            timeout_ms: constants::DEFAULT_PROVE_TIMEOUT_MS,
        }
    }
}

impl ProverConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Attestation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttestationBackend {
    /// In-process aggregator (devnet and tests).
    #[default]
    Memory,
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionMode {
    /// One submission per proof.
    Single,
    /// Accumulate proofs within a window and submit them together.
    #[default]
    Batched,
}

/// Batching policy override for one proof category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainPolicy {
    pub category: ProofCategory,
    pub aggregation_size: u32,
    pub queue_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttestationConfig {
    pub enabled: bool,
    pub backend: AttestationBackend,
    pub endpoint: Option<String>,
    pub api_key: Option<Secret>,
    pub mode: SubmissionMode,
    /// Run the optimistic pre-check before submitting.
    pub optimistic_precheck: bool,
    pub security_rule: SecurityRule,
    pub domains: Vec<DomainPolicy>,
    pub batch_window_ms: u64,
    pub batch_max: usize,
    /// Follow submissions until their aggregation receipt arrives.
    pub follow_receipts: bool,
    pub receipt_timeout_ms: u64,
    pub receipt_poll_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for AttestationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: AttestationBackend::Memory,
            endpoint: None,
            api_key: None,
            mode: SubmissionMode::Batched,
            optimistic_precheck: true,
            security_rule: SecurityRule::Untrusted,
            domains: Vec::new(),
            batch_window_ms: constants::DEFAULT_BATCH_WINDOW_MS,
            batch_max: constants::DEFAULT_BATCH_MAX,
            follow_receipts: false,
            receipt_timeout_ms: constants::DEFAULT_RECEIPT_TIMEOUT_MS,
            receipt_poll_ms: constants::DEFAULT_RECEIPT_POLL_MS,
            request_timeout_ms: 15_000,
        }
    }
}

impl AttestationConfig {
    /// `(aggregation_size, queue_size)` for a category, honouring overrides.
    #[must_use]
    pub fn policy_for(&self, category: ProofCategory) -> (u32, u32) {
        self.domains
            .iter()
            .find(|d| d.category == category)
            .map_or_else(
                || category.default_policy(),
                |d| (d.aggregation_size, d.queue_size),
            )
    }

    /// Most proofs a category may hold locally while the service is failing:
    /// one full service queue (`aggregation_size * queue_size`), never less
    /// than a single batch.
    #[must_use]
    pub fn pending_cap(&self, category: ProofCategory) -> usize {
        let (aggregation_size, queue_size) = self.policy_for(category);
        let queue = u64::from(aggregation_size) * u64::from(queue_size);
        usize::try_from(queue)
            .unwrap_or(usize::MAX)
            .max(self.batch_max.max(1))
    }

    #[must_use]
    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }

    #[must_use]
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }

    #[must_use]
    pub fn receipt_poll(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Scheduler / game / ops
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Delay after `end_time` before attempting resolution.
    pub resolve_buffer_ms: u64,
    pub retry_delay_ms: u64,
    pub max_backoff_ms: u64,
    pub watch_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            resolve_buffer_ms: constants::DEFAULT_RESOLVE_BUFFER_MS,
            retry_delay_ms: constants::DEFAULT_RETRY_DELAY_MS,
            max_backoff_ms: constants::DEFAULT_MAX_BACKOFF_MS,
            watch_interval_ms: constants::DEFAULT_WATCH_INTERVAL_MS,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn resolve_buffer(&self) -> Duration {
        Duration::from_millis(self.resolve_buffer_ms)
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    #[must_use]
    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub grid_cells: u16,
    pub bonus_odds: u64,
    /// Round length used by the devnet ledger.
    pub round_duration_secs: u64,
    /// Simulated picks per devnet round (0 leaves rounds empty).
    pub devnet_players_per_round: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            grid_cells: constants::DEFAULT_GRID_CELLS,
            bonus_odds: constants::DEFAULT_BONUS_ODDS,
            round_duration_secs: 30,
            devnet_players_per_round: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub enabled: bool,
    pub listen_addr: String,
    pub shutdown_grace_ms: u64,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: constants::DEFAULT_OPS_ADDR.to_string(),
            shutdown_grace_ms: constants::DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl OpsConfig {
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuditConfig {
    /// Append-only JSON-lines file; when unset, records go to the log only.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}
