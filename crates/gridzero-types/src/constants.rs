//! System-wide constants for the GridZero settlement pipeline.

/// Number of cells on the default 5x5 grid.
pub const DEFAULT_GRID_CELLS: u16 = 25;

/// Default odds for the bonus (motherlode) trial: one in this many rounds.
pub const DEFAULT_BONUS_ODDS: u64 = 100;

/// Domain tag appended to the random output for the bonus trial.
pub const BONUS_TRIAL_TAG: &[u8] = b"bonus";

/// Domain separator for seed derivation.
pub const SEED_DOMAIN: &[u8] = b"gridzero:seed:v1:";

/// Derived seeds are truncated to this many bytes so they fit the
/// BN254 scalar field used by the randomness circuit.
pub const SEED_FIELD_BYTES: usize = 31;

/// Default delay after a round's end time before resolution is attempted.
pub const DEFAULT_RESOLVE_BUFFER_MS: u64 = 2_000;

/// Default delay before retrying after a failed ledger read.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 3_000;

/// Upper bound on the scheduler's exponential backoff.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 60_000;

/// Default hard timeout on a single prover invocation.
pub const DEFAULT_PROVE_TIMEOUT_MS: u64 = 60_000;

/// Default bound on waiting for an aggregation receipt.
pub const DEFAULT_RECEIPT_TIMEOUT_MS: u64 = 300_000;

/// Poll interval while waiting for an aggregation receipt.
pub const DEFAULT_RECEIPT_POLL_MS: u64 = 5_000;

/// Window during which randomness proofs are accumulated into one batch.
pub const DEFAULT_BATCH_WINDOW_MS: u64 = 10_000;

/// Maximum proofs per batch submission.
pub const DEFAULT_BATCH_MAX: usize = 16;

/// Poll interval of the ledger event watcher.
pub const DEFAULT_WATCH_INTERVAL_MS: u64 = 2_000;

/// Time allowed for draining attestation work on shutdown.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 15_000;

/// Aggregation size for high-frequency randomness proofs.
pub const RANDOMNESS_AGGREGATION_SIZE: u32 = 16;

/// Queue size for randomness proof domains.
pub const RANDOMNESS_QUEUE_SIZE: u32 = 8;

/// Aggregation size for low-frequency leaderboard / difficulty proofs.
pub const LOW_FREQUENCY_AGGREGATION_SIZE: u32 = 4;

/// Queue size for low-frequency proof domains.
pub const LOW_FREQUENCY_QUEUE_SIZE: u32 = 4;

/// Number of settled round ids remembered by the in-process guard.
pub const SETTLED_ROUND_CACHE_SIZE: usize = 10_000;

/// Capacity of the pipeline event bus.
pub const EVENT_BUS_CAPACITY: usize = 1_024;

/// Default address of the ops (health) HTTP server.
pub const DEFAULT_OPS_ADDR: &str = "127.0.0.1:8787";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Service name used in logs and health output.
pub const SERVICE_NAME: &str = "gridzero-resolver";
